//! Gestion d'erreurs pour le canal vers le modèle
//!
//! Ce module définit les erreurs de connexion, d'envoi et de protocole du
//! canal WebSocket. Il suit les mêmes patterns que le module audio.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles du canal réseau
#[derive(Error, Debug)]
pub enum NetworkError {
    /// La connexion WebSocket n'a pas pu être établie
    #[error("Connexion impossible vers {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// Timeout lors de l'ouverture du canal
    #[error("Timeout de connexion vers {endpoint} après {timeout_ms}ms")]
    ConnectionTimeout { endpoint: String, timeout_ms: u64 },

    /// Le canal a été fermé (par le serveur ou localement)
    #[error("Canal fermé")]
    ChannelClosed,

    /// Aucune clé d'API n'est configurée
    #[error("Clé d'API manquante (GEMINI_API_KEY)")]
    MissingApiKey,

    /// Trame reçue qui ne respecte pas le protocole
    #[error("Trame invalide: {0}")]
    ProtocolError(String),

    /// Erreur lors de la sérialisation/désérialisation JSON
    #[error("Erreur de sérialisation: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Erreur de la couche WebSocket
    #[error("Erreur WebSocket: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Opération tentée alors que le canal n'est pas dans le bon état
    #[error("Opération {operation} invalide dans l'état {current_state}")]
    InvalidState { operation: String, current_state: String },

    /// Erreur de configuration réseau
    #[error("Configuration réseau invalide: {0}")]
    ConfigError(String),
}

/// Type Result personnalisé pour notre crate network
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Fonctions utilitaires pour créer des erreurs communes
impl NetworkError {
    /// Crée une erreur de connexion avec contexte
    pub fn connection_failed(endpoint: &str, cause: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: cause.to_string(),
        }
    }

    /// Crée une erreur de timeout avec contexte
    pub fn connection_timeout(endpoint: &str, timeout_ms: u64) -> Self {
        Self::ConnectionTimeout {
            endpoint: endpoint.to_string(),
            timeout_ms,
        }
    }

    /// Crée une erreur d'état invalide
    pub fn invalid_state(operation: &str, current_state: &str) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            current_state: current_state.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = NetworkError::connection_failed("wss://example.test/ws", "refusé");
        assert!(error.to_string().contains("wss://example.test/ws"));
        assert!(error.to_string().contains("refusé"));

        let error = NetworkError::invalid_state("send", "fermé");
        assert_eq!(error.to_string(), "Opération send invalide dans l'état fermé");
    }
}
