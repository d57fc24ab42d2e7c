//! Types de données pour le canal réseau
//!
//! Ce module définit :
//! - NetworkConfig : Configuration du canal vers le modèle
//! - ChannelEvent : Événements remontés par le canal
//! - ChannelStats : Compteurs d'activité du canal

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::ServerMessage;

/// Point d'accès par défaut de l'API Live
pub const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Modèle par défaut
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-live-001";

/// Variable d'environnement lue quand aucune clé n'est configurée
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Configuration du canal vers le modèle
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// URL WebSocket du service
    pub endpoint: String,

    /// Clé d'API (sinon lue depuis `GEMINI_API_KEY`)
    pub api_key: Option<String>,

    /// Nom du modèle
    pub model: String,

    /// Voix de synthèse prédéfinie (voix du service si absente)
    pub voice: Option<String>,

    /// Timeout d'ouverture du canal en millisecondes (défaut: 10s)
    pub connect_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice: None,
            connect_timeout_ms: 10_000,
        }
    }
}

// Debug manuel : la clé d'API ne doit pas finir dans les logs
impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl NetworkConfig {
    /// Configuration pour les tests (timeout court, clé factice)
    pub fn test_config() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:9/test".to_string(),
            api_key: Some("test-key".to_string()),
            connect_timeout_ms: 500,
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Clé configurée, ou à défaut celle de l'environnement
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty()))
    }

    /// URL de connexion avec la clé en paramètre de requête
    pub fn url_with_key(&self, api_key: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, separator, api_key)
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(format!("Endpoint invalide: {} (ws:// ou wss:// attendu)", self.endpoint));
        }

        if self.model.trim().is_empty() {
            return Err("Nom de modèle vide".to_string());
        }

        if self.connect_timeout_ms < 100 || self.connect_timeout_ms > 60_000 {
            return Err(format!(
                "Timeout de connexion invalide: {}ms (doit être entre 100 et 60000)",
                self.connect_timeout_ms
            ));
        }

        Ok(())
    }
}

/// Événement remonté par un canal ouvert
///
/// Les événements arrivent dans l'ordre de réception ; `Close` et `Error`
/// sont toujours les derniers.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// Le serveur a confirmé le setup (`setupComplete`)
    Open,

    /// Trame serveur décodée
    Message(ServerMessage),

    /// Le canal a été fermé par le serveur
    Close { reason: Option<String> },

    /// Erreur de transport
    Error(String),
}

impl ChannelEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelEvent::Close { .. } | ChannelEvent::Error(_))
    }
}

/// Compteurs d'activité d'un canal
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub audio_chunks_sent: u64,
    pub send_failures: u64,
    pub malformed_frames: u64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.endpoint.starts_with("wss://"));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = NetworkConfig::test_config();
        assert!(config.validate().is_ok());

        config.endpoint = "http://example.test".into();
        assert!(config.validate().is_err());

        config.endpoint = "wss://example.test".into();
        config.connect_timeout_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_url_with_key() {
        let mut config = NetworkConfig::test_config();
        config.endpoint = "wss://example.test/ws".into();
        assert_eq!(config.url_with_key("abc"), "wss://example.test/ws?key=abc");

        config.endpoint = "wss://example.test/ws?alt=json".into();
        assert_eq!(config.url_with_key("abc"), "wss://example.test/ws?alt=json&key=abc");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = NetworkConfig::test_config();
        let debug = format!("{:?}", config);

        assert!(!debug.contains("test-key"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_configured_key_wins() {
        let config = NetworkConfig::test_config();
        assert_eq!(config.resolve_api_key().as_deref(), Some("test-key"));
    }

    #[test]
    fn test_terminal_events() {
        assert!(ChannelEvent::Close { reason: None }.is_terminal());
        assert!(ChannelEvent::Error("reset".into()).is_terminal());
        assert!(!ChannelEvent::Open.is_terminal());
    }
}
