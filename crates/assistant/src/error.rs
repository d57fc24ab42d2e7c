//! Gestion d'erreurs de la session vocale
//!
//! Les erreurs d'audio et de canal sont remontées telles quelles ; la session
//! les publie sur son channel d'erreurs sans jamais les propager à
//! l'appelant de `connect()`.

use thiserror::Error;

use audio::AudioError;
use network::NetworkError;

/// Énumération des erreurs publiées par la session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Micro ou sortie audio indisponible
    #[error("Périphérique audio indisponible: {0}")]
    Audio(#[from] AudioError),

    /// Échec d'ouverture ou d'écriture du canal
    #[error("Canal vers le modèle indisponible: {0}")]
    Network(#[from] NetworkError),

    /// Erreur signalée par le canal en cours de session
    #[error("Erreur du canal: {0}")]
    Channel(String),

    /// Configuration de session incohérente
    #[error("Configuration de session invalide: {0}")]
    ConfigError(String),
}

impl SessionError {
    /// Vrai si l'erreur a empêché l'ouverture de la session
    pub fn is_acquisition_error(&self) -> bool {
        match self {
            SessionError::Audio(e) => e.is_acquisition_error(),
            SessionError::Network(_) | SessionError::ConfigError(_) => true,
            SessionError::Channel(_) => false,
        }
    }
}

/// Type Result personnalisé pour la session
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_and_display() {
        let error: SessionError = AudioError::NoDeviceFound.into();
        assert_eq!(
            error.to_string(),
            "Périphérique audio indisponible: Aucun périphérique audio trouvé"
        );
        assert!(error.is_acquisition_error());

        let error: SessionError = NetworkError::MissingApiKey.into();
        assert!(error.is_acquisition_error());

        assert!(!SessionError::Channel("reset".into()).is_acquisition_error());
    }
}
