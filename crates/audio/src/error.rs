//! Gestion d'erreurs pour le système audio
//!
//! Ce module définit les erreurs de la capture, de la lecture et du codec PCM.
//! Les erreurs d'acquisition (pas de micro, permission refusée) sont distinguées
//! des erreurs de flux pour que la session puisse les signaler à l'utilisateur.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le système audio
#[derive(Error, Debug)]
pub enum AudioError {
    /// Aucun périphérique audio (microphone ou haut-parleurs) n'a été trouvé
    #[error("Aucun périphérique audio trouvé")]
    NoDeviceFound,

    /// L'accès au périphérique a été refusé par le système
    #[error("Accès au périphérique refusé: {0}")]
    PermissionDenied(String),

    /// Erreur lors de la configuration des paramètres audio (sample rate, etc.)
    #[error("Erreur de configuration audio: {0}")]
    ConfigError(String),

    /// Erreur provenant de la librairie cpal au démarrage du stream
    #[error("Erreur cpal: {0}")]
    CpalError(#[from] cpal::PlayStreamError),

    /// Données PCM ou base64 invalides
    #[error("Erreur de décodage audio: {0}")]
    DecodeError(String),

    /// Opération impossible dans l'état courant du périphérique
    #[error("État invalide pour {operation}: {reason}")]
    InvalidState {
        operation: String,
        reason: String,
    },

    /// Le périphérique audio a été débranché ou fermé pendant l'utilisation
    #[error("Périphérique audio déconnecté")]
    DeviceDisconnected,

    /// Erreur lors de l'initialisation d'un composant
    #[error("Erreur d'initialisation: {0}")]
    InitializationError(String),
}

impl AudioError {
    /// Crée une erreur d'état invalide
    pub fn invalid_state(operation: &str, reason: &str) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Crée une erreur de décodage
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::DecodeError(reason.into())
    }

    /// Indique si l'erreur empêche l'acquisition d'un périphérique
    ///
    /// Ces erreurs font échouer `connect()` ; les autres sont transitoires.
    pub fn is_acquisition_error(&self) -> bool {
        matches!(
            self,
            Self::NoDeviceFound
                | Self::PermissionDenied(_)
                | Self::ConfigError(_)
                | Self::CpalError(_)
                | Self::InitializationError(_)
        )
    }
}

/// Conversion des erreurs cpal::BuildStreamError
impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => AudioError::NoDeviceFound,
            other => AudioError::ConfigError(format!("Erreur construction stream: {:?}", other)),
        }
    }
}

/// Conversion des erreurs cpal::DefaultStreamConfigError
impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => AudioError::NoDeviceFound,
            other => AudioError::ConfigError(format!("Erreur config par défaut: {:?}", other)),
        }
    }
}

/// Conversion des erreurs base64 (fragments audio du modèle)
impl From<base64::DecodeError> for AudioError {
    fn from(err: base64::DecodeError) -> Self {
        AudioError::DecodeError(format!("base64 invalide: {}", err))
    }
}

/// Type Result personnalisé pour notre crate
pub type AudioResult<T> = Result<T, AudioError>;
