//! Crate audio de l'assistant vocal
//!
//! Ce crate gère toute la chaîne audio côté poste :
//! - Capture microphone avec cpal, découpée en blocs mono
//! - Codec PCM16 (rééchantillonnage, quantification, base64)
//! - Sortie audio avec horloge de lecture et sources planifiées
//! - Périphériques simulés pour les tests

pub mod config;      // Configuration audio
pub mod types;       // Types de données (AudioChunk, DecodedBuffer, etc.)
pub mod traits;      // Traits abstraits
pub mod capture;     // Capture avec cpal
pub mod playback;    // Lecture avec cpal
pub mod codec;       // Codec PCM16
pub mod devices;     // Fabrique cpal
pub mod simulated;   // Périphériques de test
pub mod error;       // Gestion d'erreurs
mod stream_thread;   // Thread propriétaire des streams cpal

// Réexports pour faciliter l'utilisation
pub use config::*;
pub use types::*;
pub use traits::*;
pub use error::*;

// Réexports des implémentations principales
pub use capture::CpalCapture;
pub use playback::CpalSink;
pub use codec::Pcm16Codec;
pub use devices::CpalDevices;
pub use simulated::{
    SimulatedCapture, SimulatedCaptureHandle, SimulatedDevices, SimulatedSink, SimulatedSinkHandle,
    SimulatedSource,
};
