//! Configuration audio de l'assistant vocal
//!
//! Ce module définit les paramètres de la chaîne audio : fréquence de transport
//! vers le modèle, fréquence de la voix synthétisée, taille des blocs de capture
//! et réglages de l'indicateur de volume.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration principale pour tout le système audio
///
/// `#[serde(default)]` permet de ne surcharger que certains champs depuis
/// un fichier TOML ou l'environnement.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Fréquence d'envoi vers le modèle en Hz
    ///
    /// Le modèle attend du PCM16 mono à 16 kHz.
    pub input_sample_rate: u32,

    /// Fréquence de la voix renvoyée par le modèle en Hz (24 kHz)
    pub output_sample_rate: u32,

    /// Nombre de frames par bloc de capture
    ///
    /// 4096 frames à 48 kHz = ~85ms par bloc
    pub capture_block_size: usize,

    /// Profondeur de la file entre le callback de capture et la session
    ///
    /// Quand la file est pleine, les blocs sont abandonnés.
    pub capture_queue_depth: usize,

    /// Intervalle minimal entre deux publications du volume, en millisecondes
    pub volume_interval_ms: u64,

    /// Gain appliqué au RMS avant clamp dans [0, 1]
    pub volume_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,   // Fréquence attendue par le modèle
            output_sample_rate: 24000,  // Voix synthétisée
            capture_block_size: 4096,   // ~85ms à 48 kHz
            capture_queue_depth: 4,     // Petite fenêtre en vol
            volume_interval_ms: 100,    // 10 mises à jour par seconde
            volume_gain: 5.0,           // La voix a un RMS faible
        }
    }
}

impl AudioConfig {
    /// Type MIME des blocs envoyés au modèle
    ///
    /// Exemple : `audio/pcm;rate=16000`
    pub fn input_mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.input_sample_rate)
    }

    /// Intervalle de publication du volume
    pub fn volume_interval(&self) -> Duration {
        Duration::from_millis(self.volume_interval_ms)
    }

    /// Durée d'un bloc de capture pour une fréquence de périphérique donnée
    pub fn block_duration_ms(&self, device_sample_rate: u32) -> f64 {
        if device_sample_rate == 0 {
            return 0.0;
        }
        self.capture_block_size as f64 * 1000.0 / device_sample_rate as f64
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if self.input_sample_rate < 8000 || self.input_sample_rate > 48000 {
            return Err(format!(
                "Sample rate d'envoi invalide: {} (doit être entre 8000 et 48000)",
                self.input_sample_rate
            ));
        }

        if self.output_sample_rate < 8000 || self.output_sample_rate > 48000 {
            return Err(format!(
                "Sample rate de lecture invalide: {} (doit être entre 8000 et 48000)",
                self.output_sample_rate
            ));
        }

        if self.capture_block_size < 256 || self.capture_block_size > 16384 {
            return Err(format!(
                "Taille de bloc invalide: {} (doit être entre 256 et 16384)",
                self.capture_block_size
            ));
        }

        if self.capture_queue_depth == 0 {
            return Err("La file de capture doit contenir au moins un bloc".to_string());
        }

        if !(self.volume_gain.is_finite() && self.volume_gain > 0.0) {
            return Err(format!("Gain de volume invalide: {}", self.volume_gain));
        }

        Ok(())
    }

    /// Configuration pour les tests (petits blocs, pas de throttling du volume)
    pub fn test_config() -> Self {
        Self {
            capture_block_size: 256,
            volume_interval_ms: 0,
            ..Default::default()
        }
    }
}
