//! Types de données pour le système audio
//!
//! Ce module définit les structures qui circulent dans la chaîne audio :
//! - AudioChunk : bloc capturé au micro, à la fréquence du périphérique
//! - EncodedChunk : bloc PCM16 prêt à partir vers le modèle
//! - DecodedBuffer : voix du modèle décodée, prête à être planifiée
//! - SourceId : identifiant d'une source en cours de lecture

use std::fmt;
use std::time::Instant;

/// Type pour un échantillon audio
///
/// Valeurs entre -1.0 et +1.0, 0.0 = silence.
pub type Sample = f32;

/// Bloc audio mono capturé au microphone
///
/// Produit par le périphérique une fois par bloc (4096 frames par défaut),
/// à la fréquence native du périphérique.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    /// Échantillons mono (déjà mixés si le micro est multicanal)
    pub samples: Vec<Sample>,

    /// Fréquence d'échantillonnage du périphérique en Hz
    pub source_sample_rate: u32,

    /// Numéro de séquence, incrémenté à chaque bloc produit
    pub sequence_number: u64,

    /// Instant de capture
    pub timestamp: Instant,
}

impl AudioChunk {
    /// Crée un nouveau bloc audio
    ///
    /// # Example
    /// ```rust
    /// use audio::AudioChunk;
    ///
    /// let chunk = AudioChunk::new(vec![0.1, 0.2, -0.1, 0.0], 48000, 0);
    /// assert_eq!(chunk.len(), 4);
    /// ```
    pub fn new(samples: Vec<Sample>, source_sample_rate: u32, sequence_number: u64) -> Self {
        Self {
            samples,
            source_sample_rate,
            sequence_number,
            timestamp: Instant::now(),
        }
    }

    /// Crée un bloc de silence
    pub fn silence(sample_count: usize, source_sample_rate: u32, sequence_number: u64) -> Self {
        Self::new(vec![0.0; sample_count], source_sample_rate, sequence_number)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Durée du bloc en millisecondes
    pub fn duration_ms(&self) -> f32 {
        if self.source_sample_rate == 0 {
            return 0.0;
        }
        (self.samples.len() as f32 / self.source_sample_rate as f32) * 1000.0
    }

    /// Calcule le niveau sonore RMS (Root Mean Square)
    ///
    /// RMS donne une idée du volume moyen du bloc, entre 0.0 et 1.0
    pub fn rms_level(&self) -> f32 {
        rms(&self.samples)
    }

    /// Calcule le niveau maximum (peak)
    pub fn peak_level(&self) -> f32 {
        self.samples.iter().map(|&s| s.abs()).fold(0.0, f32::max)
    }

    /// Vérifie si ce bloc est essentiellement silencieux
    pub fn is_silence(&self, threshold: f32) -> bool {
        self.samples.iter().all(|&sample| sample.abs() < threshold)
    }
}

/// RMS d'une suite d'échantillons (0.0 pour une entrée vide)
pub fn rms(samples: &[Sample]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Bloc encodé en PCM16 little-endian, mono, à la fréquence de transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Octets PCM16 LE (2 octets par échantillon)
    pub data: Vec<u8>,

    /// Fréquence d'échantillonnage des données en Hz
    pub sample_rate: u32,
}

impl EncodedChunk {
    pub fn new(data: Vec<u8>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    /// Descripteur MIME attendu par le modèle, ex. `audio/pcm;rate=16000`
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Nombre d'échantillons contenus
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Encode les octets en base64 pour le transport JSON
    pub fn to_base64(&self) -> String {
        crate::codec::encode_base64(&self.data)
    }
}

/// Voix du modèle décodée en échantillons flottants
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBuffer {
    pub samples: Vec<Sample>,
    pub sample_rate: u32,
}

impl DecodedBuffer {
    pub fn new(samples: Vec<Sample>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Durée de lecture en secondes
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Identifiant d'une source planifiée sur un sink de lecture
///
/// Attribué par le planificateur, unique pour la durée de vie d'un sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_creation() {
        let chunk = AudioChunk::new(vec![0.5, -0.5, 0.5, -0.5], 48000, 42);

        assert_eq!(chunk.len(), 4);
        assert_eq!(chunk.sequence_number, 42);
        assert!((chunk.rms_level() - 0.5).abs() < 1e-6);
        assert_eq!(chunk.peak_level(), 0.5);
    }

    #[test]
    fn test_silence_chunk() {
        let chunk = AudioChunk::silence(4096, 48000, 0);

        assert!(chunk.is_silence(0.001));
        assert_eq!(chunk.rms_level(), 0.0);
        assert!((chunk.duration_ms() - 85.333).abs() < 0.01);
    }

    #[test]
    fn test_rms_empty() {
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_encoded_chunk_descriptor() {
        let encoded = EncodedChunk::new(vec![0, 0, 255, 127], 16000);

        assert_eq!(encoded.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(encoded.sample_count(), 2);
        assert_eq!(encoded.to_base64(), "AAD/fw==");
    }

    #[test]
    fn test_decoded_duration() {
        let buffer = DecodedBuffer::new(vec![0.0; 12000], 24000);
        assert!((buffer.duration() - 0.5).abs() < 1e-9);
        assert!(DecodedBuffer::new(Vec::new(), 24000).is_empty());
    }
}
