//! Codec PCM16 de l'assistant vocal
//!
//! Le modèle échange du PCM 16 bits little-endian mono : 16 kHz en entrée,
//! 24 kHz en sortie. Ce module regroupe les fonctions pures de conversion
//! (rééchantillonnage, quantification, base64) et `Pcm16Codec` qui les
//! assemble derrière le trait `AudioCodec`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{AudioChunk, AudioCodec, AudioConfig, AudioError, AudioResult, DecodedBuffer, EncodedChunk, Sample};

/// Sous-échantillonne par moyenne de blocs
///
/// La longueur de sortie vaut `floor(len * target / source)` ; chaque
/// échantillon de sortie est la moyenne de la fenêtre d'entrée qu'il couvre.
/// Si `source_rate == target_rate`, les échantillons sont recopiés tels quels.
///
/// # Example
/// ```rust
/// use audio::codec::downsample;
///
/// let out = downsample(&[1.0, 0.0, 1.0, 0.0, 1.0, 0.0], 48000, 16000);
/// assert_eq!(out.len(), 2);
/// ```
pub fn downsample(samples: &[Sample], source_rate: u32, target_rate: u32) -> Vec<Sample> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return samples.to_vec();
    }

    let len = samples.len();
    let out_len = (len as u64 * target_rate as u64 / source_rate as u64) as usize;
    let ratio = source_rate as f64 / target_rate as f64;

    (0..out_len)
        .map(|i| {
            // i * ratio < len car i < out_len
            let start = ((i as f64 * ratio).floor() as usize).min(len - 1);
            let end = (((i + 1) as f64 * ratio).floor() as usize)
                .min(len)
                .max(start + 1);
            let window = &samples[start..end];
            window.iter().sum::<Sample>() / window.len() as Sample
        })
        .collect()
}

/// Rééchantillonne par interpolation linéaire
///
/// Utilisé pour adapter la voix du modèle (24 kHz) à la fréquence native
/// du périphérique de sortie.
pub fn resample_linear(samples: &[Sample], source_rate: u32, target_rate: u32) -> Vec<Sample> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    let step = source_rate as f64 / target_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let index = (position.floor() as usize).min(last);
            let next = (index + 1).min(last);
            let fraction = (position - index as f64) as Sample;
            samples[index] + (samples[next] - samples[index]) * fraction
        })
        .collect()
}

/// Quantifie des échantillons flottants en PCM16 little-endian
///
/// Les valeurs sont écrêtées dans [-1, 1] ; les négatifs sont mis à
/// l'échelle par 32768 et les positifs par 32767.
pub fn encode_pcm16(samples: &[Sample]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = if clamped < 0.0 {
            (clamped * 32768.0) as i16
        } else {
            (clamped * 32767.0) as i16
        };
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Décode du PCM16 little-endian en échantillons flottants dans [-1, 1)
///
/// # Erreurs
/// - `AudioError::DecodeError` si le nombre d'octets est impair
pub fn decode_pcm16(bytes: &[u8]) -> AudioResult<Vec<Sample>> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::decode(format!(
            "longueur PCM16 impaire: {} octets",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as Sample / 32768.0)
        .collect())
}

/// Encode des octets en base64 standard
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Décode une chaîne base64 standard
pub fn decode_base64(data: &str) -> AudioResult<Vec<u8>> {
    Ok(STANDARD.decode(data)?)
}

/// Codec PCM16 entre le micro, le modèle et le haut-parleur
#[derive(Clone, Debug)]
pub struct Pcm16Codec {
    /// Fréquence des blocs envoyés au modèle
    input_sample_rate: u32,

    /// Fréquence de la voix reçue du modèle
    output_sample_rate: u32,
}

impl Pcm16Codec {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            input_sample_rate: config.input_sample_rate,
            output_sample_rate: config.output_sample_rate,
        }
    }

    pub fn input_sample_rate(&self) -> u32 {
        self.input_sample_rate
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.output_sample_rate
    }

    /// Décode un fragment audio base64 tel qu'il arrive dans `inlineData`
    pub fn decode_base64_fragment(&mut self, data: &str) -> AudioResult<DecodedBuffer> {
        let bytes = decode_base64(data)?;
        self.decode(&bytes)
    }
}

impl AudioCodec for Pcm16Codec {
    fn encode(&mut self, chunk: &AudioChunk) -> AudioResult<EncodedChunk> {
        if chunk.source_sample_rate == 0 {
            return Err(AudioError::ConfigError(
                "Bloc capturé sans fréquence d'échantillonnage".to_string(),
            ));
        }

        let resampled = downsample(&chunk.samples, chunk.source_sample_rate, self.input_sample_rate);
        Ok(EncodedChunk::new(encode_pcm16(&resampled), self.input_sample_rate))
    }

    fn decode(&mut self, payload: &[u8]) -> AudioResult<DecodedBuffer> {
        let samples = decode_pcm16(payload)?;
        Ok(DecodedBuffer::new(samples, self.output_sample_rate))
    }

    fn codec_info(&self) -> String {
        format!(
            "PCM16 LE mono - envoi {} Hz, réception {} Hz",
            self.input_sample_rate, self.output_sample_rate
        )
    }
}
