//! Module de capture audio utilisant cpal
//!
//! Ce module implémente le trait AudioCapture avec la librairie cpal.
//! Le callback cpal mixe les canaux en mono, accumule un bloc complet puis
//! l'envoie sur un channel borné vers la session.
//!
//! # Architecture thread
//!
//! Le stream vit sur un thread dédié (voir `stream_thread`). Le callback ne
//! bloque jamais : si la file est pleine, le bloc est compté puis abandonné.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::stream_thread::StreamThread;
use crate::{AudioCapture, AudioChunk, AudioConfig, AudioError, AudioResult};

/// Accumulateur exécuté dans le callback cpal
///
/// Transforme des échantillons entrelacés en blocs mono de taille fixe.
pub(crate) struct ChunkAccumulator {
    channels: usize,
    block_size: usize,
    sample_rate: u32,
    frame_sum: f32,
    frame_fill: usize,
    pending: Vec<f32>,
    sequence: u64,
    sender: mpsc::Sender<AudioChunk>,
    dropped: Arc<AtomicU64>,
}

impl ChunkAccumulator {
    pub(crate) fn new(
        channels: usize,
        block_size: usize,
        sample_rate: u32,
        sender: mpsc::Sender<AudioChunk>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            channels: channels.max(1),
            block_size,
            sample_rate,
            frame_sum: 0.0,
            frame_fill: 0,
            pending: Vec::with_capacity(block_size),
            sequence: 0,
            sender,
            dropped,
        }
    }

    /// Ajoute des échantillons entrelacés `[c0, c1, ..., c0, c1, ...]`
    pub(crate) fn push_interleaved<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = f32>,
    {
        for sample in samples {
            self.frame_sum += sample;
            self.frame_fill += 1;

            if self.frame_fill == self.channels {
                self.pending.push(self.frame_sum / self.channels as f32);
                self.frame_sum = 0.0;
                self.frame_fill = 0;

                if self.pending.len() >= self.block_size {
                    self.emit();
                }
            }
        }
    }

    fn emit(&mut self) {
        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
        let chunk = AudioChunk::new(samples, self.sample_rate, self.sequence);
        self.sequence += 1;

        match self.sender.try_send(chunk) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // La session a relâché le récepteur : rien à faire
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Erreur de stream qui met fin à la capture
///
/// Les autres erreurs du backend sont seulement journalisées.
pub(crate) fn stream_failure(err: &cpal::StreamError) -> Option<AudioError> {
    match err {
        cpal::StreamError::DeviceNotAvailable => Some(AudioError::DeviceDisconnected),
        _ => None,
    }
}

/// Informations remontées par le thread de capture au démarrage
struct CaptureInfo {
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

/// Implémentation de capture audio avec cpal
///
/// Cette structure gère :
/// - La découverte du microphone par défaut
/// - Le stream d'entrée (f32, i16 ou u16) sur un thread dédié
/// - Le mixage mono et le découpage en blocs de `capture_block_size` frames
pub struct CpalCapture {
    /// Configuration audio de notre application
    config: AudioConfig,

    /// Sender transmis au callback au démarrage
    chunk_sender: Option<mpsc::Sender<AudioChunk>>,

    /// Récepteur des blocs, pris par la session
    chunk_receiver: Option<mpsc::Receiver<AudioChunk>>,

    /// Sender des erreurs du stream, transmis au callback au démarrage
    error_sender: Option<mpsc::UnboundedSender<AudioError>>,

    /// Récepteur des erreurs du stream, pris par la session
    error_receiver: Option<mpsc::UnboundedReceiver<AudioError>>,

    /// Thread propriétaire du stream (None si arrêté)
    stream: Option<StreamThread>,

    /// Fréquence native du micro, connue après `start()`
    sample_rate: u32,

    /// Nom du périphérique pour debug
    device_name: String,

    /// Blocs abandonnés faute de place dans la file
    dropped_chunks: Arc<AtomicU64>,
}

impl CpalCapture {
    /// Crée une capture sans toucher au périphérique
    ///
    /// Le micro n'est ouvert qu'au `start()`.
    pub fn new(config: AudioConfig) -> Self {
        let (chunk_sender, chunk_receiver) = mpsc::channel(config.capture_queue_depth.max(1));
        let (error_sender, error_receiver) = mpsc::unbounded_channel();

        Self {
            config,
            chunk_sender: Some(chunk_sender),
            chunk_receiver: Some(chunk_receiver),
            error_sender: Some(error_sender),
            error_receiver: Some(error_receiver),
            stream: None,
            sample_rate: 0,
            device_name: "Périphérique inconnu".to_string(),
            dropped_chunks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Nombre de blocs abandonnés depuis le démarrage
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    /// Ouvre le micro par défaut et construit le stream adapté à son format
    fn build_stream(
        block_size: usize,
        sender: mpsc::Sender<AudioChunk>,
        errors: mpsc::UnboundedSender<AudioError>,
        dropped: Arc<AtomicU64>,
    ) -> AudioResult<(cpal::Stream, CaptureInfo)> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::NoDeviceFound)?;

        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        let supported = device.default_input_config()?;
        let sample_rate = supported.sample_rate();
        let channels = supported.channels();
        let stream_config = supported.config();

        debug!(
            device = %device_name,
            sample_rate,
            channels,
            format = ?supported.sample_format(),
            "configuration du micro"
        );

        let accumulator = ChunkAccumulator::new(channels as usize, block_size, sample_rate, sender, dropped);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => Self::build_input::<f32>(&device, &stream_config, accumulator, errors)?,
            SampleFormat::I16 => Self::build_input::<i16>(&device, &stream_config, accumulator, errors)?,
            SampleFormat::U16 => Self::build_input::<u16>(&device, &stream_config, accumulator, errors)?,
            format => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté: {:?}",
                    format
                )));
            }
        };

        Ok((
            stream,
            CaptureInfo {
                device_name,
                sample_rate,
                channels,
            },
        ))
    }

    fn build_input<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut accumulator: ChunkAccumulator,
        errors: mpsc::UnboundedSender<AudioError>,
    ) -> AudioResult<cpal::Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let stream = device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                accumulator.push_interleaved(data.iter().map(|&s| s.to_sample::<f32>()));
            },
            move |err| {
                if let Some(error) = stream_failure(&err) {
                    warn!(error = %error, "🎤 micro perdu");
                    let _ = errors.send(error);
                } else {
                    warn!(error = %err, "erreur du stream de capture");
                }
            },
            None,
        )?;

        Ok(stream)
    }
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let sender = self
            .chunk_sender
            .take()
            .ok_or_else(|| AudioError::invalid_state("start", "capture déjà arrêtée"))?;
        let errors = self
            .error_sender
            .take()
            .ok_or_else(|| AudioError::invalid_state("start", "capture déjà arrêtée"))?;
        let block_size = self.config.capture_block_size;
        let dropped = Arc::clone(&self.dropped_chunks);

        let (stream, info) = StreamThread::spawn("capture-audio", move || {
            Self::build_stream(block_size, sender, errors, dropped)
        })
        .await?;

        info!(
            device = %info.device_name,
            sample_rate = info.sample_rate,
            channels = info.channels,
            block_ms = self.config.block_duration_ms(info.sample_rate),
            "🎤 capture démarrée"
        );

        self.sample_rate = info.sample_rate;
        self.device_name = info.device_name;
        self.stream = Some(stream);
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            info!(dropped = self.dropped_chunks(), "🎤 capture arrêtée");
        }
        Ok(())
    }

    fn take_chunk_receiver(&mut self) -> Option<mpsc::Receiver<AudioChunk>> {
        self.chunk_receiver.take()
    }

    fn take_error_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<AudioError>> {
        self.error_receiver.take()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    fn device_info(&self) -> String {
        format!("{} ({} Hz)", self.device_name, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_downmixes_and_blocks() {
        let (sender, mut receiver) = mpsc::channel(4);
        let dropped = Arc::new(AtomicU64::new(0));
        let mut acc = ChunkAccumulator::new(2, 3, 48000, sender, dropped);

        // 4 frames stéréo : un bloc complet + une frame en attente
        acc.push_interleaved([1.0, 0.0, 0.5, 0.5, -1.0, 1.0, 0.2, 0.2]);

        let chunk = receiver.try_recv().unwrap();
        assert_eq!(chunk.samples, vec![0.5, 0.5, 0.0]);
        assert_eq!(chunk.source_sample_rate, 48000);
        assert_eq!(chunk.sequence_number, 0);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_accumulator_drops_when_queue_full() {
        let (sender, mut receiver) = mpsc::channel(1);
        let dropped = Arc::new(AtomicU64::new(0));
        let mut acc = ChunkAccumulator::new(1, 2, 16000, sender, Arc::clone(&dropped));

        acc.push_interleaved([0.1; 6]);

        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(receiver.try_recv().unwrap().sequence_number, 0);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_unplugged_device_is_a_failure() {
        let unplugged = stream_failure(&cpal::StreamError::DeviceNotAvailable);
        assert!(matches!(unplugged, Some(AudioError::DeviceDisconnected)));

        let glitch = cpal::StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "xrun".to_string(),
            },
        };
        assert!(stream_failure(&glitch).is_none());
    }

    #[test]
    fn test_new_capture_is_idle() {
        let mut capture = CpalCapture::new(AudioConfig::default());

        assert!(!capture.is_recording());
        assert!(capture.take_chunk_receiver().is_some());
        assert!(capture.take_chunk_receiver().is_none());
        assert!(capture.take_error_receiver().is_some());
        assert!(capture.take_error_receiver().is_none());
    }

    #[tokio::test]
    #[ignore] // Nécessite un microphone
    async fn test_capture_real_device() {
        let mut capture = CpalCapture::new(AudioConfig::default());
        let mut chunks = capture.take_chunk_receiver().unwrap();

        capture.start().await.unwrap();
        let chunk = chunks.recv().await.unwrap();
        assert_eq!(chunk.len(), 4096);

        capture.stop().await.unwrap();
    }
}
