//! Module de lecture audio utilisant cpal
//!
//! Ce module implémente le trait AudioSink. Les sources planifiées sont
//! mixées dans le callback de sortie à leur date de début ; l'horloge de
//! lecture est le nombre de frames effectivement rendues par le périphérique.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec::resample_linear;
use crate::stream_thread::StreamThread;
use crate::{AudioConfig, AudioError, AudioResult, AudioSink, DecodedBuffer, SourceId};

/// Source planifiée, exprimée en frames du périphérique
struct Voice {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Mixeur partagé entre le sink et le callback cpal
pub(crate) struct Mixer {
    voices: Vec<Voice>,
    ended: mpsc::UnboundedSender<SourceId>,
}

impl Mixer {
    pub(crate) fn new(ended: mpsc::UnboundedSender<SourceId>) -> Self {
        Self {
            voices: Vec::new(),
            ended,
        }
    }

    fn schedule(&mut self, id: SourceId, start_frame: u64, samples: Vec<f32>) {
        self.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
    }

    /// Planifie un buffer décodé à `start_at` secondes sur l'horloge du périphérique
    ///
    /// Début et fin sont arrondis à la frame la plus proche et le buffer
    /// rééchantillonné est ajusté à cet intervalle : une source qui commence à
    /// la fin exacte d'une autre la prolonge sans trou ni chevauchement.
    fn place(&mut self, id: SourceId, buffer: &DecodedBuffer, start_at: f64, device_rate: u32) -> u64 {
        let start_at = start_at.max(0.0);
        let start_frame = (start_at * device_rate as f64).round() as u64;
        let end_frame = ((start_at + buffer.duration()) * device_rate as f64).round() as u64;

        let mut samples = resample_linear(&buffer.samples, buffer.sample_rate, device_rate);
        let tail = samples.last().copied().unwrap_or(0.0);
        samples.resize(end_frame.saturating_sub(start_frame) as usize, tail);

        self.schedule(id, start_frame, samples);
        start_frame
    }

    fn stop(&mut self, id: SourceId) {
        if let Some(index) = self.voices.iter().position(|v| v.id == id) {
            self.voices.swap_remove(index);
            let _ = self.ended.send(id);
        }
    }

    fn clear(&mut self) {
        self.voices.clear();
    }

    pub(crate) fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Rend `out.len()` frames mono à partir de la frame `base_frame`
    ///
    /// Les sources entièrement jouées sont retirées et signalées.
    pub(crate) fn render(&mut self, base_frame: u64, out: &mut [f32]) {
        out.fill(0.0);
        let window_end = base_frame + out.len() as u64;

        for voice in &self.voices {
            if voice.start_frame >= window_end || voice.end_frame() <= base_frame {
                continue;
            }
            let from = voice.start_frame.max(base_frame);
            let to = voice.end_frame().min(window_end);
            for frame in from..to {
                out[(frame - base_frame) as usize] += voice.samples[(frame - voice.start_frame) as usize];
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        let ended = &self.ended;
        self.voices.retain(|voice| {
            let finished = voice.end_frame() <= window_end;
            if finished {
                let _ = ended.send(voice.id);
            }
            !finished
        });
    }
}

struct SinkInfo {
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

/// Implémentation de lecture audio avec cpal
///
/// La voix du modèle (24 kHz mono) est rééchantillonnée à la fréquence du
/// périphérique puis recopiée sur tous ses canaux.
pub struct CpalSink {
    /// Fréquence native du périphérique de sortie
    sample_rate: u32,

    /// Nombre de canaux du périphérique
    channels: u16,

    /// Mixeur partagé avec le callback (try_lock côté callback)
    mixer: Arc<Mutex<Mixer>>,

    /// Frames rendues depuis l'ouverture, base de l'horloge
    frames_rendered: Arc<AtomicU64>,

    /// Notifications de fin de source
    ended_receiver: Option<mpsc::UnboundedReceiver<SourceId>>,

    /// Thread propriétaire du stream (None une fois fermé)
    stream: Option<StreamThread>,

    device_name: String,
}

impl CpalSink {
    /// Ouvre le périphérique de sortie par défaut et démarre le stream
    ///
    /// Le stream tourne en continu (silence quand rien n'est planifié) pour
    /// que l'horloge avance régulièrement.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucune sortie n'est disponible
    /// - `AudioError::ConfigError` si le format n'est pas supporté
    pub async fn open(config: &AudioConfig) -> AudioResult<Self> {
        let (ended_sender, ended_receiver) = mpsc::unbounded_channel();
        let mixer = Arc::new(Mutex::new(Mixer::new(ended_sender)));
        let frames_rendered = Arc::new(AtomicU64::new(0));

        let stream_mixer = Arc::clone(&mixer);
        let stream_frames = Arc::clone(&frames_rendered);
        let (stream, info) = StreamThread::spawn("lecture-audio", move || {
            Self::build_stream(stream_mixer, stream_frames)
        })
        .await?;

        info!(
            device = %info.device_name,
            sample_rate = info.sample_rate,
            channels = info.channels,
            model_rate = config.output_sample_rate,
            "🔊 sortie audio ouverte"
        );

        Ok(Self {
            sample_rate: info.sample_rate,
            channels: info.channels,
            mixer,
            frames_rendered,
            ended_receiver: Some(ended_receiver),
            stream: Some(stream),
            device_name: info.device_name,
        })
    }

    fn build_stream(
        mixer: Arc<Mutex<Mixer>>,
        frames_rendered: Arc<AtomicU64>,
    ) -> AudioResult<(cpal::Stream, SinkInfo)> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDeviceFound)?;

        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique de sortie inconnu".to_string());

        let supported = device.default_output_config()?;
        let sample_rate = supported.sample_rate();
        let channels = supported.channels();
        let stream_config = supported.config();

        debug!(
            device = %device_name,
            sample_rate,
            channels,
            format = ?supported.sample_format(),
            "configuration de la sortie"
        );

        let stream = match supported.sample_format() {
            SampleFormat::F32 => Self::build_output::<f32>(&device, &stream_config, mixer, frames_rendered)?,
            SampleFormat::I16 => Self::build_output::<i16>(&device, &stream_config, mixer, frames_rendered)?,
            SampleFormat::U16 => Self::build_output::<u16>(&device, &stream_config, mixer, frames_rendered)?,
            format => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté: {:?}",
                    format
                )));
            }
        };

        Ok((
            stream,
            SinkInfo {
                device_name,
                sample_rate,
                channels,
            },
        ))
    }

    fn build_output<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mixer: Arc<Mutex<Mixer>>,
        frames_rendered: Arc<AtomicU64>,
    ) -> AudioResult<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels.max(1) as usize;
        let mut scratch: Vec<f32> = Vec::new();

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                scratch.resize(frames, 0.0);
                let base = frames_rendered.load(Ordering::Acquire);

                // Ne jamais bloquer le thread audio : silence si le mixeur est pris
                match mixer.try_lock() {
                    Ok(mut guard) => guard.render(base, &mut scratch),
                    Err(_) => scratch.fill(0.0),
                }

                for (frame, &value) in data.chunks_mut(channels).zip(scratch.iter()) {
                    let sample = T::from_sample(value);
                    frame.fill(sample);
                }

                frames_rendered.fetch_add(frames as u64, Ordering::Release);
            },
            |err| warn!(error = %err, "erreur du stream de lecture"),
            None,
        )?;

        Ok(stream)
    }

    /// Nombre de sources encore dans le mixeur
    pub fn active_sources(&self) -> usize {
        self.mixer.lock().map(|m| m.active_count()).unwrap_or(0)
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    fn current_time(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn start_source(&mut self, id: SourceId, buffer: &DecodedBuffer, start_at: f64) -> AudioResult<()> {
        if self.stream.is_none() {
            return Err(AudioError::invalid_state("start_source", "sortie fermée"));
        }

        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| AudioError::invalid_state("start_source", "mixeur empoisonné"))?;
        mixer.place(id, buffer, start_at, self.sample_rate);
        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.stop(id);
        }
    }

    fn take_ended_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SourceId>> {
        self.ended_receiver.take()
    }

    async fn close(&mut self) -> AudioResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            if let Ok(mut mixer) = self.mixer.lock() {
                mixer.clear();
            }
            info!("🔊 sortie audio fermée");
        }
        Ok(())
    }

    fn device_info(&self) -> String {
        format!("{} ({} Hz, {} canaux)", self.device_name, self.sample_rate, self.channels)
    }
}
