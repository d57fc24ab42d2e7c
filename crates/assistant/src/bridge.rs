//! Pont entre le micro et le canal
//!
//! Pour chaque bloc capturé : sous-échantillonnage à 16 kHz, encodage PCM16,
//! envoi en `realtimeInput`, et mesure du volume limitée à une publication
//! par intervalle. Tant que le canal n'est pas ouvert, les blocs sont ignorés
//! mais le périphérique continue de tourner.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use audio::{AudioCapture, AudioChunk, AudioCodec, AudioConfig, AudioResult, Pcm16Codec};
use network::{ClientMessage, ModelChannel};

/// Mesure de volume limitée dans le temps
#[derive(Clone, Debug)]
pub struct VolumeMeter {
    interval: Duration,
    gain: f32,
    last_published: Option<Instant>,
}

impl VolumeMeter {
    pub fn new(interval: Duration, gain: f32) -> Self {
        Self {
            interval,
            gain,
            last_published: None,
        }
    }

    /// Niveau d'un bloc : RMS × gain, borné à [0, 1]
    pub fn level(&self, chunk: &AudioChunk) -> f32 {
        let level = chunk.rms_level() * self.gain;
        if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 }
    }

    /// Retourne un niveau à publier si l'intervalle est écoulé
    pub fn sample(&mut self, chunk: &AudioChunk, now: Instant) -> Option<f32> {
        if let Some(last) = self.last_published {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_published = Some(now);
        Some(self.level(chunk))
    }
}

/// Résultat du traitement d'un bloc
pub struct CaptureTick {
    channel: Arc<dyn ModelChannel>,
    message: ClientMessage,
    /// Volume à publier, si la mesure n'est pas limitée
    pub volume: Option<f32>,
}

impl CaptureTick {
    /// Envoie le bloc ; un échec abandonne ce bloc sans autre effet
    pub async fn transmit(self) -> bool {
        match self.channel.send(self.message).await {
            Ok(()) => true,
            Err(e) => {
                trace!(error = %e, "bloc audio abandonné");
                false
            }
        }
    }
}

/// Pont micro → canal, propriétaire du périphérique de capture
pub struct CaptureBridge {
    device: Box<dyn AudioCapture>,
    codec: Pcm16Codec,
    volume: VolumeMeter,
    channel: Option<Arc<dyn ModelChannel>>,
    chunks_processed: u64,
}

impl CaptureBridge {
    pub fn new(device: Box<dyn AudioCapture>, config: &AudioConfig) -> Self {
        Self {
            device,
            codec: Pcm16Codec::new(config),
            volume: VolumeMeter::new(config.volume_interval(), config.volume_gain),
            channel: None,
            chunks_processed: 0,
        }
    }

    /// Relie le pont au canal ouvert ; les blocs suivants sont envoyés
    pub fn attach(&mut self, channel: Arc<dyn ModelChannel>) {
        debug!(device = %self.device.device_info(), "micro relié au canal");
        self.channel = Some(channel);
    }

    /// Traite un bloc capturé
    ///
    /// Retourne `None` si le pont n'est pas encore relié ou si l'encodage
    /// échoue ; sinon la trame à envoyer et le volume éventuel.
    pub fn process_chunk(&mut self, chunk: &AudioChunk, now: Instant) -> Option<CaptureTick> {
        let channel = self.channel.clone()?;

        let encoded = match self.codec.encode(chunk) {
            Ok(encoded) => encoded,
            Err(e) => {
                debug!(error = %e, "bloc audio non encodable");
                return None;
            }
        };

        self.chunks_processed += 1;
        Some(CaptureTick {
            channel,
            message: ClientMessage::audio_chunk(&encoded),
            volume: self.volume.sample(chunk, now),
        })
    }

    pub fn chunks_processed(&self) -> u64 {
        self.chunks_processed
    }

    /// Arrête et relâche le périphérique
    pub async fn stop(mut self) -> AudioResult<()> {
        self.channel = None;
        self.device.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio::{SimulatedCapture, SimulatedCaptureHandle};
    use network::{ChannelConnector, SessionSetup, SimulatedConnector, SimulatedSession};

    fn bridge(config: &AudioConfig) -> (CaptureBridge, SimulatedCaptureHandle) {
        let capture = SimulatedCapture::new(48000, 4);
        let handle = capture.handle();
        (CaptureBridge::new(Box::new(capture), config), handle)
    }

    async fn open_channel() -> (Arc<dyn ModelChannel>, SimulatedSession) {
        let connector = SimulatedConnector::new();
        let handle = connector.connect(SessionSetup::audio("m")).await.unwrap();
        (handle.channel, connector.last_session().unwrap())
    }

    #[test]
    fn test_volume_meter_throttles() {
        let mut meter = VolumeMeter::new(Duration::from_millis(100), 5.0);
        let chunk = AudioChunk::new(vec![0.1; 64], 48000, 0);
        let t0 = Instant::now();

        let first = meter.sample(&chunk, t0).unwrap();
        assert!((first - 0.5).abs() < 1e-5);
        assert!(meter.sample(&chunk, t0 + Duration::from_millis(50)).is_none());
        assert!(meter.sample(&chunk, t0 + Duration::from_millis(100)).is_some());
    }

    #[test]
    fn test_volume_is_clamped() {
        let meter = VolumeMeter::new(Duration::ZERO, 5.0);
        let loud = AudioChunk::new(vec![0.9; 64], 48000, 0);
        let silent = AudioChunk::silence(64, 48000, 0);

        assert_eq!(meter.level(&loud), 1.0);
        assert_eq!(meter.level(&silent), 0.0);
    }

    #[test]
    fn test_unattached_bridge_ignores_chunks() {
        let (mut bridge, _handle) = bridge(&AudioConfig::default());
        let chunk = AudioChunk::new(vec![0.1; 4096], 48000, 0);

        assert!(bridge.process_chunk(&chunk, Instant::now()).is_none());
        assert_eq!(bridge.chunks_processed(), 0);
    }

    #[tokio::test]
    async fn test_attached_bridge_sends_pcm16() {
        let (mut bridge, _handle) = bridge(&AudioConfig::default());
        let (channel, session) = open_channel().await;
        bridge.attach(channel);

        let chunk = AudioChunk::new(vec![0.1; 4096], 48000, 0);
        let tick = bridge.process_chunk(&chunk, Instant::now()).unwrap();
        assert!(tick.volume.is_some());
        assert!(tick.transmit().await);

        let sent = session.sent_messages();
        match sent.last() {
            Some(ClientMessage::RealtimeInput(input)) => {
                assert_eq!(input.media_chunks[0].mime_type, "audio/pcm;rate=16000");
                // 1365 échantillons PCM16 = 2730 octets
                let bytes = audio::codec::decode_base64(&input.media_chunks[0].data).unwrap();
                assert_eq!(bytes.len(), 2730);
            }
            other => panic!("trame inattendue: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_failure_drops_only_that_chunk() {
        let (mut bridge, _handle) = bridge(&AudioConfig::test_config());
        let (channel, session) = open_channel().await;
        bridge.attach(channel);
        let chunk = AudioChunk::new(vec![0.1; 256], 48000, 0);

        session.set_send_failure(true);
        assert!(!bridge.process_chunk(&chunk, Instant::now()).unwrap().transmit().await);

        session.set_send_failure(false);
        assert!(bridge.process_chunk(&chunk, Instant::now()).unwrap().transmit().await);
        assert_eq!(session.audio_chunks_sent(), 1);
    }

    #[tokio::test]
    async fn test_stop_releases_device() {
        let (bridge, handle) = bridge(&AudioConfig::default());

        bridge.stop().await.unwrap();
        assert!(handle.is_released());
    }
}
