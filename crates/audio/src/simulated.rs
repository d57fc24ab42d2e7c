//! Périphériques audio simulés
//!
//! Ces implémentations remplacent cpal dans les tests : les blocs de capture
//! sont injectés à la main et l'horloge de lecture n'avance que sur demande.
//! Chaque périphérique ouvert expose une poignée clonable qui permet au test
//! d'agir dessus après qu'il a été confié à la session.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    AudioCapture, AudioChunk, AudioConfig, AudioDevices, AudioError, AudioResult, AudioSink, DecodedBuffer,
    SourceId,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Capture simulée alimentée par le test
pub struct SimulatedCapture {
    sample_rate: u32,
    sender: mpsc::Sender<AudioChunk>,
    receiver: Option<mpsc::Receiver<AudioChunk>>,
    error_receiver: Option<mpsc::UnboundedReceiver<AudioError>>,
    state: Arc<Mutex<CaptureState>>,
}

#[derive(Default)]
struct CaptureState {
    recording: bool,
    stopped: bool,
    sender: Option<mpsc::Sender<AudioChunk>>,
    error_sender: Option<mpsc::UnboundedSender<AudioError>>,
    sequence: u64,
}

/// Poignée de test vers une capture simulée
#[derive(Clone)]
pub struct SimulatedCaptureHandle {
    sample_rate: u32,
    state: Arc<Mutex<CaptureState>>,
}

impl SimulatedCapture {
    pub fn new(sample_rate: u32, queue_depth: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let (error_sender, error_receiver) = mpsc::unbounded_channel();
        Self {
            sample_rate,
            sender,
            receiver: Some(receiver),
            error_receiver: Some(error_receiver),
            state: Arc::new(Mutex::new(CaptureState {
                error_sender: Some(error_sender),
                ..Default::default()
            })),
        }
    }

    pub fn handle(&self) -> SimulatedCaptureHandle {
        SimulatedCaptureHandle {
            sample_rate: self.sample_rate,
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl AudioCapture for SimulatedCapture {
    async fn start(&mut self) -> AudioResult<()> {
        let mut state = lock(&self.state);
        if state.stopped {
            return Err(AudioError::invalid_state("start", "capture déjà arrêtée"));
        }
        state.recording = true;
        state.sender = Some(self.sender.clone());
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        let mut state = lock(&self.state);
        state.recording = false;
        state.stopped = true;
        state.sender = None;
        state.error_sender = None;
        Ok(())
    }

    fn take_chunk_receiver(&mut self) -> Option<mpsc::Receiver<AudioChunk>> {
        self.receiver.take()
    }

    fn take_error_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<AudioError>> {
        self.error_receiver.take()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_recording(&self) -> bool {
        lock(&self.state).recording
    }

    fn device_info(&self) -> String {
        format!("Micro simulé ({} Hz)", self.sample_rate)
    }
}

impl SimulatedCaptureHandle {
    /// Injecte un bloc comme le ferait le callback du périphérique
    ///
    /// Retourne `false` si la capture est arrêtée ou la file pleine.
    pub fn push_samples(&self, samples: Vec<f32>) -> bool {
        let mut state = lock(&self.state);
        let Some(sender) = state.sender.clone() else {
            return false;
        };
        let chunk = AudioChunk::new(samples, self.sample_rate, state.sequence);
        state.sequence += 1;
        sender.try_send(chunk).is_ok()
    }

    /// Simule un micro débranché : plus aucun bloc, erreur signalée
    ///
    /// Retourne `false` si la capture est déjà arrêtée.
    pub fn unplug(&self) -> bool {
        let mut state = lock(&self.state);
        state.recording = false;
        state.sender = None;
        match &state.error_sender {
            Some(errors) => errors.send(AudioError::DeviceDisconnected).is_ok(),
            None => false,
        }
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.state).recording
    }

    /// Vrai une fois la capture arrêtée par son propriétaire
    pub fn is_released(&self) -> bool {
        lock(&self.state).stopped
    }
}

/// Source enregistrée par le sink simulé
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatedSource {
    pub id: SourceId,
    pub start_at: f64,
    pub duration: f64,
}

impl SimulatedSource {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

#[derive(Default)]
struct SinkState {
    now: f64,
    closed: bool,
    started: Vec<SimulatedSource>,
    stopped: Vec<SourceId>,
    playing: BTreeMap<SourceId, SimulatedSource>,
}

/// Sink simulé avec horloge manuelle
pub struct SimulatedSink {
    state: Arc<Mutex<SinkState>>,
    ended_sender: mpsc::UnboundedSender<SourceId>,
    ended_receiver: Option<mpsc::UnboundedReceiver<SourceId>>,
}

/// Poignée de test vers un sink simulé
#[derive(Clone)]
pub struct SimulatedSinkHandle {
    state: Arc<Mutex<SinkState>>,
    ended_sender: mpsc::UnboundedSender<SourceId>,
}

impl SimulatedSink {
    pub fn new() -> Self {
        let (ended_sender, ended_receiver) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(SinkState::default())),
            ended_sender,
            ended_receiver: Some(ended_receiver),
        }
    }

    pub fn handle(&self) -> SimulatedSinkHandle {
        SimulatedSinkHandle {
            state: Arc::clone(&self.state),
            ended_sender: self.ended_sender.clone(),
        }
    }
}

impl Default for SimulatedSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSink for SimulatedSink {
    fn current_time(&self) -> f64 {
        lock(&self.state).now
    }

    fn start_source(&mut self, id: SourceId, buffer: &DecodedBuffer, start_at: f64) -> AudioResult<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(AudioError::invalid_state("start_source", "sortie fermée"));
        }
        let source = SimulatedSource {
            id,
            start_at,
            duration: buffer.duration(),
        };
        state.started.push(source.clone());
        state.playing.insert(id, source);
        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        let mut state = lock(&self.state);
        if state.playing.remove(&id).is_some() {
            state.stopped.push(id);
            let _ = self.ended_sender.send(id);
        }
    }

    fn take_ended_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SourceId>> {
        self.ended_receiver.take()
    }

    async fn close(&mut self) -> AudioResult<()> {
        let mut state = lock(&self.state);
        state.closed = true;
        state.playing.clear();
        Ok(())
    }

    fn device_info(&self) -> String {
        "Sortie simulée".to_string()
    }
}

impl SimulatedSinkHandle {
    /// Fixe l'horloge de lecture
    pub fn set_time(&self, now: f64) {
        lock(&self.state).now = now;
    }

    /// Avance l'horloge et signale les sources arrivées à leur terme
    pub fn advance(&self, seconds: f64) -> Vec<SourceId> {
        let mut state = lock(&self.state);
        state.now += seconds;
        let now = state.now;

        let finished: Vec<SourceId> = state
            .playing
            .values()
            .filter(|source| source.end() <= now + 1e-9)
            .map(|source| source.id)
            .collect();
        for id in &finished {
            state.playing.remove(id);
            let _ = self.ended_sender.send(*id);
        }
        finished
    }

    /// Signale la fin d'une source précise
    pub fn end_source(&self, id: SourceId) {
        let mut state = lock(&self.state);
        state.playing.remove(&id);
        let _ = self.ended_sender.send(id);
    }

    pub fn started(&self) -> Vec<SimulatedSource> {
        lock(&self.state).started.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        lock(&self.state).stopped.clone()
    }

    pub fn playing_count(&self) -> usize {
        lock(&self.state).playing.len()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

#[derive(Default)]
struct DevicesState {
    capture_failure: Option<String>,
    sink_failure: Option<String>,
    captures: Vec<SimulatedCaptureHandle>,
    sinks: Vec<SimulatedSinkHandle>,
}

/// Fabrique de périphériques simulés
///
/// Garde une poignée vers chaque périphérique ouvert, dans l'ordre.
#[derive(Clone)]
pub struct SimulatedDevices {
    capture_sample_rate: u32,
    state: Arc<Mutex<DevicesState>>,
}

impl SimulatedDevices {
    pub fn new(capture_sample_rate: u32) -> Self {
        Self {
            capture_sample_rate,
            state: Arc::new(Mutex::new(DevicesState::default())),
        }
    }

    /// Fait échouer la prochaine ouverture du micro (`PermissionDenied`)
    pub fn fail_next_capture(&self, reason: &str) {
        lock(&self.state).capture_failure = Some(reason.to_string());
    }

    /// Fait échouer la prochaine ouverture de la sortie
    pub fn fail_next_sink(&self, reason: &str) {
        lock(&self.state).sink_failure = Some(reason.to_string());
    }

    pub fn captures(&self) -> Vec<SimulatedCaptureHandle> {
        lock(&self.state).captures.clone()
    }

    pub fn sinks(&self) -> Vec<SimulatedSinkHandle> {
        lock(&self.state).sinks.clone()
    }

    pub fn last_capture(&self) -> Option<SimulatedCaptureHandle> {
        lock(&self.state).captures.last().cloned()
    }

    pub fn last_sink(&self) -> Option<SimulatedSinkHandle> {
        lock(&self.state).sinks.last().cloned()
    }
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self::new(48000)
    }
}

#[async_trait]
impl AudioDevices for SimulatedDevices {
    async fn open_capture(&self, config: &AudioConfig) -> AudioResult<Box<dyn AudioCapture>> {
        if let Some(reason) = lock(&self.state).capture_failure.take() {
            return Err(AudioError::PermissionDenied(reason));
        }

        let mut capture = SimulatedCapture::new(self.capture_sample_rate, config.capture_queue_depth);
        capture.start().await?;
        lock(&self.state).captures.push(capture.handle());
        Ok(Box::new(capture))
    }

    async fn open_sink(&self, _config: &AudioConfig) -> AudioResult<Box<dyn AudioSink>> {
        if let Some(reason) = lock(&self.state).sink_failure.take() {
            return Err(AudioError::InitializationError(reason));
        }

        let sink = SimulatedSink::new();
        lock(&self.state).sinks.push(sink.handle());
        Ok(Box::new(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_capture_delivers_chunks() {
        let devices = SimulatedDevices::new(48000);
        let mut capture = devices.open_capture(&AudioConfig::default()).await.unwrap();
        let mut chunks = capture.take_chunk_receiver().unwrap();
        let handle = devices.last_capture().unwrap();

        assert!(handle.push_samples(vec![0.1; 16]));
        let chunk = chunks.recv().await.unwrap();
        assert_eq!(chunk.source_sample_rate, 48000);
        assert_eq!(chunk.len(), 16);

        capture.stop().await.unwrap();
        assert!(handle.is_released());
        assert!(!handle.push_samples(vec![0.1; 16]));
    }

    #[tokio::test]
    async fn test_simulated_capture_unplug() {
        let devices = SimulatedDevices::new(48000);
        let mut capture = devices.open_capture(&AudioConfig::default()).await.unwrap();
        let mut errors = capture.take_error_receiver().unwrap();
        let handle = devices.last_capture().unwrap();

        assert!(handle.unplug());
        assert!(matches!(errors.recv().await, Some(AudioError::DeviceDisconnected)));
        assert!(!handle.is_recording());
        assert!(!handle.push_samples(vec![0.1; 16]));

        capture.stop().await.unwrap();
        assert!(!handle.unplug());
    }

    #[tokio::test]
    async fn test_simulated_sink_clock_and_endings() {
        let mut sink = SimulatedSink::new();
        let handle = sink.handle();
        let mut ended = sink.take_ended_receiver().unwrap();

        sink.start_source(SourceId(0), &DecodedBuffer::new(vec![0.0; 2400], 24000), 0.0)
            .unwrap();
        sink.start_source(SourceId(1), &DecodedBuffer::new(vec![0.0; 2400], 24000), 0.1)
            .unwrap();

        assert_eq!(handle.advance(0.1), vec![SourceId(0)]);
        assert_eq!(ended.recv().await, Some(SourceId(0)));
        assert!((sink.current_time() - 0.1).abs() < 1e-9);

        sink.stop_source(SourceId(1));
        assert_eq!(ended.recv().await, Some(SourceId(1)));
        assert_eq!(handle.stopped(), vec![SourceId(1)]);
    }

    #[tokio::test]
    async fn test_simulated_failures() {
        let devices = SimulatedDevices::default();
        devices.fail_next_capture("micro refusé");

        let err = devices.open_capture(&AudioConfig::default()).await.err().unwrap();
        assert!(err.is_acquisition_error());

        // L'échec ne vaut que pour la prochaine ouverture
        assert!(devices.open_capture(&AudioConfig::default()).await.is_ok());
    }
}
