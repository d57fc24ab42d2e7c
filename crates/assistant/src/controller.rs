//! Contrôleur de session vocale
//!
//! Le contrôleur possède le cycle de vie complet d'une session :
//! acquisition du micro et de la sortie, ouverture du canal avec le setup,
//! routage des événements entrants (voix, interruptions, appels d'outils) et
//! libération de toutes les ressources à la déconnexion.
//!
//! # Architecture
//!
//! Les sources d'événements indépendantes sont pompées chacune par une
//! tâche tokio :
//! - les blocs du micro (`mpsc::Receiver<AudioChunk>`)
//! - les pannes du micro (`mpsc::UnboundedReceiver<AudioError>`)
//! - les événements du canal (`mpsc::UnboundedReceiver<ChannelEvent>`)
//! - les fins de lecture (`mpsc::UnboundedReceiver<SourceId>`)
//!
//! Une minuterie borne l'attente de la confirmation du setup.
//!
//! Chaque tâche emporte l'identité de la session qui l'a lancée. L'état vit
//! derrière un unique `tokio::sync::Mutex` ; chaque handler verrouille,
//! compare son identité à l'identité courante et ne fait rien si elles
//! diffèrent. Aucune tâche n'est annulée : elles s'arrêtent d'elles-mêmes
//! quand leur émetteur disparaît.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use audio::{AudioChunk, AudioDevices, AudioError, DecodedBuffer, Pcm16Codec, SourceId};
use network::{
    ChannelConnector, ChannelEvent, ClientMessage, FunctionResponse, ModelChannel, NetworkError, ServerMessage,
};

use crate::{
    CaptureBridge, PlaybackScheduler, SessionConfig, SessionError, SessionIdentity, SessionPhase, SessionResult,
    SessionStatus, ToolCallRequest, ToolDispatchGateway,
};

/// Capacité du channel d'erreurs
const ERROR_CHANNEL_CAPACITY: usize = 16;

/// Ressources détenues par une session
#[derive(Default)]
struct SessionResources {
    channel: Option<Arc<dyn ModelChannel>>,
    capture: Option<CaptureBridge>,
    scheduler: Option<PlaybackScheduler>,
}

impl SessionResources {
    /// Libère tout ; les erreurs de fermeture sont journalisées et ignorées
    async fn release(self, close_channel: bool) {
        if let Some(scheduler) = self.scheduler {
            if let Err(e) = scheduler.close().await {
                debug!(error = %e, "fermeture de la sortie audio");
            }
        }

        if let Some(channel) = self.channel {
            if close_channel {
                if let Err(e) = channel.close().await {
                    debug!(error = %e, "fermeture du canal");
                }
            }
        }

        if let Some(capture) = self.capture {
            if let Err(e) = capture.stop().await {
                debug!(error = %e, "arrêt du micro");
            }
        }
    }
}

/// État protégé par le verrou du contrôleur
#[derive(Default)]
struct ControllerState {
    phase: SessionPhase,
    current: Option<SessionIdentity>,
    resources: SessionResources,
}

impl ControllerState {
    fn is_current(&self, identity: &SessionIdentity) -> bool {
        self.current.as_ref() == Some(identity)
    }

    /// Oublie la session courante et rend ses ressources
    fn detach(&mut self, phase: SessionPhase) -> SessionResources {
        self.current = None;
        self.phase = phase;
        std::mem::take(&mut self.resources)
    }
}

struct ControllerInner {
    config: SessionConfig,
    devices: Arc<dyn AudioDevices>,
    connector: Arc<dyn ChannelConnector>,
    gateway: ToolDispatchGateway,
    state: Mutex<ControllerState>,
    status: watch::Sender<SessionStatus>,
    errors: broadcast::Sender<Arc<SessionError>>,
}

/// Contrôleur d'une session vocale avec le modèle
///
/// Clonable : tous les clones pilotent la même session.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use assistant::{SessionConfig, SessionController, ToolDispatchGateway};
/// use audio::SimulatedDevices;
/// use network::SimulatedConnector;
///
/// # async fn example() {
/// let controller = SessionController::new(
///     SessionConfig::test_config(),
///     Arc::new(SimulatedDevices::default()),
///     Arc::new(SimulatedConnector::new()),
///     ToolDispatchGateway::noop(),
/// );
///
/// controller.connect().await;
/// // ... conversation ...
/// controller.disconnect().await;
/// assert!(controller.status().is_idle());
/// # }
/// ```
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        devices: Arc<dyn AudioDevices>,
        connector: Arc<dyn ChannelConnector>,
        gateway: ToolDispatchGateway,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::idle());
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                devices,
                connector,
                gateway,
                state: Mutex::new(ControllerState::default()),
                status,
                errors,
            }),
        }
    }

    /// Statut courant
    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Abonnement aux changements de statut
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Abonnement aux erreurs de session
    pub fn subscribe_errors(&self) -> broadcast::Receiver<Arc<SessionError>> {
        self.inner.errors.subscribe()
    }

    /// Phase courante (diagnostic)
    pub async fn phase(&self) -> SessionPhase {
        self.inner.state.lock().await.phase
    }

    /// Identité de la session courante, s'il y en a une
    pub async fn current_identity(&self) -> Option<SessionIdentity> {
        self.inner.state.lock().await.current
    }

    /// Ouvre une session
    ///
    /// Sans effet si une session est déjà en cours d'ouverture ou ouverte.
    /// Un échec n'est jamais renvoyé : il est publié sur `subscribe_errors()`
    /// et laisse le contrôleur au repos.
    pub async fn connect(&self) {
        if let Err(e) = self.try_connect().await {
            error!(error = %e, "échec de l'ouverture de session");
            self.publish_error(e);
        }
    }

    async fn try_connect(&self) -> SessionResult<()> {
        let identity = {
            let mut state = self.inner.state.lock().await;
            if state.phase.is_active() {
                debug!(phase = %state.phase, "connect ignoré, session déjà active");
                return Ok(());
            }
            let identity = SessionIdentity::new();
            state.current = Some(identity);
            state.phase = SessionPhase::Connecting;
            identity
        };

        info!(session = %identity, language = %self.inner.config.language, "🎙️ ouverture de session");

        if let Err(e) = self.inner.config.validate() {
            self.abort_connect(&identity).await;
            return Err(SessionError::ConfigError(e));
        }

        // 1. Périphériques audio
        let audio_config = &self.inner.config.audio;
        let mut capture = match self.inner.devices.open_capture(audio_config).await {
            Ok(capture) => capture,
            Err(e) => {
                self.abort_connect(&identity).await;
                return Err(e.into());
            }
        };
        let mut sink = match self.inner.devices.open_sink(audio_config).await {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(stop_error) = capture.stop().await {
                    debug!(error = %stop_error, "arrêt du micro");
                }
                self.abort_connect(&identity).await;
                return Err(e.into());
            }
        };

        let chunks = capture.take_chunk_receiver();
        let device_errors = capture.take_error_receiver();
        let ended = sink.take_ended_receiver();
        {
            let mut state = self.inner.state.lock().await;
            let resources = SessionResources {
                channel: None,
                capture: Some(CaptureBridge::new(capture, audio_config)),
                scheduler: Some(PlaybackScheduler::new(sink, identity)),
            };
            if !state.is_current(&identity) {
                drop(state);
                trace!(session = %identity, "session supplantée, périphériques relâchés");
                resources.release(false).await;
                return Ok(());
            }
            state.resources = resources;
        }

        if let Some(chunks) = chunks {
            self.spawn_capture_pump(identity, chunks);
        }
        if let Some(device_errors) = device_errors {
            self.spawn_device_error_pump(identity, device_errors);
        }
        if let Some(ended) = ended {
            self.spawn_playback_pump(identity, ended);
        }

        // 2. Canal vers le modèle
        let handle = match self.inner.connector.connect(self.inner.config.session_setup()).await {
            Ok(handle) => handle,
            Err(e) => {
                self.abort_connect(&identity).await;
                return Err(e.into());
            }
        };

        {
            let mut state = self.inner.state.lock().await;
            if !state.is_current(&identity) {
                drop(state);
                trace!(session = %identity, "session supplantée, canal fermé");
                if let Err(e) = handle.channel.close().await {
                    debug!(error = %e, "fermeture du canal");
                }
                return Ok(());
            }
            state.resources.channel = Some(Arc::clone(&handle.channel));
        }

        self.spawn_event_pump(identity, handle.events);
        self.spawn_open_timeout(identity);
        Ok(())
    }

    /// Annule une ouverture en cours si elle est toujours courante
    async fn abort_connect(&self, identity: &SessionIdentity) {
        let resources = {
            let mut state = self.inner.state.lock().await;
            if !state.is_current(identity) {
                return;
            }
            state.detach(SessionPhase::Idle)
        };
        self.publish_status(SessionStatus::idle());
        resources.release(true).await;
    }

    /// Ferme la session courante (idempotent)
    pub async fn disconnect(&self) {
        self.teardown(None, None, true).await;
    }

    /// Démonte la session
    ///
    /// Avec `expected`, ne fait rien si la session courante est une autre ;
    /// avec `while_in`, ne fait rien si la phase n'est plus celle attendue.
    /// Retourne `true` si une session a été démontée.
    async fn teardown(
        &self,
        expected: Option<&SessionIdentity>,
        while_in: Option<SessionPhase>,
        close_channel: bool,
    ) -> bool {
        let (identity, resources) = {
            let mut state = self.inner.state.lock().await;
            if let Some(expected) = expected {
                if !state.is_current(expected) {
                    return false;
                }
            }
            if let Some(phase) = while_in {
                if state.phase != phase {
                    return false;
                }
            }
            let identity = state.current;
            (identity, state.detach(SessionPhase::Closing))
        };

        self.publish_status(SessionStatus::idle());
        resources.release(close_channel).await;

        {
            let mut state = self.inner.state.lock().await;
            if state.phase == SessionPhase::Closing {
                state.phase = SessionPhase::Idle;
            }
        }

        match identity {
            Some(identity) => {
                info!(session = %identity, "🎙️ session fermée");
                true
            }
            None => false,
        }
    }

    fn spawn_capture_pump(&self, identity: SessionIdentity, mut chunks: mpsc::Receiver<AudioChunk>) {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                controller.handle_capture_chunk(&identity, chunk).await;
            }
            trace!(session = %identity, "fin du flux micro");
        });
    }

    fn spawn_device_error_pump(&self, identity: SessionIdentity, mut errors: mpsc::UnboundedReceiver<AudioError>) {
        let controller = self.clone();
        tokio::spawn(async move {
            // Une panne suffit : la session est démontée
            if let Some(error) = errors.recv().await {
                controller.handle_device_error(&identity, error).await;
            }
            trace!(session = %identity, "fin du flux d'erreurs du micro");
        });
    }

    /// Abandonne l'ouverture si le setup n'est pas confirmé à temps
    fn spawn_open_timeout(&self, identity: SessionIdentity) {
        let controller = self.clone();
        let timeout = self.inner.config.network.connect_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            controller.handle_open_timeout(&identity).await;
        });
    }

    fn spawn_event_pump(&self, identity: SessionIdentity, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let terminal = event.is_terminal();
                controller.handle_channel_event(&identity, event).await;
                if terminal {
                    break;
                }
            }
            trace!(session = %identity, "fin du flux du canal");
        });
    }

    fn spawn_playback_pump(&self, identity: SessionIdentity, mut ended: mpsc::UnboundedReceiver<SourceId>) {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(id) = ended.recv().await {
                controller.handle_source_ended(&identity, id).await;
            }
            trace!(session = %identity, "fin du flux de lecture");
        });
    }

    async fn handle_capture_chunk(&self, identity: &SessionIdentity, chunk: AudioChunk) {
        let tick = {
            let mut state = self.inner.state.lock().await;
            if !state.is_current(identity) {
                trace!(session = %identity, "bloc micro d'une session périmée");
                return;
            }
            let Some(bridge) = state.resources.capture.as_mut() else {
                return;
            };
            let Some(tick) = bridge.process_chunk(&chunk, Instant::now()) else {
                return;
            };
            if let Some(volume) = tick.volume {
                self.inner.status.send_modify(|status| status.volume = volume);
            }
            tick
        };

        tick.transmit().await;
    }

    async fn handle_channel_event(&self, identity: &SessionIdentity, event: ChannelEvent) {
        match event {
            ChannelEvent::Open => self.handle_open(identity).await,
            ChannelEvent::Message(message) => self.handle_server_message(identity, message).await,
            ChannelEvent::Close { reason } => {
                if !self.inner.state.lock().await.is_current(identity) {
                    trace!(session = %identity, "fermeture d'un canal périmé");
                    return;
                }

                // Fermeture avant `setupComplete` : le serveur a refusé le setup
                if self.teardown(Some(identity), Some(SessionPhase::Connecting), false).await {
                    let reason = reason.unwrap_or_else(|| "fermé avant la confirmation du setup".to_string());
                    let error = NetworkError::connection_failed(&self.inner.config.network.endpoint, reason);
                    error!(session = %identity, error = %error, "setup refusé par le serveur");
                    self.publish_error(SessionError::Network(error));
                    return;
                }

                info!(session = %identity, reason = ?reason, "canal fermé par le serveur");
                self.teardown(Some(identity), None, false).await;
            }
            ChannelEvent::Error(reason) => {
                if !self.inner.state.lock().await.is_current(identity) {
                    trace!(session = %identity, "erreur d'un canal périmé");
                    return;
                }
                warn!(session = %identity, error = %reason, "erreur du canal");
                if self.teardown(Some(identity), None, true).await {
                    self.publish_error(SessionError::Channel(reason));
                }
            }
        }
    }

    async fn handle_open_timeout(&self, identity: &SessionIdentity) {
        if !self.teardown(Some(identity), Some(SessionPhase::Connecting), true).await {
            return;
        }

        let network = &self.inner.config.network;
        let error = NetworkError::connection_timeout(&network.endpoint, network.connect_timeout_ms);
        error!(session = %identity, error = %error, "setup non confirmé");
        self.publish_error(SessionError::Network(error));
    }

    async fn handle_device_error(&self, identity: &SessionIdentity, error: AudioError) {
        if !self.teardown(Some(identity), None, true).await {
            trace!(session = %identity, "panne du micro d'une session périmée");
            return;
        }

        error!(session = %identity, error = %error, "micro perdu, session fermée");
        self.publish_error(SessionError::Audio(error));
    }

    async fn handle_open(&self, identity: &SessionIdentity) {
        let mut state = self.inner.state.lock().await;
        if !state.is_current(identity) || state.phase != SessionPhase::Connecting {
            trace!(session = %identity, "ouverture ignorée");
            return;
        }

        let Some(channel) = state.resources.channel.clone() else {
            return;
        };
        if let Some(bridge) = state.resources.capture.as_mut() {
            bridge.attach(channel);
        }
        state.phase = SessionPhase::Open;
        self.inner.status.send_modify(|status| status.connected = true);
        info!(session = %identity, "✅ session ouverte");
    }

    async fn handle_server_message(&self, identity: &SessionIdentity, message: ServerMessage) {
        if let Some(go_away) = &message.go_away {
            info!(session = %identity, time_left = ?go_away.time_left, "le serveur va fermer le canal");
        }
        if let Some(cancellation) = &message.tool_call_cancellation {
            debug!(session = %identity, ids = ?cancellation.ids, "annulation d'appels d'outils ignorée");
        }

        if message.is_interrupted() {
            self.handle_interrupted(identity).await;
        }

        let fragments = message.audio_fragments();
        if !fragments.is_empty() {
            self.handle_audio(identity, &fragments).await;
        }

        if !message.function_calls().is_empty() {
            let requests: Vec<ToolCallRequest> = message.function_calls().iter().map(ToolCallRequest::from).collect();
            self.handle_tool_calls(identity, requests).await;
        }

        if message.is_turn_complete() {
            debug!(session = %identity, "tour du modèle terminé");
        }
    }

    async fn handle_interrupted(&self, identity: &SessionIdentity) {
        let mut state = self.inner.state.lock().await;
        if !state.is_current(identity) {
            return;
        }
        if let Some(scheduler) = state.resources.scheduler.as_mut() {
            scheduler.flush();
        }
        self.inner.status.send_modify(|status| status.speaking = false);
        debug!(session = %identity, "modèle interrompu");
    }

    async fn handle_audio(&self, identity: &SessionIdentity, fragments: &[&str]) {
        let mut codec = Pcm16Codec::new(&self.inner.config.audio);
        let buffers: Vec<DecodedBuffer> = fragments
            .iter()
            .filter_map(|fragment| match codec.decode_base64_fragment(fragment) {
                Ok(buffer) if !buffer.is_empty() => Some(buffer),
                Ok(_) => None,
                Err(e) => {
                    warn!(session = %identity, error = %e, "fragment audio ignoré");
                    None
                }
            })
            .collect();
        if buffers.is_empty() {
            return;
        }

        let mut state = self.inner.state.lock().await;
        if !state.is_current(identity) {
            trace!(session = %identity, "audio d'une session périmée");
            return;
        }
        let Some(scheduler) = state.resources.scheduler.as_mut() else {
            return;
        };

        let mut scheduled = false;
        for buffer in &buffers {
            match scheduler.enqueue(buffer) {
                Ok(_) => scheduled = true,
                Err(e) => warn!(session = %identity, error = %e, "fragment audio non planifié"),
            }
        }
        if scheduled {
            self.inner.status.send_modify(|status| status.speaking = true);
        }
    }

    async fn handle_tool_calls(&self, identity: &SessionIdentity, requests: Vec<ToolCallRequest>) {
        let (channel, responses) = {
            let state = self.inner.state.lock().await;
            if !state.is_current(identity) {
                trace!(session = %identity, "appels d'outils d'une session périmée");
                return;
            }
            let Some(channel) = state.resources.channel.clone() else {
                return;
            };
            (channel, self.inner.gateway.dispatch_batch(&requests))
        };

        let responses: Vec<FunctionResponse> = responses.into_iter().map(FunctionResponse::from).collect();
        debug!(session = %identity, count = responses.len(), "réponses d'outils envoyées");
        if let Err(e) = channel.send(ClientMessage::tool_response(responses)).await {
            warn!(session = %identity, error = %e, "réponses d'outils non envoyées");
        }
    }

    async fn handle_source_ended(&self, identity: &SessionIdentity, id: SourceId) {
        let mut state = self.inner.state.lock().await;
        if !state.is_current(identity) {
            return;
        }
        let Some(scheduler) = state.resources.scheduler.as_mut() else {
            return;
        };
        if scheduler.on_source_ended(id) {
            self.inner.status.send_modify(|status| status.speaking = false);
        }
    }

    fn publish_status(&self, status: SessionStatus) {
        self.inner.status.send_replace(status);
    }

    fn publish_error(&self, error: SessionError) {
        // Aucun abonné : l'erreur est déjà journalisée
        let _ = self.inner.errors.send(Arc::new(error));
    }
}
