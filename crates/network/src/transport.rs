//! Implémentations du canal vers le modèle
//!
//! - WebSocketConnector : WebSocket réel (tokio-tungstenite), une tâche de
//!   lecture par canal convertit les trames en `ChannelEvent`
//! - SimulatedConnector : canal en mémoire piloté par les tests

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::{
    ChannelConnector, ChannelEvent, ChannelHandle, ChannelStats, ClientMessage, ModelChannel, NetworkConfig,
    NetworkError, NetworkResult, ServerMessage, SessionSetup, ToolResponse,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Compteurs partagés entre le canal et sa tâche de lecture
#[derive(Default)]
struct Counters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    audio_chunks_sent: AtomicU64,
    send_failures: AtomicU64,
    malformed_frames: AtomicU64,
}

impl Counters {
    fn record_sent(&self, message: &ClientMessage) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        if matches!(message, ClientMessage::RealtimeInput(_)) {
            self.audio_chunks_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            audio_chunks_sent: self.audio_chunks_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct ChannelShared {
    open: AtomicBool,
    counters: Counters,
}

/// Ouvre des canaux WebSocket vers le service Live
pub struct WebSocketConnector {
    config: NetworkConfig,
}

impl WebSocketConnector {
    /// Crée un connecteur après validation de la configuration
    ///
    /// # Erreurs
    /// - `NetworkError::ConfigError` si la configuration est incohérente
    pub fn new(config: NetworkConfig) -> NetworkResult<Self> {
        config.validate().map_err(NetworkError::ConfigError)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(&self, setup: SessionSetup) -> NetworkResult<ChannelHandle> {
        let api_key = self.config.resolve_api_key().ok_or(NetworkError::MissingApiKey)?;
        let url = self.config.url_with_key(&api_key);
        let endpoint = self.config.endpoint.as_str();

        info!(endpoint, model = %setup.model, "🌐 ouverture du canal");

        let (stream, _response) = tokio::time::timeout(self.config.connect_timeout(), connect_async(url.as_str()))
            .await
            .map_err(|_| NetworkError::connection_timeout(endpoint, self.config.connect_timeout_ms))?
            .map_err(|e| NetworkError::connection_failed(endpoint, e))?;

        let (sink, source) = stream.split();
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(ChannelShared {
            open: AtomicBool::new(true),
            counters: Counters::default(),
        });

        let channel = Arc::new(WebSocketChannel {
            sink: tokio::sync::Mutex::new(sink),
            shared: Arc::clone(&shared),
            reader: Mutex::new(None),
        });

        debug!(tools = ?setup.tool_names(), "envoi du setup");
        channel.send(ClientMessage::Setup(setup)).await?;

        let reader = tokio::spawn(read_loop(source, event_sender, shared));
        *lock(&channel.reader) = Some(reader);

        Ok(ChannelHandle {
            channel,
            events: event_receiver,
        })
    }
}

/// Convertit les trames WebSocket en événements jusqu'à la fermeture
async fn read_loop(mut source: WsSource, events: mpsc::UnboundedSender<ChannelEvent>, shared: Arc<ChannelShared>) {
    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    shared.counters.malformed_frames.fetch_add(1, Ordering::Relaxed);
                    warn!("trame binaire non UTF-8 ignorée");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                shared.open.store(false, Ordering::Release);
                let reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                info!(reason = ?reason, "🌐 canal fermé par le serveur");
                let _ = events.send(ChannelEvent::Close { reason });
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                shared.open.store(false, Ordering::Release);
                warn!(error = %e, "erreur de lecture du canal");
                let _ = events.send(ChannelEvent::Error(e.to_string()));
                return;
            }
        };

        let message = match ServerMessage::from_json(&text) {
            Ok(message) => message,
            Err(e) => {
                shared.counters.malformed_frames.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "trame serveur invalide ignorée");
                continue;
            }
        };

        shared.counters.messages_received.fetch_add(1, Ordering::Relaxed);
        let event = if message.is_setup_complete() {
            ChannelEvent::Open
        } else {
            ChannelEvent::Message(message)
        };

        if events.send(event).is_err() {
            // Plus personne n'écoute
            return;
        }
    }

    shared.open.store(false, Ordering::Release);
    let _ = events.send(ChannelEvent::Close { reason: None });
}

/// Canal WebSocket ouvert
pub struct WebSocketChannel {
    sink: tokio::sync::Mutex<WsSink>,
    shared: Arc<ChannelShared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl ModelChannel for WebSocketChannel {
    async fn send(&self, message: ClientMessage) -> NetworkResult<()> {
        if !self.is_open() {
            return Err(NetworkError::ChannelClosed);
        }

        let json = message.to_json()?;
        let mut sink = self.sink.lock().await;
        match sink.send(Message::Text(json)).await {
            Ok(()) => {
                self.shared.counters.record_sent(&message);
                trace!(kind = message.kind(), "trame envoyée");
                Ok(())
            }
            Err(e) => {
                self.shared.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }

    async fn close(&self) -> NetworkResult<()> {
        let was_open = self.shared.open.swap(false, Ordering::AcqRel);

        // La tâche de lecture s'arrête : plus aucun événement après close()
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }

        if !was_open {
            return Ok(());
        }

        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        sink.close().await?;
        info!("🌐 canal fermé");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    fn stats(&self) -> ChannelStats {
        self.shared.counters.snapshot()
    }
}

/// Canal en mémoire côté session
struct SimulatedChannel {
    shared: ChannelShared,
    sent: Mutex<Vec<ClientMessage>>,
    fail_sends: AtomicBool,
    fail_close: AtomicBool,
    close_calls: AtomicU64,
}

#[async_trait]
impl ModelChannel for SimulatedChannel {
    async fn send(&self, message: ClientMessage) -> NetworkResult<()> {
        if !self.is_open() {
            return Err(NetworkError::ChannelClosed);
        }
        if self.fail_sends.load(Ordering::Acquire) {
            self.shared.counters.send_failures.fetch_add(1, Ordering::Relaxed);
            return Err(NetworkError::invalid_state("send", "échec simulé"));
        }

        self.shared.counters.record_sent(&message);
        lock(&self.sent).push(message);
        Ok(())
    }

    async fn close(&self) -> NetworkResult<()> {
        self.close_calls.fetch_add(1, Ordering::Relaxed);
        self.shared.open.store(false, Ordering::Release);
        if self.fail_close.load(Ordering::Acquire) {
            return Err(NetworkError::invalid_state("close", "échec simulé"));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    fn stats(&self) -> ChannelStats {
        self.shared.counters.snapshot()
    }
}

/// Poignée de test vers un canal simulé
///
/// Permet d'émettre des événements serveur et d'inspecter les trames
/// envoyées par la session.
#[derive(Clone)]
pub struct SimulatedSession {
    setup: SessionSetup,
    channel: Arc<SimulatedChannel>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl SimulatedSession {
    pub fn setup(&self) -> &SessionSetup {
        &self.setup
    }

    /// Émet un événement tant que le canal n'est pas fermé
    pub fn emit(&self, event: ChannelEvent) -> bool {
        if !self.channel.is_open() {
            return false;
        }
        self.inject(event)
    }

    /// Émet un événement même après fermeture (trame déjà en vol)
    pub fn inject(&self, event: ChannelEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Émet une trame serveur JSON
    ///
    /// # Panics
    /// Si le JSON n'est pas une trame serveur valide.
    pub fn emit_json(&self, json: &str) -> bool {
        let message = ServerMessage::from_json(json).expect("trame serveur de test invalide");
        self.emit(ChannelEvent::Message(message))
    }

    pub fn open(&self) -> bool {
        self.emit(ChannelEvent::Open)
    }

    /// Simule une fermeture côté serveur
    pub fn close_from_server(&self, reason: Option<&str>) -> bool {
        let sent = self.emit(ChannelEvent::Close {
            reason: reason.map(str::to_string),
        });
        self.channel.shared.open.store(false, Ordering::Release);
        sent
    }

    /// Simule une erreur de transport
    pub fn fail(&self, reason: &str) -> bool {
        self.emit(ChannelEvent::Error(reason.to_string()))
    }

    pub fn set_send_failure(&self, fail: bool) {
        self.channel.fail_sends.store(fail, Ordering::Release);
    }

    pub fn set_close_failure(&self, fail: bool) {
        self.channel.fail_close.store(fail, Ordering::Release);
    }

    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        lock(&self.channel.sent).clone()
    }

    pub fn audio_chunks_sent(&self) -> usize {
        self.sent_messages()
            .iter()
            .filter(|m| matches!(m, ClientMessage::RealtimeInput(_)))
            .count()
    }

    pub fn tool_responses(&self) -> Vec<ToolResponse> {
        self.sent_messages()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::ToolResponse(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        !self.channel.is_open()
    }

    pub fn close_calls(&self) -> u64 {
        self.channel.close_calls.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ChannelStats {
        self.channel.stats()
    }
}

#[derive(Default)]
struct ConnectorState {
    fail_next: Option<String>,
    manual_open: bool,
    connect_delay: Option<Duration>,
    sessions: Vec<SimulatedSession>,
}

/// Connecteur en mémoire pour les tests
///
/// Par défaut, chaque canal émet `ChannelEvent::Open` dès la connexion.
#[derive(Clone, Default)]
pub struct SimulatedConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connecteur dont les canaux attendent `SimulatedSession::open()`
    pub fn manual_open() -> Self {
        let connector = Self::default();
        lock(&connector.state).manual_open = true;
        connector
    }

    /// Fait échouer la prochaine connexion
    pub fn fail_next_connect(&self, reason: &str) {
        lock(&self.state).fail_next = Some(reason.to_string());
    }

    /// Retarde chaque connexion (pour tester les sessions supplantées)
    pub fn set_connect_delay(&self, delay: Duration) {
        lock(&self.state).connect_delay = Some(delay);
    }

    pub fn sessions(&self) -> Vec<SimulatedSession> {
        lock(&self.state).sessions.clone()
    }

    pub fn last_session(&self) -> Option<SimulatedSession> {
        lock(&self.state).sessions.last().cloned()
    }
}

#[async_trait]
impl ChannelConnector for SimulatedConnector {
    async fn connect(&self, setup: SessionSetup) -> NetworkResult<ChannelHandle> {
        let delay = lock(&self.state).connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (manual_open, failure) = {
            let mut state = lock(&self.state);
            (state.manual_open, state.fail_next.take())
        };
        if let Some(reason) = failure {
            return Err(NetworkError::connection_failed("simulé", reason));
        }

        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let channel = Arc::new(SimulatedChannel {
            shared: ChannelShared {
                open: AtomicBool::new(true),
                counters: Counters::default(),
            },
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            close_calls: AtomicU64::new(0),
        });

        // Le setup est la première trame du canal
        channel.send(ClientMessage::Setup(setup.clone())).await?;

        let session = SimulatedSession {
            setup,
            channel: Arc::clone(&channel),
            events: event_sender,
        };
        if !manual_open {
            session.open();
        }
        lock(&self.state).sessions.push(session);

        Ok(ChannelHandle {
            channel,
            events: event_receiver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio::EncodedChunk;
    use tokio_test::block_on;

    #[test]
    fn test_simulated_connect_sends_setup_then_opens() {
        block_on(async {
            let connector = SimulatedConnector::new();
            let mut handle = connector.connect(SessionSetup::audio("gemini-live")).await.unwrap();

            assert_eq!(handle.events.recv().await, Some(ChannelEvent::Open));

            let session = connector.last_session().unwrap();
            let sent = session.sent_messages();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].kind(), "setup");
        });
    }

    #[test]
    fn test_simulated_manual_open_and_events() {
        block_on(async {
            let connector = SimulatedConnector::manual_open();
            let mut handle = connector.connect(SessionSetup::audio("m")).await.unwrap();
            let session = connector.last_session().unwrap();

            assert!(session.emit_json(r#"{"serverContent":{"interrupted":true}}"#));
            match handle.events.recv().await {
                Some(ChannelEvent::Message(msg)) => assert!(msg.is_interrupted()),
                other => panic!("événement inattendu: {:?}", other),
            }
        });
    }

    #[test]
    fn test_simulated_send_failure_and_close() {
        block_on(async {
            let connector = SimulatedConnector::new();
            let handle = connector.connect(SessionSetup::audio("m")).await.unwrap();
            let session = connector.last_session().unwrap();
            let chunk = ClientMessage::audio_chunk(&EncodedChunk::new(vec![0, 0], 16000));

            session.set_send_failure(true);
            assert!(handle.channel.send(chunk.clone()).await.is_err());

            session.set_send_failure(false);
            handle.channel.send(chunk.clone()).await.unwrap();
            assert_eq!(session.audio_chunks_sent(), 1);
            assert_eq!(handle.channel.stats().send_failures, 1);

            handle.channel.close().await.unwrap();
            assert!(session.is_closed());
            assert!(!session.emit(ChannelEvent::Open));
            assert!(matches!(handle.channel.send(chunk).await, Err(NetworkError::ChannelClosed)));
        });
    }

    #[test]
    fn test_simulated_connect_failure() {
        block_on(async {
            let connector = SimulatedConnector::new();
            connector.fail_next_connect("refusé");

            assert!(connector.connect(SessionSetup::audio("m")).await.is_err());
            assert!(connector.sessions().is_empty());
            assert!(connector.connect(SessionSetup::audio("m")).await.is_ok());
        });
    }

    #[test]
    fn test_websocket_connector_rejects_invalid_config() {
        let mut config = NetworkConfig::test_config();
        config.endpoint = "http://example.test".into();

        assert!(matches!(WebSocketConnector::new(config), Err(NetworkError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_websocket_connect_refused() {
        // Port 9 (discard) fermé en local : la connexion échoue rapidement
        let connector = WebSocketConnector::new(NetworkConfig::test_config()).unwrap();
        let result = connector.connect(SessionSetup::audio("m")).await;

        assert!(matches!(
            result,
            Err(NetworkError::ConnectionFailed { .. }) | Err(NetworkError::ConnectionTimeout { .. })
        ));
    }
}
