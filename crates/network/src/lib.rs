//! Crate network - Canal temps réel vers le modèle conversationnel
//!
//! Ce crate fournit le canal bidirectionnel entre l'assistant et le modèle :
//! envoi du setup, de l'audio micro et des réponses d'outils, réception de la
//! voix synthétisée, des interruptions et des appels d'outils.
//!
//! # Architecture
//!
//! - `error` : Gestion d'erreurs spécialisées réseau
//! - `protocol` : Trames JSON client/serveur
//! - `types` : Configuration, événements et statistiques du canal
//! - `traits` : `ChannelConnector` et `ModelChannel`
//! - `transport` : Implémentations WebSocket et simulée
//!
//! # Example
//!
//! ```rust,no_run
//! use network::{ChannelConnector, ChannelEvent, NetworkConfig, SessionSetup, WebSocketConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = WebSocketConnector::new(NetworkConfig::default())?;
//! let mut handle = connector.connect(SessionSetup::audio("gemini-2.0-flash-live-001")).await?;
//!
//! while let Some(event) = handle.events.recv().await {
//!     if let ChannelEvent::Open = event {
//!         println!("Session prête");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Modules internes
mod error;
mod protocol;
mod types;
mod traits;
mod transport;

// Re-exports publics
pub use error::{NetworkError, NetworkResult};

pub use protocol::{
    ClientMessage, Content, FunctionCall, FunctionDeclaration, FunctionResponse, GenerationConfig, GoAway,
    InlineData, MediaChunk, Part, RealtimeInput, ResponseModality, ServerContent, ServerMessage, SessionSetup,
    SpeechConfig, ToolCall, ToolCallCancellation, ToolResponse, ToolSet,
};

pub use types::{API_KEY_ENV, ChannelEvent, ChannelStats, DEFAULT_ENDPOINT, DEFAULT_MODEL, NetworkConfig};

pub use traits::{ChannelConnector, ChannelHandle, ModelChannel};

pub use transport::{SimulatedConnector, SimulatedSession, WebSocketChannel, WebSocketConnector};

// Re-export depuis le crate audio (pour simplicité d'utilisation)
pub use audio::EncodedChunk;

/// Version du crate network
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
