//! Traits abstraits pour le canal vers le modèle
//!
//! La session ne dépend que de ces deux traits : `ChannelConnector` ouvre un
//! canal et `ModelChannel` y écrit. Les événements entrants arrivent sur un
//! channel tokio séparé, consommé par une tâche de la session.
//!
//! Implémentations :
//! - WebSocketConnector : WebSocket réel via tokio-tungstenite
//! - SimulatedConnector : canal en mémoire pour les tests

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{ChannelEvent, ChannelStats, ClientMessage, NetworkResult, SessionSetup};

/// Canal ouvert vers le modèle
#[async_trait]
pub trait ModelChannel: Send + Sync {
    /// Envoie une trame au modèle
    ///
    /// # Erreurs
    /// - `NetworkError::ChannelClosed` : Canal déjà fermé
    /// - `NetworkError::WebSocketError` : Échec d'écriture
    async fn send(&self, message: ClientMessage) -> NetworkResult<()>;

    /// Ferme le canal (idempotent)
    ///
    /// Après fermeture, plus aucun événement n'est émis.
    async fn close(&self) -> NetworkResult<()>;

    /// Vérifie si le canal accepte encore des envois
    fn is_open(&self) -> bool;

    /// Compteurs d'activité
    fn stats(&self) -> ChannelStats {
        ChannelStats::new()
    }
}

/// Canal fraîchement ouvert et son flux d'événements
pub struct ChannelHandle {
    pub channel: Arc<dyn ModelChannel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Fabrique de canaux, injectée dans la session
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Ouvre un canal et envoie le setup
    ///
    /// `ChannelEvent::Open` est émis quand le serveur confirme le setup.
    ///
    /// # Example
    /// ```rust
    /// use network::{ChannelConnector, ChannelEvent, SessionSetup, SimulatedConnector};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let connector = SimulatedConnector::new();
    /// let mut handle = connector.connect(SessionSetup::audio("gemini-live")).await?;
    ///
    /// assert_eq!(handle.events.recv().await, Some(ChannelEvent::Open));
    /// # Ok(())
    /// # }
    /// ```
    async fn connect(&self, setup: SessionSetup) -> NetworkResult<ChannelHandle>;
}
