//! Crate assistant - Session vocale avec le modèle
//!
//! Assemble les crates `audio` et `network` en une session complète :
//! - `SessionController` : cycle de vie et routage des événements
//! - `CaptureBridge` : micro → canal, avec mesure de volume
//! - `PlaybackScheduler` : voix du modèle sans trou ni chevauchement
//! - `ToolDispatchGateway` : exécution de `render_chart` et `navigate_app`
//!
//! Chaque session porte une `SessionIdentity` ; tout événement arrivant
//! pour une autre identité que la session courante est ignoré.

mod bridge;       // Pont micro → canal
mod config;       // Configuration de session
mod controller;   // Contrôleur de session
mod error;        // Gestion d'erreurs
mod identity;     // Identité de session
mod prompt;       // Instructions système
mod scheduler;    // Planification de la lecture
mod status;       // Statut observable
mod tools;        // Outils exposés au modèle

pub use bridge::{CaptureBridge, CaptureTick, VolumeMeter};
pub use config::SessionConfig;
pub use controller::SessionController;
pub use error::{SessionError, SessionResult};
pub use identity::SessionIdentity;
pub use prompt::{PromptLanguage, system_instruction};
pub use scheduler::{PlaybackScheduler, PlaybackSource};
pub use status::{SessionPhase, SessionStatus};
pub use tools::{
    ChartCallback, ChartConfig, ChartSeries, ChartType, NAVIGATE_APP, NavigateArgs, NavigateCallback, RENDER_CHART,
    RenderChartArgs, ToolArgsError, ToolCallRequest, ToolCallResponse, ToolDispatchGateway, ToolStatus,
    default_catalog, navigate_app_declaration, render_chart_declaration,
};

/// Version du crate assistant
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
