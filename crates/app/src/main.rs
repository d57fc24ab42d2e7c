// Assistant vocal en ligne de commande
//
// Ouvre une session avec le modèle sur le micro et les haut-parleurs par
// défaut, journalise les graphiques et les navigations demandés, et ferme
// proprement la session sur Ctrl+C.

mod settings;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use assistant::{SessionController, SessionStatus, ToolDispatchGateway};
use audio::CpalDevices;
use network::{ClientMessage, WebSocketConnector};

use settings::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.default_log_filter())),
        )
        .init();

    let session = settings::load(&cli)?;

    if cli.print_setup {
        let setup = ClientMessage::Setup(session.session_setup());
        println!("{}", setup.to_json().context("sérialisation du setup")?);
        return Ok(());
    }

    let connector = WebSocketConnector::new(session.network.clone()).context("configuration du canal")?;
    let gateway = ToolDispatchGateway::new(
        |chart| {
            info!(
                chart = %chart.id,
                kind = chart.chart_type.as_str(),
                rows = chart.data.len(),
                "📊 {}",
                chart.title
            );
        },
        |view| info!("🧭 vue demandée : {}", view),
    );

    let controller = SessionController::new(session, Arc::new(CpalDevices::new()), Arc::new(connector), gateway);

    let mut status = controller.subscribe_status();
    let mut errors = controller.subscribe_errors();

    println!("🎙️  Assistant vocal - Ctrl+C pour quitter");
    controller.connect().await;

    let mut last = SessionStatus::idle();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("arrêt demandé");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if current.connected != last.connected || current.speaking != last.speaking {
                    info!(connected = current.connected, speaking = current.speaking, "statut");
                }
                if last.connected && !current.connected {
                    println!("🔌 Session terminée");
                    break;
                }
                last = current;
            }
            received = errors.recv() => {
                if let Ok(e) = received {
                    error!("❌ {}", e);
                    // Toute erreur publiée sans session active est terminale
                    if e.is_acquisition_error() || controller.current_identity().await.is_none() {
                        break;
                    }
                }
            }
        }
    }

    controller.disconnect().await;
    println!("👋 Au revoir !");
    Ok(())
}
