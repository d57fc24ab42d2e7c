// Chargement de la configuration de l'assistant
//
// Ordre de priorité : valeurs par défaut < fichier < variables
// d'environnement VOICE_ASSISTANT__* < options de la ligne de commande.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use assistant::SessionConfig;

/// Préfixe des variables d'environnement (`VOICE_ASSISTANT__NETWORK__MODEL`)
pub const ENV_PREFIX: &str = "VOICE_ASSISTANT";

#[derive(Parser, Debug)]
#[command(author, version, about = "Assistant vocal temps réel")]
pub struct Cli {
    /// Fichier de configuration (TOML, YAML ou JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Langue d'affichage (en, fr, es, de)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Modèle conversationnel
    #[arg(short, long)]
    pub model: Option<String>,

    /// Voix de synthèse
    #[arg(long)]
    pub voice: Option<String>,

    /// Affiche la trame de setup et quitte
    #[arg(long)]
    pub print_setup: bool,

    /// Logs détaillés
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Filtre de logs par défaut quand `RUST_LOG` n'est pas défini
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

/// Charge la configuration puis applique les options de la ligne de commande
pub fn load(cli: &Cli) -> Result<SessionConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = &cli.config {
        builder = builder.add_source(config::File::from(path.as_path()));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let mut session: SessionConfig = builder
        .build()
        .context("lecture de la configuration")?
        .try_deserialize()
        .context("configuration invalide")?;

    apply_overrides(&mut session, cli);

    session
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("validation de la configuration")?;

    Ok(session)
}

fn apply_overrides(session: &mut SessionConfig, cli: &Cli) {
    if let Some(language) = &cli.language {
        session.language = language.clone();
    }
    if let Some(model) = &cli.model {
        session.network.model = model.clone();
    }
    if let Some(voice) = &cli.voice {
        session.network.voice = Some(voice.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win() {
        let cli = Cli::parse_from(["voice-assistant", "-l", "fr", "--model", "custom-model", "--voice", "Puck"]);
        let mut session = SessionConfig::default();

        apply_overrides(&mut session, &cli);

        assert_eq!(session.language, "fr");
        assert_eq!(session.network.model, "custom-model");
        assert_eq!(session.network.voice.as_deref(), Some("Puck"));
        assert_eq!(session.tools.len(), 2);
    }

    #[test]
    fn test_no_overrides_keeps_defaults() {
        let cli = Cli::parse_from(["voice-assistant"]);
        let mut session = SessionConfig::default();
        let model = session.network.model.clone();

        apply_overrides(&mut session, &cli);

        assert_eq!(session.language, "en");
        assert_eq!(session.network.model, model);
        assert_eq!(cli.default_log_filter(), "info");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let cli = Cli::parse_from(["voice-assistant", "--config", "/nonexistent/voice-assistant.toml"]);

        assert!(load(&cli).is_err());
    }
}
