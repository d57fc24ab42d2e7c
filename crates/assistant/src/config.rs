//! Configuration de la session vocale
//!
//! Regroupe la configuration audio, celle du canal, la langue d'affichage et
//! le catalogue d'outils déclaré au modèle.

use serde::{Deserialize, Serialize};

use audio::AudioConfig;
use network::{FunctionDeclaration, NetworkConfig, SessionSetup};

use crate::prompt::system_instruction;
use crate::tools::default_catalog;

/// Configuration complète d'une session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Langue d'affichage (`en`, `fr`, `es`, `de`)
    pub language: String,

    pub audio: AudioConfig,

    pub network: NetworkConfig,

    /// Outils déclarés au modèle à l'ouverture
    #[serde(skip, default = "default_catalog")]
    pub tools: Vec<FunctionDeclaration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            audio: AudioConfig::default(),
            network: NetworkConfig::default(),
            tools: default_catalog(),
        }
    }
}

impl SessionConfig {
    /// Configuration pour les tests
    pub fn test_config() -> Self {
        Self {
            audio: AudioConfig::test_config(),
            network: NetworkConfig::test_config(),
            ..Default::default()
        }
    }

    /// Setup envoyé à l'ouverture du canal
    ///
    /// Modalité audio, voix configurée, instruction système dans la langue
    /// d'affichage et catalogue d'outils.
    pub fn session_setup(&self) -> SessionSetup {
        SessionSetup::audio(&self.network.model)
            .with_voice(self.network.voice.as_deref())
            .with_system_instruction(system_instruction(&self.language))
            .with_tools(self.tools.clone())
    }

    /// Valide l'ensemble de la configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.language.trim().is_empty() {
            return Err("Langue d'affichage vide".to_string());
        }

        self.audio.validate()?;
        self.network.validate()?;

        let mut names: Vec<&str> = self.tools.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err("Outil déclaré deux fois".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.tools.len(), 2);
    }

    #[test]
    fn test_session_setup() {
        let mut config = SessionConfig::test_config();
        config.language = "fr".into();
        config.network.voice = Some("Aoede".into());

        let setup = config.session_setup();

        assert!(setup.model.starts_with("models/"));
        assert_eq!(setup.tool_names(), vec!["render_chart", "navigate_app"]);
        let instruction = setup.system_instruction.unwrap().parts[0].text.clone().unwrap();
        assert!(instruction.contains("français"));
        assert!(setup.generation_config.speech_config.is_some());
    }

    #[test]
    fn test_duplicate_tools_rejected() {
        let mut config = SessionConfig::test_config();
        config.tools.push(config.tools[0].clone());

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialization_keeps_catalog() {
        let config: SessionConfig = serde_json::from_str(r#"{"language": "de"}"#).unwrap();

        assert_eq!(config.language, "de");
        assert_eq!(config.tools.len(), 2);
        assert_eq!(config.audio, AudioConfig::default());
    }
}
