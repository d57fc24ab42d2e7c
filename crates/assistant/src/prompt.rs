//! Instructions système selon la langue d'affichage

/// Langues disposant d'un modèle d'instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptLanguage {
    English,
    French,
    Spanish,
    German,
}

impl PromptLanguage {
    /// Résout un code de langue (`fr`, `fr-FR`, `FR`...) ; anglais par défaut
    pub fn from_code(code: &str) -> Self {
        let primary = code
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        match primary.as_str() {
            "fr" => PromptLanguage::French,
            "es" => PromptLanguage::Spanish,
            "de" => PromptLanguage::German,
            _ => PromptLanguage::English,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PromptLanguage::English => "en",
            PromptLanguage::French => "fr",
            PromptLanguage::Spanish => "es",
            PromptLanguage::German => "de",
        }
    }
}

/// Instruction système envoyée dans le setup
pub fn system_instruction(language: &str) -> String {
    match PromptLanguage::from_code(language) {
        PromptLanguage::English => "You are a voice assistant embedded in a data analysis application. \
            Answer briefly and conversationally, in English. \
            When the user asks to see data, call render_chart with a chart type, a title, \
            a one-sentence summary, the series and the data rows. \
            When the user asks to open a part of the application, call navigate_app with the view identifier. \
            Never read raw data rows aloud."
            .to_string(),
        PromptLanguage::French => "Tu es un assistant vocal intégré à une application d'analyse de données. \
            Réponds brièvement, sur un ton naturel, en français. \
            Quand l'utilisateur veut voir des données, appelle render_chart avec un type de graphique, un titre, \
            un résumé d'une phrase, les séries et les lignes de données. \
            Quand l'utilisateur veut ouvrir une partie de l'application, appelle navigate_app avec l'identifiant de la vue. \
            Ne lis jamais les lignes de données à voix haute."
            .to_string(),
        PromptLanguage::Spanish => "Eres un asistente de voz integrado en una aplicación de análisis de datos. \
            Responde de forma breve y natural, en español. \
            Cuando el usuario quiera ver datos, llama a render_chart con un tipo de gráfico, un título, \
            un resumen de una frase, las series y las filas de datos. \
            Cuando el usuario quiera abrir una parte de la aplicación, llama a navigate_app con el identificador de la vista. \
            Nunca leas en voz alta las filas de datos."
            .to_string(),
        PromptLanguage::German => "Du bist ein Sprachassistent in einer Datenanalyse-Anwendung. \
            Antworte kurz und natürlich, auf Deutsch. \
            Wenn der Benutzer Daten sehen möchte, rufe render_chart mit einem Diagrammtyp, einem Titel, \
            einer Zusammenfassung in einem Satz, den Datenreihen und den Datenzeilen auf. \
            Wenn der Benutzer einen Bereich der Anwendung öffnen möchte, rufe navigate_app mit der Ansichtskennung auf. \
            Lies niemals Datenzeilen laut vor."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_resolution() {
        assert_eq!(PromptLanguage::from_code("fr"), PromptLanguage::French);
        assert_eq!(PromptLanguage::from_code("fr-CA"), PromptLanguage::French);
        assert_eq!(PromptLanguage::from_code("ES"), PromptLanguage::Spanish);
        assert_eq!(PromptLanguage::from_code("de_DE"), PromptLanguage::German);
        assert_eq!(PromptLanguage::from_code("ja"), PromptLanguage::English);
        assert_eq!(PromptLanguage::from_code(""), PromptLanguage::English);
    }

    #[test]
    fn test_instruction_mentions_tools() {
        for code in ["en", "fr", "es", "de"] {
            let text = system_instruction(code);
            assert!(text.contains("render_chart"), "{}", code);
            assert!(text.contains("navigate_app"), "{}", code);
        }
        assert_eq!(system_instruction("pt"), system_instruction("en"));
    }
}
