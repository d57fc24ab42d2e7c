//! Trames JSON échangées avec le modèle conversationnel
//!
//! Chaque trame client est un objet à clé unique (`setup`, `realtimeInput`,
//! `toolResponse`) : l'énumération `ClientMessage`, sérialisée avec le
//! tagging externe de serde, produit exactement cette forme. Les trames
//! serveur sont lues dans `ServerMessage` dont tous les champs sont
//! optionnels.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use audio::EncodedChunk;

/// Trame envoyée au modèle
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Poignée de main, premier message du canal
    Setup(SessionSetup),

    /// Audio du microphone
    RealtimeInput(RealtimeInput),

    /// Réponses aux appels d'outils, en lot
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// Construit la trame `realtimeInput` d'un bloc audio encodé
    ///
    /// # Example
    /// ```rust
    /// use audio::EncodedChunk;
    /// use network::ClientMessage;
    ///
    /// let msg = ClientMessage::audio_chunk(&EncodedChunk::new(vec![0, 0], 16000));
    /// let json = serde_json::to_value(&msg).unwrap();
    /// assert_eq!(json["realtimeInput"]["mediaChunks"][0]["mimeType"], "audio/pcm;rate=16000");
    /// ```
    pub fn audio_chunk(chunk: &EncodedChunk) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: chunk.mime_type(),
                data: chunk.to_base64(),
            }],
        })
    }

    pub fn tool_response(function_responses: Vec<FunctionResponse>) -> Self {
        ClientMessage::ToolResponse(ToolResponse { function_responses })
    }

    /// Nom court pour les logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Setup(_) => "setup",
            ClientMessage::RealtimeInput(_) => "realtimeInput",
            ClientMessage::ToolResponse(_) => "toolResponse",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Paramètres de session envoyés à l'ouverture
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    /// Modèle, sous la forme `models/<nom>`
    pub model: String,

    pub generation_config: GenerationConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSet>,
}

impl SessionSetup {
    /// Setup minimal : réponse audio, sans instruction ni outil
    pub fn audio(model: &str) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };

        Self {
            model,
            generation_config: GenerationConfig::default(),
            system_instruction: None,
            tools: Vec::new(),
        }
    }

    pub fn with_voice(mut self, voice: Option<&str>) -> Self {
        self.generation_config.speech_config = voice.map(SpeechConfig::prebuilt);
        self
    }

    pub fn with_system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(Content::text(text));
        self
    }

    pub fn with_tools(mut self, declarations: Vec<FunctionDeclaration>) -> Self {
        self.tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: declarations,
            }]
        };
        self
    }

    /// Noms des outils déclarés, dans l'ordre
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .flat_map(|set| set.function_declarations.iter().map(|d| d.name.as_str()))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            response_modalities: vec![ResponseModality::Audio],
            speech_config: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseModality {
    Audio,
    Text,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

impl SpeechConfig {
    pub fn prebuilt(voice_name: &str) -> Self {
        Self {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.to_string(),
                },
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// Déclaration d'un outil exposé au modèle
///
/// `parameters` est un schéma JSON (type objet).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

/// Contenu multi-parties (instruction système ou tour du modèle)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
            role: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Trame reçue du modèle
///
/// Une trame peut combiner plusieurs champs ; les champs inconnus sont ignorés.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,

    #[serde(default)]
    pub server_content: Option<ServerContent>,

    #[serde(default)]
    pub tool_call: Option<ToolCall>,

    #[serde(default)]
    pub tool_call_cancellation: Option<ToolCallCancellation>,

    #[serde(default)]
    pub go_away: Option<GoAway>,
}

impl ServerMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn is_interrupted(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.interrupted)
    }

    pub fn is_turn_complete(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.turn_complete)
    }

    /// Fragments audio base64 du tour du modèle, dans l'ordre
    pub fn audio_fragments(&self) -> Vec<&str> {
        self.server_content
            .as_ref()
            .and_then(|c| c.model_turn.as_ref())
            .map(|turn| {
                turn.parts
                    .iter()
                    .filter_map(|part| part.inline_data.as_ref())
                    .filter(|data| data.mime_type.starts_with("audio/"))
                    .map(|data| data.data.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Appels d'outils demandés par le modèle, dans l'ordre
    pub fn function_calls(&self) -> &[FunctionCall] {
        self.tool_call
            .as_ref()
            .map(|call| call.function_calls.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,

    #[serde(default)]
    pub interrupted: bool,

    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// Appel d'outil individuel
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub args: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Préavis de fermeture envoyé par le serveur
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}
