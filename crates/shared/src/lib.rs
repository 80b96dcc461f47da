pub mod response;

pub mod chat_api {
    use serde::{Deserialize, Serialize};

    /// A message in the wire format the completion endpoint expects.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            Self {
                role: "system".to_string(),
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".to_string(),
                content: content.into(),
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                role: "assistant".to_string(),
                content: content.into(),
            }
        }
    }

    /// An incremental piece of a streaming completion.
    ///
    /// The reasoner model interleaves two channels: intermediate deliberation
    /// (`Reasoning`) and the final answer (`Text`). Only `Text` tokens are ever
    /// inspected for an embedded file-operation payload.
    #[derive(Debug, Clone, PartialEq)]
    pub enum StreamChunk {
        Reasoning(String),
        Text(String),
        Done,
    }
}

pub mod settings {
    use serde::{Deserialize, Serialize};

    fn default_temperature() -> f32 {
        0.7
    }

    fn default_base_url() -> String {
        "https://api.deepseek.com".to_string()
    }

    fn default_dark_mode() -> bool {
        true
    }

    fn default_model() -> String {
        "DeepThink-V3".to_string()
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        #[serde(default = "default_base_url")]
        pub base_url: String,
        /// Display name of the selected model (key into the model catalog).
        #[serde(default = "default_model")]
        pub selected_model: String,
        #[serde(default = "default_temperature")]
        pub temperature: f32,
        #[serde(default = "default_dark_mode")]
        pub dark_mode: bool,
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                base_url: default_base_url(),
                selected_model: "DeepThink-V3".to_string(),
                temperature: default_temperature(),
                dark_mode: true,
            }
        }
    }
}
