//! Core type definitions for the DeepThink app.

use services::ConversationSummary;
use shared::chat_api::ChatMessage as ApiChatMessage;
use shared::settings::AppSettings;
use std::sync::mpsc::Receiver;

/// Instructions sent as the first message of every conversation. The output
/// format section must stay in sync with `shared::response`.
pub const SYSTEM_PROMPT: &str = r#"You are an elite software engineer called DeepThink with decades of experience across all programming domains.
Your expertise spans system design, algorithms, testing, and best practices.
You provide thoughtful, well-structured solutions while explaining your reasoning.

Core capabilities:
1. Code Analysis & Discussion
   - Analyze code with expert-level insight
   - Explain complex concepts clearly
   - Suggest optimizations and best practices
   - Debug issues with precision

2. File Operations:
   When files are added to the workspace:
   - You can automatically read their contents
   - You can analyze multiple files together
   - You can make changes or create new files
   - You will be notified when files are added

Output Format for File Operations:
{
  "assistant_reply": "Your explanation of the changes",
  "files_to_create": [
    {
      "path": "relative/path/to/new/file",
      "content": "complete file content with proper formatting"
    }
  ],
  "files_to_edit": [
    {
      "path": "path/to/file",
      "original_snippet": "exact code to replace (include enough context)",
      "new_snippet": "new code with proper indentation"
    }
  ]
}

Guidelines:
1. For new files, include complete, properly formatted code.
2. For edits, use precise, minimal snippets.
3. After changes, confirm what was changed and explain how to test it.

Remember: You're a senior engineer - be thorough, precise, and thoughtful in your solutions."#;

/// Who authored a transcript bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    User,
    Assistant,
}

/// One rendered bubble in the transcript.
#[derive(Debug, Clone)]
pub struct DisplayMessage {
    pub author: Author,
    pub content: String,
    /// Reasoning bubbles render collapsed behind a "Thinking" header.
    pub is_reasoning: bool,
    /// Elapsed reasoning seconds, shown in the collapsed header once known.
    pub thinking_secs: Option<f64>,
}

impl DisplayMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            author: Author::User,
            content: content.into(),
            is_reasoning: false,
            thinking_secs: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            author: Author::Assistant,
            content: content.into(),
            is_reasoning: false,
            thinking_secs: None,
        }
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self {
            author: Author::Assistant,
            content: content.into(),
            is_reasoning: true,
            thinking_secs: None,
        }
    }
}

/// Events a completion worker sends back to the UI thread.
#[derive(Debug)]
pub enum ChatEvent {
    /// One deliberation token, for the collapsible reasoning bubble.
    ReasoningToken(String),
    /// One visible answer token.
    AnswerToken(String),
    /// The `assistant_reply` field of a completed payload.
    PayloadReply(String),
    /// One file-operation result line.
    OpReport(String),
    /// Seconds between the first reasoning token and the first answer token.
    ThinkingFinished(f64),
    /// A reportable failure; shown as an assistant bubble.
    Error(String),
    /// Always the final event. Carries the full accumulated channels for
    /// persistence; `answer` includes any raw payload text.
    Completed { answer: String, reasoning: String },
}

pub struct AppState {
    pub settings: AppSettings,
    pub api_key: String,

    pub conversation_id: String,
    /// Wire-format history sent to the API, system prompt first. Reasoning
    /// content is never part of it.
    pub wire_history: Vec<ApiChatMessage>,
    pub transcript: Vec<DisplayMessage>,
    pub past_conversations: Vec<ConversationSummary>,

    pub input_text: String,
    pub awaiting_response: bool,
    pub chat_rx: Option<Receiver<ChatEvent>>,
    /// Index into `transcript` of the bubble answer tokens stream into.
    pub answer_bubble: Option<usize>,

    pub balance_rx: Option<Receiver<f64>>,
    /// Sender side of the balance channel; one-shot refreshes clone it.
    pub balance_tx: Option<std::sync::mpsc::Sender<f64>>,

    pub api_balance: f64,
    pub total_thinking_secs: f64,

    pub store: Option<services::HistoryStore>,
    pub workspace_files: Vec<std::path::PathBuf>,
}
