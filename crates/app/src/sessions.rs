//! Conversation lifecycle: sending messages, draining worker events,
//! switching and restoring conversations.

use crate::state;
use crate::types::*;
use crate::utils;
use shared::chat_api::ChatMessage as ApiChatMessage;
use std::path::Path;
use std::sync::mpsc::{self, TryRecvError};

/// Flat per-request usage estimate; the endpoint reports no per-call cost.
const USAGE_PER_REQUEST: f64 = 0.002;

fn file_message(path: &Path, content: &str) -> String {
    format!(
        "I'm adding this file: {}\n\nFile contents:\n{content}",
        path.display()
    )
}

fn file_ack(name: &str) -> String {
    format!(
        "I've received the file {name}. I can help you analyze or modify this file. \
         What would you like me to do with it?"
    )
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl AppState {
    pub fn new() -> Self {
        let settings = utils::load_settings_or_default();
        let store = match services::HistoryStore::open_default() {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::error!("history store unavailable, running without persistence: {e}");
                None
            }
        };
        let past_conversations = store
            .as_ref()
            .and_then(|s| s.list_conversations().ok())
            .unwrap_or_default();
        let api_key = std::env::var("DEEPSEEK_API_KEY").unwrap_or_default();

        Self {
            settings,
            api_key,
            conversation_id: uuid::Uuid::new_v4().to_string(),
            wire_history: vec![ApiChatMessage::system(SYSTEM_PROMPT)],
            transcript: Vec::new(),
            past_conversations,
            input_text: String::new(),
            awaiting_response: false,
            chat_rx: None,
            answer_bubble: None,
            balance_rx: None,
            balance_tx: None,
            api_balance: 0.0,
            total_thinking_secs: 0.0,
            store,
            workspace_files: Vec::new(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Called once an API key is known: start the periodic balance poll.
    pub fn start_balance_polling(&mut self) {
        let (tx, rx) = mpsc::channel();
        state::start_balance_poller(self.api_key.clone(), self.settings.base_url.clone(), tx.clone());
        self.balance_rx = Some(rx);
        self.balance_tx = Some(tx);
    }

    pub fn send_message(&mut self) {
        let message = self.input_text.trim().to_string();
        if message.is_empty() || self.awaiting_response || !self.has_api_key() {
            return;
        }
        self.input_text.clear();

        self.transcript.push(DisplayMessage::user(&message));
        self.wire_history.push(ApiChatMessage::user(&message));
        self.persist_message("user", &message, false);
        self.record_usage();

        let (tx, rx) = mpsc::channel();
        self.chat_rx = Some(rx);
        self.answer_bubble = None;
        self.awaiting_response = true;

        let api_key = self.api_key.clone();
        let base_url = self.settings.base_url.clone();
        let model = self.settings.selected_model.clone();
        let temperature = self.settings.temperature;
        let messages = self.messages_for_request();
        std::thread::spawn(move || {
            state::run_chat_stream(api_key, base_url, model, temperature, messages, tx)
        });

        // Refresh the displayed balance alongside the request.
        if let Some(balance_tx) = &self.balance_tx {
            state::run_balance_update(
                self.api_key.clone(),
                self.settings.base_url.clone(),
                balance_tx.clone(),
            );
        }
    }

    /// Wire history with workspace files re-injected. A tracked file whose
    /// path no longer appears anywhere in the history (the injection message
    /// names the path) is re-read and appended, so the model keeps seeing
    /// current file contents.
    fn messages_for_request(&self) -> Vec<ApiChatMessage> {
        let mut messages = self.wire_history.clone();
        for path in &self.workspace_files {
            let marker = path.display().to_string();
            if messages.iter().any(|m| m.content.contains(&marker)) {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    messages.push(ApiChatMessage::user(file_message(path, &content)));
                    messages.push(ApiChatMessage::assistant(file_ack(&file_label(path))));
                }
                Err(e) => tracing::warn!("could not re-read workspace file {marker}: {e}"),
            }
        }
        messages
    }

    /// Drain pending worker events. Called once per frame.
    pub fn poll_chat_events(&mut self) {
        let mut events = Vec::new();
        let mut disconnected = false;
        match &self.chat_rx {
            Some(rx) => loop {
                match rx.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            },
            None => return,
        }

        for event in events {
            self.apply_chat_event(event);
        }
        if disconnected && self.awaiting_response {
            // The worker died without its final event.
            self.transcript
                .push(DisplayMessage::assistant("Error: response worker exited"));
            self.finish_request();
        }
    }

    fn apply_chat_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::ReasoningToken(token) => match self.transcript.last_mut() {
                Some(last) if last.is_reasoning => last.content.push_str(&token),
                _ => self.transcript.push(DisplayMessage::reasoning(token)),
            },
            ChatEvent::AnswerToken(token) => match self.answer_bubble {
                Some(idx) => self.transcript[idx].content.push_str(&token),
                None => {
                    self.transcript.push(DisplayMessage::assistant(token));
                    self.answer_bubble = Some(self.transcript.len() - 1);
                }
            },
            ChatEvent::PayloadReply(reply) => {
                self.transcript.push(DisplayMessage::assistant(reply));
            }
            ChatEvent::OpReport(line) => {
                self.transcript.push(DisplayMessage::assistant(line));
            }
            ChatEvent::ThinkingFinished(secs) => {
                self.total_thinking_secs += secs;
                if let Some(bubble) = self.transcript.iter_mut().rev().find(|m| m.is_reasoning) {
                    bubble.thinking_secs = Some(secs);
                }
                if let Some(store) = &self.store {
                    if let Err(e) = store.add_thinking_time(secs, &self.conversation_id) {
                        tracing::error!("could not record thinking time: {e}");
                    }
                }
            }
            ChatEvent::Error(message) => {
                self.transcript.push(DisplayMessage::assistant(message));
            }
            ChatEvent::Completed { answer, reasoning } => {
                if !reasoning.is_empty() {
                    self.persist_message("assistant", &reasoning, true);
                }
                if !answer.is_empty() {
                    self.wire_history.push(ApiChatMessage::assistant(&answer));
                    self.persist_message("assistant", &answer, false);
                }
                self.finish_request();
            }
        }
    }

    fn finish_request(&mut self) {
        self.awaiting_response = false;
        self.chat_rx = None;
        self.answer_bubble = None;
        self.refresh_conversations();
    }

    pub fn poll_balance(&mut self) {
        let Some(rx) = &self.balance_rx else {
            return;
        };
        while let Ok(balance) = rx.try_recv() {
            self.api_balance = balance;
        }
    }

    /// Start a fresh conversation, keeping the sidebar entry for the old one.
    pub fn new_chat(&mut self) {
        if self.awaiting_response {
            return;
        }
        self.conversation_id = uuid::Uuid::new_v4().to_string();
        self.wire_history = vec![ApiChatMessage::system(SYSTEM_PROMPT)];
        self.transcript.clear();
        self.workspace_files.clear();
        self.total_thinking_secs = 0.0;
        self.answer_bubble = None;
        self.refresh_conversations();
    }

    /// Restore a past conversation from the store.
    pub fn load_conversation(&mut self, conversation_id: &str) {
        if self.awaiting_response {
            return;
        }
        let Some(store) = &self.store else {
            return;
        };
        let rows = match store.get_chat_history(conversation_id) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("could not load conversation {conversation_id}: {e}");
                return;
            }
        };

        let mut transcript = Vec::new();
        let mut wire_history = vec![ApiChatMessage::system(SYSTEM_PROMPT)];
        for row in rows {
            if row.is_reasoning {
                transcript.push(DisplayMessage::reasoning(row.content));
                continue;
            }
            if row.role == "user" {
                transcript.push(DisplayMessage::user(row.content.clone()));
                wire_history.push(ApiChatMessage::user(row.content));
            } else {
                transcript.push(DisplayMessage::assistant(row.content.clone()));
                wire_history.push(ApiChatMessage::assistant(row.content));
            }
        }

        self.total_thinking_secs = store
            .total_thinking_time(Some(conversation_id))
            .unwrap_or(0.0);
        self.conversation_id = conversation_id.to_string();
        self.transcript = transcript;
        self.wire_history = wire_history;
        self.workspace_files.clear();
        self.answer_bubble = None;
    }

    /// Inject a local file into the conversation as a user message plus a
    /// canned acknowledgment, so the model sees its contents next turn.
    pub fn add_file(&mut self, path: &Path) {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                self.transcript.push(DisplayMessage::assistant(format!(
                    "Error adding file {}: {e}",
                    path.display()
                )));
                return;
            }
        };
        let name = file_label(path);
        let injected = file_message(path, &content);
        let ack = file_ack(&name);

        self.wire_history.push(ApiChatMessage::user(&injected));
        self.wire_history.push(ApiChatMessage::assistant(&ack));
        self.persist_message("user", &injected, false);
        self.persist_message("assistant", &ack, false);

        self.transcript
            .push(DisplayMessage::user(format!("Added file to workspace: {name}")));
        self.transcript.push(DisplayMessage::assistant(ack));
        self.workspace_files.push(path.to_path_buf());
        self.refresh_conversations();
    }

    fn persist_message(&self, role: &str, content: &str, is_reasoning: bool) {
        if let Some(store) = &self.store {
            if let Err(e) =
                store.add_chat_message(role, content, &self.conversation_id, is_reasoning)
            {
                tracing::error!("could not persist chat message: {e}");
            }
        }
    }

    fn record_usage(&self) {
        if let Some(store) = &self.store {
            if let Err(e) =
                store.add_api_usage(USAGE_PER_REQUEST, "chat_completion", &self.conversation_id)
            {
                tracing::error!("could not record usage: {e}");
            }
        }
    }

    fn refresh_conversations(&mut self) {
        if let Some(store) = &self.store {
            match store.list_conversations() {
                Ok(list) => self.past_conversations = list,
                Err(e) => tracing::error!("could not list conversations: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_store() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = services::HistoryStore::open(dir.path().join("test.db")).unwrap();
        let mut state = blank_state();
        state.store = Some(store);
        (dir, state)
    }

    fn blank_state() -> AppState {
        AppState {
            settings: shared::settings::AppSettings::default(),
            api_key: "sk-test".to_string(),
            conversation_id: "conv-test".to_string(),
            wire_history: vec![ApiChatMessage::system(SYSTEM_PROMPT)],
            transcript: Vec::new(),
            past_conversations: Vec::new(),
            input_text: String::new(),
            awaiting_response: false,
            chat_rx: None,
            answer_bubble: None,
            balance_rx: None,
            balance_tx: None,
            api_balance: 0.0,
            total_thinking_secs: 0.0,
            store: None,
            workspace_files: Vec::new(),
        }
    }

    #[test]
    fn test_answer_tokens_stream_into_one_bubble() {
        let mut state = blank_state();
        state.apply_chat_event(ChatEvent::AnswerToken("Hel".into()));
        state.apply_chat_event(ChatEvent::AnswerToken("lo".into()));
        assert_eq!(state.transcript.len(), 1);
        assert_eq!(state.transcript[0].content, "Hello");
        assert_eq!(state.transcript[0].author, Author::Assistant);
    }

    #[test]
    fn test_reasoning_and_answer_get_separate_bubbles() {
        let mut state = blank_state();
        state.apply_chat_event(ChatEvent::ReasoningToken("mull".into()));
        state.apply_chat_event(ChatEvent::ReasoningToken("ing".into()));
        state.apply_chat_event(ChatEvent::AnswerToken("done".into()));
        assert_eq!(state.transcript.len(), 2);
        assert!(state.transcript[0].is_reasoning);
        assert_eq!(state.transcript[0].content, "mulling");
        assert!(!state.transcript[1].is_reasoning);
    }

    #[test]
    fn test_completed_extends_wire_history_and_persists() {
        let (_dir, mut state) = state_with_store();
        state.awaiting_response = true;
        state.apply_chat_event(ChatEvent::Completed {
            answer: "final answer".into(),
            reasoning: "some thoughts".into(),
        });
        assert!(!state.awaiting_response);
        assert_eq!(state.wire_history.last().unwrap().content, "final answer");

        let rows = state
            .store
            .as_ref()
            .unwrap()
            .get_chat_history("conv-test")
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_reasoning);
        assert_eq!(rows[1].content, "final answer");
    }

    #[test]
    fn test_thinking_time_accumulates() {
        let (_dir, mut state) = state_with_store();
        state.apply_chat_event(ChatEvent::ThinkingFinished(2.0));
        state.apply_chat_event(ChatEvent::ThinkingFinished(1.5));
        assert!((state.total_thinking_secs - 3.5).abs() < 1e-9);
        let stored = state
            .store
            .as_ref()
            .unwrap()
            .total_thinking_time(Some("conv-test"))
            .unwrap();
        assert!((stored - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_new_chat_resets_session() {
        let (_dir, mut state) = state_with_store();
        let old_id = state.conversation_id.clone();
        state.transcript.push(DisplayMessage::user("hi"));
        state.total_thinking_secs = 9.0;
        state.new_chat();
        assert_ne!(state.conversation_id, old_id);
        assert!(state.transcript.is_empty());
        assert_eq!(state.total_thinking_secs, 0.0);
        assert_eq!(state.wire_history.len(), 1);
        assert_eq!(state.wire_history[0].role, "system");
    }

    #[test]
    fn test_load_conversation_rebuilds_both_histories() {
        let (_dir, mut state) = state_with_store();
        {
            let store = state.store.as_ref().unwrap();
            store.add_chat_message("user", "question", "past", false).unwrap();
            store
                .add_chat_message("assistant", "pondering", "past", true)
                .unwrap();
            store
                .add_chat_message("assistant", "answer", "past", false)
                .unwrap();
        }
        state.load_conversation("past");
        assert_eq!(state.conversation_id, "past");
        assert_eq!(state.transcript.len(), 3);
        assert!(state.transcript[1].is_reasoning);
        // Reasoning rows are display-only; the wire history skips them.
        assert_eq!(state.wire_history.len(), 3);
        assert_eq!(state.wire_history[2].content, "answer");
    }

    #[test]
    fn test_thinking_duration_lands_on_reasoning_bubble() {
        let mut state = blank_state();
        state.apply_chat_event(ChatEvent::ReasoningToken("pondering".into()));
        state.apply_chat_event(ChatEvent::AnswerToken("done".into()));
        state.apply_chat_event(ChatEvent::ThinkingFinished(12.3));
        assert!(state.transcript[0].is_reasoning);
        assert_eq!(state.transcript[0].thinking_secs, Some(12.3));
        assert_eq!(state.transcript[1].thinking_secs, None);
    }

    #[test]
    fn test_workspace_files_reinjected_when_absent_from_history() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "fn answer() -> u32 { 42 }").unwrap();

        let mut state = blank_state();
        state.workspace_files.push(path.clone());

        // Nothing in the history mentions the file, so it gets appended.
        let messages = state.messages_for_request();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.contains("fn answer() -> u32 { 42 }"));
        assert_eq!(messages[2].role, "assistant");
    }

    #[test]
    fn test_workspace_files_not_duplicated_when_already_in_history() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "contents").unwrap();

        let mut state = blank_state();
        state.add_file(&path);
        let before = state.wire_history.len();
        let messages = state.messages_for_request();
        assert_eq!(messages.len(), before);
    }

    #[test]
    fn test_send_ignored_without_key_or_while_busy() {
        let mut state = blank_state();
        state.api_key.clear();
        state.input_text = "hello".to_string();
        state.send_message();
        assert!(state.transcript.is_empty());

        let mut busy = blank_state();
        busy.awaiting_response = true;
        busy.input_text = "hello".to_string();
        busy.send_message();
        assert!(busy.transcript.is_empty());
    }
}
