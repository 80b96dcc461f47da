pub mod history;

pub use history::{ConversationSummary, HistoryStore, StoredMessage};
