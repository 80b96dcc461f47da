pub mod extractor;
pub mod file_ops;

pub use extractor::{ExtractError, ExtractorEvent, JsonStreamExtractor};
pub use file_ops::{FileOpExecutor, OpOutcome, OpReport};
