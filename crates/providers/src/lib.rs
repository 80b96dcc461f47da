pub mod deepseek;
pub mod sse;
