//! Background workers for the DeepThink app.
//!
//! Completions and balance queries run on plain threads that own a tokio
//! runtime; results flow back to the UI over std channels and are drained
//! once per frame.

use crate::types::ChatEvent;
use assistant::{ExtractorEvent, FileOpExecutor, JsonStreamExtractor};
use providers::deepseek::{self, DeepSeekClient};
use shared::chat_api::{ChatMessage as ApiChatMessage, StreamChunk};
use shared::response::parse_response;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

/// Interval between periodic balance refreshes.
const BALANCE_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Run one streaming completion in a background thread (non-blocking for the
/// UI). Every outcome ends with `ChatEvent::Completed`.
pub fn run_chat_stream(
    api_key: String,
    base_url: String,
    model_display: String,
    temperature: f32,
    messages: Vec<ApiChatMessage>,
    tx: Sender<ChatEvent>,
) {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = tx.send(ChatEvent::Error(format!(
                "Failed to start async runtime: {e}"
            )));
            let _ = tx.send(ChatEvent::Completed {
                answer: String::new(),
                reasoning: String::new(),
            });
            return;
        }
    };

    let mut answer = String::new();
    let mut reasoning = String::new();

    rt.block_on(async {
        let client = DeepSeekClient::new(api_key, &base_url);
        let model = deepseek::model_id(&model_display);
        let (chunk_tx, mut chunk_rx) = tokio::sync::mpsc::unbounded_channel();

        let request = tokio::spawn(async move {
            client
                .chat_stream(model, &messages, temperature, chunk_tx)
                .await
        });

        let mut extractor = JsonStreamExtractor::new();
        let mut reasoning_started: Option<Instant> = None;
        let mut thinking_reported = false;

        while let Some(chunk) = chunk_rx.recv().await {
            match chunk {
                StreamChunk::Reasoning(token) => {
                    if reasoning_started.is_none() {
                        reasoning_started = Some(Instant::now());
                    }
                    reasoning.push_str(&token);
                    let _ = tx.send(ChatEvent::ReasoningToken(token));
                }
                StreamChunk::Text(token) => {
                    if let Some(started) = reasoning_started {
                        if !thinking_reported {
                            thinking_reported = true;
                            let _ = tx.send(ChatEvent::ThinkingFinished(
                                started.elapsed().as_secs_f64(),
                            ));
                        }
                    }
                    answer.push_str(&token);
                    for event in extractor.feed(&token) {
                        match event {
                            ExtractorEvent::Prose(text) => {
                                let _ = tx.send(ChatEvent::AnswerToken(text));
                            }
                            ExtractorEvent::Payload(raw) => handle_payload(&raw, &tx),
                            ExtractorEvent::Invalid(e) => {
                                let _ = tx.send(ChatEvent::Error(format!(
                                    "Error parsing assistant response: {e}"
                                )));
                            }
                        }
                    }
                }
                StreamChunk::Done => break,
            }
        }

        // A reasoning-only stream still counts toward thinking time.
        if let Some(started) = reasoning_started {
            if !thinking_reported {
                let _ = tx.send(ChatEvent::ThinkingFinished(started.elapsed().as_secs_f64()));
            }
        }

        if let Err(e) = extractor.finish() {
            let _ = tx.send(ChatEvent::Error(format!("Error parsing response: {e}")));
        }

        match request.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("completion request failed: {e}");
                let _ = tx.send(ChatEvent::Error(format!("Error: {e}")));
            }
            Err(e) => {
                let _ = tx.send(ChatEvent::Error(format!("Error: request task failed: {e}")));
            }
        }
    });

    let _ = tx.send(ChatEvent::Completed { answer, reasoning });
}

/// Validate a completed payload and apply its file operations. Each report
/// line becomes its own bubble; a failed item never stops the batch.
fn handle_payload(raw: &str, tx: &Sender<ChatEvent>) {
    let response = match parse_response(raw) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("assistant payload rejected: {e}");
            let _ = tx.send(ChatEvent::Error(format!(
                "Error parsing assistant response: {e}"
            )));
            return;
        }
    };

    // The reply is shown before any operation runs.
    let _ = tx.send(ChatEvent::PayloadReply(response.assistant_reply.clone()));

    if response.files_to_create.is_empty() && response.files_to_edit.is_empty() {
        return;
    }

    let executor = match FileOpExecutor::new() {
        Ok(executor) => executor,
        Err(e) => {
            let _ = tx.send(ChatEvent::Error(format!(
                "Error resolving working directory: {e}"
            )));
            return;
        }
    };
    for report in executor.execute(&response) {
        let _ = tx.send(ChatEvent::OpReport(report.message()));
    }
}

/// Fetch the balance once and report it. Failures surface as 0.0.
pub fn run_balance_update(api_key: String, base_url: String, tx: Sender<f64>) {
    std::thread::spawn(move || {
        let Ok(rt) = tokio::runtime::Runtime::new() else {
            return;
        };
        let client = DeepSeekClient::new(api_key, &base_url);
        let _ = tx.send(rt.block_on(client.balance_or_zero()));
    });
}

/// Detached loop refreshing the balance every five minutes for the lifetime
/// of the process.
pub fn start_balance_poller(api_key: String, base_url: String, tx: Sender<f64>) {
    std::thread::spawn(move || {
        let Ok(rt) = tokio::runtime::Runtime::new() else {
            tracing::error!("balance poller could not start a runtime");
            return;
        };
        let client = DeepSeekClient::new(api_key, &base_url);
        loop {
            let balance = rt.block_on(client.balance_or_zero());
            if tx.send(balance).is_err() {
                return;
            }
            std::thread::sleep(BALANCE_POLL_INTERVAL);
        }
    });
}
