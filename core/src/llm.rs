//! Chat-completion trait (C5), generalized from `aither_core::llm::LanguageModel`'s
//! streaming/tool-calling surface down to the one-shot `chatComplete` contract
//! spec §4.4 actually needs. Retry, timeout, and provider-fallback orchestration
//! live in `memnexus-llm`'s `ChatClient`, not in this trait — implementors only
//! need to make a single attempt against a single model id.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::LlmError;
use crate::message::Message;

/// Sampling/length parameters for one chat-completion attempt.
#[derive(Debug, Clone, Copy)]
pub struct ChatParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

/// Cooperative cancellation signal shared across every stage derived from one
/// user prompt (spec §5: "Recall-pipeline stages derived from one user prompt
/// share one signal").
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Creates a fresh, not-yet-cancelled signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single chat-completion provider capable of serving one or more model ids.
///
/// Implementations execute exactly one attempt; they must not retry internally.
/// An `UnconfiguredProvider` error should be returned immediately (non-retryable,
/// spec §4.4) rather than after a timeout.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Executes one completion attempt, returning the assistant's text content.
    ///
    /// An empty response after a successful call is still returned as `Ok("")`;
    /// callers (the retry/fallback router) decide whether empty content after
    /// every attempt is an error, per spec §4.4.
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        params: &ChatParams,
    ) -> Result<String, LlmError>;
}
