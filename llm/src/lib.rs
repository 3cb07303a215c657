//! # memnexus-llm
//!
//! Provider-agnostic embedding and chat-completion clients (C4, C5):
//! normalization guarantees for embeddings, and tiered retry/fallback
//! orchestration for chat completion, built on the traits defined in
//! `memnexus-core`.

mod chat;
mod embedding;

pub use chat::{ChatClient, ModelBinding, RetryPolicy, Tier, TierChain};
pub use embedding::EmbeddingClient;
