//! # memnexus-core
//!
//! Shared vocabulary for the MemNexus hybrid memory engine: the [`model`] types
//! every store/recall/maintenance crate exchanges, the [`Error`] kind every
//! fallible call returns, and the provider-agnostic [`EmbeddingModel`] /
//! [`LanguageModel`] traits external collaborators implement.
//!
//! This crate intentionally does not depend on a storage engine, a vector
//! index, or any concrete LLM SDK — those live in `memnexus-store`,
//! `memnexus-vector`, and `memnexus-llm` respectively, each implementing the
//! traits defined here.

pub mod clock;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod message;
pub mod model;

pub use clock::{Clock, FixedClock, SystemClock};
pub use embedding::EmbeddingModel;
pub use error::{Breadcrumb, Error, LlmError, PendingWarnings, Result};
pub use llm::{CancelSignal, ChatParams, LanguageModel};
pub use message::{Message, Role, oneshot};
pub use model::{
    Category, DecayClass, Fact, Procedure, ProcedureStep, ProcedureType, Scope, ScopeFilter,
    Tier, TierFilter, VectorRecord,
};
