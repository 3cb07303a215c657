//! Error vocabulary shared across every MemNexus crate.

use core::fmt;

/// Errors surfaced by the LLM client (C5).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// A transport-level failure (network, connection reset, malformed response body).
    #[error("llm transport error: {0}")]
    Transport(String),
    /// The call did not complete within the configured `timeoutMs`.
    #[error("llm call timed out after {0}ms")]
    Timeout(u64),
    /// The requested provider/model has no credentials or endpoint configured.
    ///
    /// Non-retryable: callers should skip straight to the next fallback model.
    #[error("llm provider '{0}' is not configured")]
    UnconfiguredProvider(String),
    /// The provider returned content that could not be parsed into the expected shape.
    #[error("llm returned invalid output: {0}")]
    InvalidOutput(String),
    /// The caller's cancellation signal fired before any attempt completed.
    #[error("llm call cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether the request should move on to the next configured fallback model.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnconfiguredProvider(_) | Self::Cancelled)
    }
}

/// Unified error kind for the memory engine (spec §7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Fact Store (C1) failure: connection, query, or migration error.
    #[error("storage error: {0}")]
    Storage(String),
    /// Vector Store (C2) failure: index or persistence error.
    #[error("vector store error: {0}")]
    VectorStore(String),
    /// Embedding Client (C4) failure.
    #[error("embedding unavailable: {0}")]
    Embedding(String),
    /// LLM Client (C5) failure.
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// A read or write attempted to cross a scope boundary it is not allowed to see.
    #[error("scope violation: {0}")]
    ScopeViolation(String),
    /// Caller-supplied data failed validation (e.g. `text` shorter than 2 characters).
    #[error("validation error: {0}")]
    Validation(String),
    /// The requested id does not exist (or is not visible under the current scope/asOf).
    #[error("not found: {0}")]
    NotFound(String),
    /// The requested mutation conflicts with the current state (e.g. cyclic supersession).
    #[error("conflict: {0}")]
    Conflict(String),
    /// The supplied configuration is structurally invalid.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl Error {
    /// Shorthand for [`Error::Storage`].
    #[must_use]
    pub fn storage(msg: impl fmt::Display) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Shorthand for [`Error::VectorStore`].
    #[must_use]
    pub fn vector_store(msg: impl fmt::Display) -> Self {
        Self::VectorStore(msg.to_string())
    }

    /// Shorthand for [`Error::NotFound`].
    #[must_use]
    pub fn not_found(msg: impl fmt::Display) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Shorthand for [`Error::Validation`].
    #[must_use]
    pub fn validation(msg: impl fmt::Display) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Returns a subsystem tag used for structured log breadcrumbs (§7).
    #[must_use]
    pub const fn subsystem(&self) -> &'static str {
        match self {
            Self::Storage(_) => "store",
            Self::VectorStore(_) => "vector",
            Self::Embedding(_) => "embedding",
            Self::Llm(_) => "llm",
            Self::ScopeViolation(_) => "scope",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "lookup",
            Self::Conflict(_) => "conflict",
            Self::ConfigInvalid(_) => "config",
        }
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = core::result::Result<T, Error>;

/// A structured breadcrumb pushed to the pending-warnings channel (spec §4.6, §7).
///
/// The recall pipeline and maintenance engine never fail the caller; instead they
/// push a breadcrumb here and degrade gracefully.
#[derive(Debug, Clone)]
pub struct Breadcrumb {
    /// Component that observed the failure (`store`, `vector`, `llm`, …).
    pub subsystem: &'static str,
    /// Operation being attempted (`search`, `embed`, `classify`, …).
    pub operation: &'static str,
    /// Optional id (fact id, procedure id) the failure relates to.
    pub id: Option<String>,
    /// Human-readable message, safe to show to an operator.
    pub message: String,
}

impl Breadcrumb {
    /// Builds a breadcrumb from an [`Error`].
    #[must_use]
    pub fn from_error(operation: &'static str, id: Option<String>, err: &Error) -> Self {
        Self {
            subsystem: err.subsystem(),
            operation,
            id,
            message: err.to_string(),
        }
    }
}

/// An in-process sink collecting breadcrumbs for a single pipeline invocation.
///
/// Matches spec §4.6's `pendingWarnings` clause: LLM/subsystem errors during
/// recall are logged here and never surfaced to the agent as a failure.
#[derive(Debug, Default, Clone)]
pub struct PendingWarnings {
    items: Vec<Breadcrumb>,
}

impl PendingWarnings {
    /// Creates an empty warnings sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a breadcrumb. Never fails; this is a degrade-gracefully sink.
    pub fn push(&mut self, crumb: Breadcrumb) {
        tracing::warn!(
            subsystem = crumb.subsystem,
            operation = crumb.operation,
            id = ?crumb.id,
            "{}",
            crumb.message
        );
        self.items.push(crumb);
    }

    /// Returns and clears all recorded breadcrumbs.
    pub fn drain(&mut self) -> Vec<Breadcrumb> {
        core::mem::take(&mut self.items)
    }

    /// True if nothing has degraded so far.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
