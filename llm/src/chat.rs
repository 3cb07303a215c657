//! Tiered chat-completion client (spec §4.4 C5): retry with bounded
//! exponential backoff and jitter, provider fallback, timeouts, and
//! cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use memnexus_core::{Breadcrumb, CancelSignal, ChatParams, LanguageModel, LlmError, Message, PendingWarnings};

/// One named model bound to the provider that serves it.
#[derive(Clone)]
pub struct ModelBinding {
    /// Model id passed to the provider (e.g. `"gpt-4o-mini"`).
    pub model_id: String,
    /// The provider implementation.
    pub provider: Arc<dyn LanguageModel>,
}

impl ModelBinding {
    /// Binds `model_id` to `provider`.
    #[must_use]
    pub fn new(model_id: impl Into<String>, provider: Arc<dyn LanguageModel>) -> Self {
        Self {
            model_id: model_id.into(),
            provider,
        }
    }
}

/// An ordered primary-plus-fallback chain for one named tier
/// (spec §6.4 `llm.{nano,default,heavy}`: "ordered model-id lists with
/// per-tier fallback").
#[derive(Clone)]
pub struct TierChain {
    bindings: Vec<ModelBinding>,
}

impl TierChain {
    /// Builds a chain from a primary binding plus ordered fallbacks.
    #[must_use]
    pub fn new(primary: ModelBinding, fallbacks: Vec<ModelBinding>) -> Self {
        let mut bindings = vec![primary];
        bindings.extend(fallbacks);
        Self { bindings }
    }
}

/// The three named model tiers (spec §4.4, §6.4, §9: "a tier-named router
/// (nano/default/heavy) so model choice is config, not code").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Cheapest/fastest tier, used for HyDE rewrites and overflow summarization.
    Nano,
    /// The default tier for classify-before-write and recall-time calls.
    Default,
    /// The highest-capability tier, used for consolidation merges and reflection.
    Heavy,
}

/// Retry/backoff policy shared by every tier.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts against a single model before moving to the next fallback.
    pub max_attempts: u32,
    /// Base backoff delay; doubled per attempt and jittered.
    pub base_delay: Duration,
    /// Hard per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Tiered chat-completion router (spec §4.4 `chatComplete`).
pub struct ChatClient {
    nano: TierChain,
    default: TierChain,
    heavy: TierChain,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient").finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Builds a router from one chain per tier.
    #[must_use]
    pub fn new(nano: TierChain, default: TierChain, heavy: TierChain, policy: RetryPolicy) -> Self {
        Self {
            nano,
            default,
            heavy,
            policy,
        }
    }

    fn chain(&self, tier: Tier) -> &TierChain {
        match tier {
            Tier::Nano => &self.nano,
            Tier::Default => &self.default,
            Tier::Heavy => &self.heavy,
        }
    }

    /// Runs a chat completion against `tier`, retrying transient failures
    /// with backoff and falling through the configured fallback chain on
    /// exhaustion or non-retryable errors. Breadcrumbs for every failed
    /// attempt are pushed to `warnings`; the call only returns `Err` once
    /// every model in the chain has failed (spec §4.4).
    pub async fn complete(
        &self,
        tier: Tier,
        messages: &[Message],
        params: &ChatParams,
        cancel: &CancelSignal,
        warnings: &mut PendingWarnings,
    ) -> Result<String, LlmError> {
        let chain = self.chain(tier);
        let mut last_err = LlmError::Cancelled;

        for binding in &chain.bindings {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }

            for attempt in 0..self.policy.max_attempts {
                if cancel.is_cancelled() {
                    return Err(LlmError::Cancelled);
                }

                let call = binding.provider.complete(&binding.model_id, messages, params);
                let outcome = tokio::time::timeout(self.policy.timeout, call).await;

                let err = match outcome {
                    Ok(Ok(text)) if !text.trim().is_empty() => return Ok(text),
                    Ok(Ok(_)) => LlmError::InvalidOutput("empty completion".into()),
                    Ok(Err(e)) => e,
                    Err(_) => LlmError::Timeout(self.policy.timeout.as_millis() as u64),
                };

                warnings.push(Breadcrumb {
                    subsystem: "llm",
                    operation: "complete",
                    id: Some(binding.model_id.clone()),
                    message: err.to_string(),
                });

                let retryable = err.is_retryable();
                last_err = err;
                if !retryable {
                    break;
                }
                if attempt + 1 < self.policy.max_attempts {
                    tokio::time::sleep(backoff_with_jitter(self.policy.base_delay, attempt)).await;
                }
            }
        }

        Err(last_err)
    }
}

/// Exponential backoff with +/-20% jitter, per spec §4.4 ("bounded
/// exponential backoff with jitter").
fn backoff_with_jitter(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.min(8));
    let jitter_frac = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_secs_f64(exp.as_secs_f64() * jitter_frac)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use memnexus_core::message;

    use super::*;

    struct FlakyOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for FlakyOnce {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[Message],
            _params: &ChatParams,
        ) -> Result<String, LlmError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LlmError::Transport("connection reset".into()))
            } else {
                Ok("recovered".into())
            }
        }
    }

    struct AlwaysUnconfigured;

    #[async_trait]
    impl LanguageModel for AlwaysUnconfigured {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[Message],
            _params: &ChatParams,
        ) -> Result<String, LlmError> {
            Err(LlmError::UnconfiguredProvider("primary".into()))
        }
    }

    struct AlwaysOk;

    #[async_trait]
    impl LanguageModel for AlwaysOk {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[Message],
            _params: &ChatParams,
        ) -> Result<String, LlmError> {
            Ok("fallback answer".into())
        }
    }

    struct AlwaysEmpty;

    #[async_trait]
    impl LanguageModel for AlwaysEmpty {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[Message],
            _params: &ChatParams,
        ) -> Result<String, LlmError> {
            Ok("   \n".into())
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn retries_transient_failure_then_succeeds() {
        let binding = ModelBinding::new(
            "m1",
            Arc::new(FlakyOnce {
                calls: AtomicUsize::new(0),
            }),
        );
        let chain = TierChain::new(binding, Vec::new());
        let client = ChatClient::new(chain.clone(), chain.clone(), chain, quick_policy());

        let messages = message::oneshot("sys", "hi");
        let mut warnings = PendingWarnings::new();
        let result = client
            .complete(Tier::Default, &messages, &ChatParams::default(), &CancelSignal::new(), &mut warnings)
            .await
            .unwrap();
        assert_eq!(result, "recovered");
        assert!(!warnings.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_provider_skips_straight_to_fallback() {
        let primary = ModelBinding::new("m1", Arc::new(AlwaysUnconfigured));
        let fallback = ModelBinding::new("m2", Arc::new(AlwaysOk));
        let chain = TierChain::new(primary, vec![fallback]);
        let client = ChatClient::new(chain.clone(), chain.clone(), chain, quick_policy());

        let messages = message::oneshot("sys", "hi");
        let mut warnings = PendingWarnings::new();
        let result = client
            .complete(Tier::Default, &messages, &ChatParams::default(), &CancelSignal::new(), &mut warnings)
            .await
            .unwrap();
        assert_eq!(result, "fallback answer");
    }

    #[tokio::test]
    async fn cancelled_signal_short_circuits() {
        let binding = ModelBinding::new("m1", Arc::new(AlwaysOk));
        let chain = TierChain::new(binding, Vec::new());
        let client = ChatClient::new(chain.clone(), chain.clone(), chain, quick_policy());

        let cancel = CancelSignal::new();
        cancel.cancel();
        let messages = message::oneshot("sys", "hi");
        let mut warnings = PendingWarnings::new();
        let result = client
            .complete(Tier::Default, &messages, &ChatParams::default(), &cancel, &mut warnings)
            .await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }

    #[tokio::test]
    async fn exhausted_retries_on_all_models_returns_last_error() {
        let primary = ModelBinding::new("m1", Arc::new(AlwaysUnconfigured));
        let chain = TierChain::new(primary, Vec::new());
        let client = ChatClient::new(chain.clone(), chain.clone(), chain, quick_policy());

        let messages = message::oneshot("sys", "hi");
        let mut warnings = PendingWarnings::new();
        let result = client
            .complete(Tier::Default, &messages, &ChatParams::default(), &CancelSignal::new(), &mut warnings)
            .await;
        assert!(matches!(result, Err(LlmError::UnconfiguredProvider(_))));
    }

    #[tokio::test]
    async fn empty_completion_is_treated_as_failure_not_success() {
        let primary = ModelBinding::new("m1", Arc::new(AlwaysEmpty));
        let chain = TierChain::new(primary, Vec::new());
        let client = ChatClient::new(chain.clone(), chain.clone(), chain, quick_policy());

        let messages = message::oneshot("sys", "hi");
        let mut warnings = PendingWarnings::new();
        let result = client
            .complete(Tier::Default, &messages, &ChatParams::default(), &CancelSignal::new(), &mut warnings)
            .await;
        assert!(matches!(result, Err(LlmError::InvalidOutput(_))));
        assert!(!warnings.is_empty());
    }

    #[tokio::test]
    async fn empty_completion_from_primary_falls_through_to_fallback() {
        let primary = ModelBinding::new("m1", Arc::new(AlwaysEmpty));
        let fallback = ModelBinding::new("m2", Arc::new(AlwaysOk));
        let chain = TierChain::new(primary, vec![fallback]);
        let client = ChatClient::new(chain.clone(), chain.clone(), chain, quick_policy());

        let messages = message::oneshot("sys", "hi");
        let mut warnings = PendingWarnings::new();
        let result = client
            .complete(Tier::Default, &messages, &ChatParams::default(), &CancelSignal::new(), &mut warnings)
            .await
            .unwrap();
        assert_eq!(result, "fallback answer");
    }
}
