//! # memnexus-scope
//!
//! Scope resolution (C10): turns an inbound event plus static configuration
//! into the [`ScopeFilter`] every Fact Store read and write is gated by.

use memnexus_core::ScopeFilter;

/// Static defaults an operator configures for this deployment.
#[derive(Debug, Clone, Default)]
pub struct ScopeDefaults {
    /// Default user id, if this deployment is single-tenant.
    pub user_id: Option<String>,
    /// Default agent id, if this deployment runs one named agent.
    pub agent_id: Option<String>,
}

/// Identity information carried by one inbound event (a user turn, a
/// scheduled job, a tool call).
#[derive(Debug, Clone, Default)]
pub struct ScopeEvent {
    /// Agent id detected from the event/session/context, if any.
    pub agent_id: Option<String>,
    /// User id detected from the event/session/context, if any.
    pub user_id: Option<String>,
    /// Session id the event belongs to, if any.
    pub session_id: Option<String>,
    /// Whether the caller is a specialist (non-orchestrator) agent.
    pub is_specialist: bool,
}

/// Resolves the effective scope filter for one event (spec §4.10
/// `resolveScopeFilter`): configured defaults, then the detected agent id,
/// then explicit event overrides, in that order. A specialist agent's filter
/// always pins `agentId`. `None` means no identity is detectable, in which
/// case the filter is undefined and the caller (an orchestrator) sees every
/// scope — callers pass this straight through as `GetOpts`/`SearchOpts`'s
/// `scope_filter: None`, which `memnexus-store` treats as unrestricted.
#[must_use]
pub fn resolve_scope_filter(event: &ScopeEvent, defaults: &ScopeDefaults) -> Option<ScopeFilter> {
    let user_id = event.user_id.clone().or_else(|| defaults.user_id.clone());
    let agent_id = event.agent_id.clone().or_else(|| defaults.agent_id.clone());
    let session_id = event.session_id.clone();

    if event.is_specialist && agent_id.is_none() {
        // A specialist with no resolvable agent id cannot be scoped safely;
        // this is a configuration error upstream, but resolution itself
        // stays total and simply returns no filter rather than panicking.
        return None;
    }

    if user_id.is_none() && agent_id.is_none() && session_id.is_none() {
        return None;
    }

    Some(ScopeFilter {
        user_id,
        agent_id,
        session_id,
    })
}
