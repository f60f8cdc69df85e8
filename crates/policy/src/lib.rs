//! Decision policies for the Luma companion service.
//!
//! A policy maps a [`Context`] snapshot to an [`Action`] and may learn from
//! later feedback. The service picks one policy at startup via the
//! [`PolicyRegistry`](registry::PolicyRegistry); the [`Gate`](gate::Gate)
//! runs in front of every policy and can short-circuit to silence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Epsilon-greedy contextual bandit.
pub mod bandit;
/// Agent-enabled / rule-only short-circuit evaluated before any policy.
pub mod gate;
/// Context and action data model.
pub mod model;
/// Ollama-backed remote model policy with precheck guards.
pub mod ollama;
/// Policy name resolution and the unavailable fallback.
pub mod registry;
/// Deterministic rule baseline.
pub mod rules;
/// Defensive string-signal parsing shared by gate and policies.
pub mod signals;
/// Bandit statistics persistence.
pub mod store;

mod error;

pub use error::{PolicyError, Result};
pub use model::{Action, ActionType, Context, Mode, RiskLevel};

/// Outcome of a policy decision: the action plus version labels that the
/// service echoes back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub action: Action,
    pub policy_version: String,
    pub model_version: String,
}

/// Anything that can map a [`Context`] to an [`Action`].
///
/// `decide` must never fail: every error path inside a policy degrades to a
/// valid (usually silent) action. The record hooks are optional; policies
/// that do not learn keep the default no-ops.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Stable policy version label, e.g. `bandit_v0`.
    fn name(&self) -> &'static str;

    async fn decide(&self, ctx: &Context) -> PolicyDecision;

    /// Observe the request/action pairing so later feedback can be attributed.
    fn record_decision(&self, _request_id: &str, _ctx: &Context, _action: &Action) {}

    /// Observe feedback for an earlier decision. Unknown ids are ignored.
    fn record_feedback(&self, _request_id: &str, _feedback: &str) {}
}
