//! Agent-enabled / rule-only short-circuit evaluated before any policy.

use crate::model::{Action, Context};
use crate::signals;

/// Gate reason when the agent is switched off.
pub const REASON_AGENT_DISABLED: &str = "agent_disabled";
/// Gate reason when rule-only mode is forced.
pub const REASON_RULE_ONLY: &str = "rule_only";

/// Pre-policy gate resolved once from configuration, overridable per request
/// via the `agent_enabled` and `rule_only_mode`/`rule_only` signals.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    pub agent_enabled: bool,
    pub rule_only: bool,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            agent_enabled: true,
            rule_only: false,
        }
    }
}

impl Gate {
    /// Returns a terminal silent action when the agent is disabled or forced
    /// into rule-only mode, `None` to proceed to the selected policy.
    pub fn check(&self, ctx: &Context) -> Option<Action> {
        let agent_enabled = self.resolve(ctx, &["agent_enabled"], self.agent_enabled);
        let rule_only = self.resolve(ctx, &["rule_only_mode", "rule_only"], self.rule_only);

        if !agent_enabled {
            tracing::debug!(reason = REASON_AGENT_DISABLED, "gate short-circuit");
            return Some(Action::silent(
                "Agent is switched off.",
                REASON_AGENT_DISABLED,
                ctx.focus_state_label(),
            ));
        }
        if rule_only {
            tracing::debug!(reason = REASON_RULE_ONLY, "gate short-circuit");
            return Some(Action::silent(
                "Running in rule-only mode, staying quiet.",
                REASON_RULE_ONLY,
                ctx.focus_state_label(),
            ));
        }
        None
    }

    /// First recognized boolean among `keys` wins; malformed or absent
    /// signals leave the configured default unchanged.
    fn resolve(&self, ctx: &Context, keys: &[&str], default: bool) -> bool {
        keys.iter()
            .find_map(|key| ctx.signal(key).and_then(signals::parse_bool))
            .unwrap_or(default)
    }
}
