//! Deterministic rule baseline.
//!
//! Fixed thresholds over parsed signals, checked in priority order. Useful
//! as a fallback when no model backend should run and as a comparison
//! baseline for the bandit.

use async_trait::async_trait;

use crate::model::{Action, ActionType, Context, Mode, RiskLevel};
use crate::signals;
use crate::{Policy, PolicyDecision};

const REST_AFTER_FOCUS_MINUTES: f64 = 50.0;
const BREAKDOWN_AFTER_STALL_MINUTES: f64 = 20.0;
const REFRAME_AFTER_SWITCHES: i64 = 12;
const ENCOURAGE_AFTER_FOCUS_MINUTES: f64 = 15.0;

#[derive(Debug, Default)]
pub struct RulePolicy;

impl RulePolicy {
    fn evaluate(ctx: &Context) -> (ActionType, String, String) {
        let focus_minutes = ctx.signal("focus_minutes").and_then(signals::parse_f64);
        let stalled_minutes = ctx
            .signal("no_progress_minutes")
            .and_then(signals::parse_f64);
        let switches = ctx
            .switch_count
            .map(i64::from)
            .or_else(|| ctx.signal("switch_count").and_then(signals::parse_i64));

        if ctx.mode == Mode::Silent {
            return (
                ActionType::DoNotDisturb,
                "rule:silent_mode".to_string(),
                "I'll stay quiet. Tap me if you need anything.".to_string(),
            );
        }
        if let Some(minutes) = focus_minutes.filter(|m| *m >= REST_AFTER_FOCUS_MINUTES) {
            return (
                ActionType::RestReminder,
                format!("rule:long_focus focus_minutes={minutes}"),
                format!("You've focused for {minutes} minutes. Want a short break?"),
            );
        }
        if let Some(minutes) = stalled_minutes.filter(|m| *m >= BREAKDOWN_AFTER_STALL_MINUTES) {
            return (
                ActionType::TaskBreakdown,
                format!("rule:no_progress no_progress_minutes={minutes}"),
                "If the task feels large, try breaking it into 2-3 small steps.".to_string(),
            );
        }
        if let Some(count) = switches.filter(|c| *c >= REFRAME_AFTER_SWITCHES) {
            return (
                ActionType::Reframe,
                format!("rule:frequent_switching switch_count={count}"),
                "Maybe try a different angle. Start with the easiest part?".to_string(),
            );
        }
        if ctx.mode == Mode::Active {
            if let Some(minutes) = focus_minutes.filter(|m| *m >= ENCOURAGE_AFTER_FOCUS_MINUTES) {
                return (
                    ActionType::Encourage,
                    format!("rule:steady_focus focus_minutes={minutes}"),
                    "Good progress. Keep this pace.".to_string(),
                );
            }
        }
        (
            ActionType::DoNotDisturb,
            "rule:no_signal".to_string(),
            "I'll stay quiet. Tap me if you need anything.".to_string(),
        )
    }
}

#[async_trait]
impl Policy for RulePolicy {
    fn name(&self) -> &'static str {
        "rules_v0"
    }

    async fn decide(&self, ctx: &Context) -> PolicyDecision {
        let (action_type, reason, message) = Self::evaluate(ctx);
        PolicyDecision {
            action: Action {
                action_type,
                message,
                confidence: 0.5,
                cost: action_type.cost(),
                risk_level: RiskLevel::Low,
                reason: Some(reason),
                state: Some(ctx.focus_state_label()),
            },
            policy_version: self.name().to_string(),
            model_version: "rules_local".to_string(),
        }
    }
}
