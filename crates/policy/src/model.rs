//! Context and action data model.
//!
//! [`Context`] is the immutable snapshot handed to every decision;
//! [`Action`] is the immutable output. Signal values are always strings and
//! are parsed defensively via [`crate::signals`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating mode controlling how proactive decisions may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Silent,
    Light,
    Active,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Silent => "SILENT",
            Mode::Light => "LIGHT",
            Mode::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    DoNotDisturb,
    Encourage,
    TaskBreakdown,
    RestReminder,
    Reframe,
}

impl ActionType {
    /// All action types, in a fixed order.
    pub const ALL: [ActionType; 5] = [
        ActionType::DoNotDisturb,
        ActionType::Encourage,
        ActionType::TaskBreakdown,
        ActionType::RestReminder,
        ActionType::Reframe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::DoNotDisturb => "DO_NOT_DISTURB",
            ActionType::Encourage => "ENCOURAGE",
            ActionType::TaskBreakdown => "TASK_BREAKDOWN",
            ActionType::RestReminder => "REST_REMINDER",
            ActionType::Reframe => "REFRAME",
        }
    }

    /// Fixed interruption cost per action type (higher = more intrusive).
    pub fn cost(&self) -> f64 {
        match self {
            ActionType::DoNotDisturb => 0.0,
            ActionType::Encourage => 1.5,
            ActionType::RestReminder => 2.0,
            ActionType::Reframe => 2.5,
            ActionType::TaskBreakdown => 3.0,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of the user's current activity and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub user_text: String,
    pub timestamp: i64,
    pub mode: Mode,
    #[serde(default)]
    pub signals: HashMap<String, String>,
    /// Inferred focus state label (FOCUSED, LIGHT, DISTRACTED, NO_PROGRESS, UNKNOWN).
    #[serde(default)]
    pub focus_state: Option<String>,
    #[serde(default)]
    pub switch_count: Option<u32>,
    #[serde(default)]
    pub history_summary: Option<String>,
    #[serde(default)]
    pub profile_summary: Option<String>,
    #[serde(default)]
    pub memory_summary: Option<String>,
}

impl Context {
    /// Looks up a raw string signal.
    pub fn signal(&self, key: &str) -> Option<&str> {
        self.signals.get(key).map(String::as_str)
    }

    /// Best-available focus state: the explicit field, else the
    /// `focus_state` signal, else `"UNKNOWN"`.
    pub fn focus_state_label(&self) -> String {
        self.focus_state
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.signal("focus_state"))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("UNKNOWN")
            .to_string()
    }
}

/// Immutable decision output describing what, if anything, to show the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub message: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Interruption cost in [0, 1] for model output, fixed table otherwise.
    pub cost: f64,
    pub risk_level: RiskLevel,
    /// Machine-readable reason citing the signals that drove the choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Echoed focus-state label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Action {
    /// Terminal silent action used by the gate, prechecks and fallbacks.
    pub fn silent(message: impl Into<String>, reason: impl Into<String>, state: String) -> Self {
        Self {
            action_type: ActionType::DoNotDisturb,
            message: message.into(),
            confidence: 1.0,
            cost: 0.0,
            risk_level: RiskLevel::Low,
            reason: Some(reason.into()),
            state: Some(state),
        }
    }
}
