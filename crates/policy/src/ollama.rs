//! Ollama-backed remote model policy.
//!
//! Without explicit user input the policy first runs cheap cooldown/budget
//! prechecks so the backend is only called when an intervention is actually
//! on the table. Every backend failure degrades to a silent action with the
//! `ollama_error` marker; nothing raises past `decide`.

use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::model::{Action, ActionType, Context, RiskLevel};
use crate::signals;
use crate::{Policy, PolicyDecision};

const FALLBACK_MESSAGE: &str = "AI service temporarily unavailable";
const NO_SUGGESTION_MESSAGE: &str = "no suggestion available";

/// Connection parameters for the generate endpoint, resolved once at startup.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/api/generate".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Structured reply the model is instructed to produce. Missing fields fall
/// back to safe defaults during mapping.
#[derive(Debug, Default, Deserialize)]
struct ModelReply {
    action_type: Option<ActionType>,
    message: Option<String>,
    confidence: Option<f64>,
    cost: Option<f64>,
    risk_level: Option<RiskLevel>,
    reason: Option<String>,
    state: Option<String>,
}

pub struct OllamaPolicy {
    cfg: OllamaConfig,
    client: Client,
}

impl OllamaPolicy {
    pub fn new(cfg: OllamaConfig) -> Self {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to build http client, using default");
                Client::new()
            });
        Self { cfg, client }
    }

    /// Cooldown/budget guards, evaluated only when there is no explicit user
    /// input. Returns the terminal silent action when a guard trips.
    fn precheck(ctx: &Context) -> Option<Action> {
        if !ctx.user_text.trim().is_empty() {
            return None;
        }

        let tripped = if ctx
            .signal("cooldown_active")
            .and_then(signals::parse_bool)
            .unwrap_or(false)
        {
            Some("cooldown_active")
        } else if ctx
            .signal("budget_exhausted")
            .and_then(signals::parse_bool)
            .unwrap_or(false)
        {
            Some("budget_exhausted")
        } else if ctx
            .signal("cooldown_until_ms")
            .and_then(signals::parse_i64)
            .is_some_and(|until| until > chrono::Utc::now().timestamp_millis())
        {
            Some("cooldown_until")
        } else if ctx
            .signal("budget_remaining")
            .and_then(signals::parse_f64)
            .is_some_and(|remaining| remaining <= 0.0)
        {
            Some("budget_remaining")
        } else {
            None
        };

        tripped.map(|guard| {
            tracing::debug!(guard, "precheck short-circuit");
            Action::silent(
                "I'll stay quiet for now.",
                format!("precheck:{guard}"),
                ctx.focus_state_label(),
            )
        })
    }

    fn build_prompt(ctx: &Context) -> String {
        let app_name = ctx.signal("focus_app").unwrap_or("Unknown");
        let window_title = ctx.signal("focus_window_title").unwrap_or("");
        let focus_minutes = ctx.signal("focus_minutes").unwrap_or("0");
        let no_progress_minutes = ctx.signal("no_progress_minutes").unwrap_or("0");
        let hour_of_day = ctx.signal("hour_of_day").unwrap_or("");
        let switch_count = ctx
            .switch_count
            .map(|count| count.to_string())
            .or_else(|| ctx.signal("switch_count").map(str::to_string))
            .unwrap_or_else(|| "0".to_string());
        let focus_state = ctx.focus_state_label();

        let profile_section = ctx
            .profile_summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| format!("\nUser Profile (Preferences & Traits):\n{s}\n"))
            .unwrap_or_default();
        let memory_section = ctx
            .memory_summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| format!("\nRecent Memory Events:\n{s}\n"))
            .unwrap_or_default();

        format!(
            r#"You are Luma, an intelligent desktop companion.
Your goal is to help the user stay focused, healthy, and productive.
{profile_section}{memory_section}
Current Context:
- Mode: {mode} (SILENT: minimize disturbance, LIGHT: gentle reminders, ACTIVE: proactive)
- Focus State: {focus_state}
- App Switches: {switch_count}
- Minutes Without Progress: {no_progress_minutes}
- Focus Duration: {focus_minutes} minutes
- Current App: {app_name}
- Window Title: {window_title}
- Hour of Day: {hour_of_day}
- User Input: "{user_text}"

Task:
Decide on the best action based only on the signals listed above; do not infer beyond them.
Always prioritize the user's input text when it is present and meaningful.
Prefer DO_NOT_DISTURB when the signals are weak or ambiguous.
Use supportive, non-judgmental phrasing and keep interventions low-frequency.

Output Format (JSON only):
{{
  "action_type": "DO_NOT_DISTURB" | "ENCOURAGE" | "TASK_BREAKDOWN" | "REST_REMINDER" | "REFRAME",
  "message": "A short, friendly message to the user",
  "confidence": 0.0 to 1.0,
  "cost": 0.0 to 1.0 (interruption cost),
  "risk_level": "LOW" | "MEDIUM" | "HIGH",
  "reason": "machine-readable reason citing the signals used",
  "state": "echo of the focus state you based the decision on"
}}"#,
            mode = ctx.mode,
            user_text = ctx.user_text,
        )
    }

    async fn call_backend(&self, model: &str, prompt: &str) -> Result<ModelReply> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            format: "json",
        };
        let response = self
            .client
            .post(&self.cfg.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("POST {}", self.cfg.url))?;

        if !response.status().is_success() {
            return Err(anyhow!("backend status {}", response.status()));
        }

        let envelope: GenerateResponse = response
            .json()
            .await
            .context("parse backend json envelope")?;

        serde_json::from_str(&envelope.response).context("parse model json payload")
    }

    fn map_reply(reply: ModelReply, ctx: &Context) -> Action {
        let reason = reply
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| Self::synthesize_reason(ctx));
        let state = reply
            .state
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| ctx.focus_state_label());

        Action {
            action_type: reply.action_type.unwrap_or(ActionType::DoNotDisturb),
            message: reply
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| NO_SUGGESTION_MESSAGE.to_string()),
            confidence: reply.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            cost: reply.cost.unwrap_or(0.0),
            risk_level: reply.risk_level.unwrap_or(RiskLevel::Low),
            reason: Some(reason),
            state: Some(state),
        }
    }

    /// Concatenates the signal fragments the decision could have relied on.
    fn synthesize_reason(ctx: &Context) -> String {
        let mut fragments = Vec::new();
        if let Some(focus) = ctx.signal("focus_state") {
            fragments.push(format!("focus_state={focus}"));
        }
        if let Some(switches) = ctx.signal("switch_count") {
            fragments.push(format!("switch_count={switches}"));
        }
        if let Some(minutes) = ctx.signal("focus_minutes") {
            fragments.push(format!("focus_minutes={minutes}"));
        }
        if fragments.is_empty() {
            "model_no_reason".to_string()
        } else {
            fragments.join(" ")
        }
    }

    fn error_decision(&self, ctx: &Context) -> PolicyDecision {
        PolicyDecision {
            action: Action::silent(FALLBACK_MESSAGE, "ollama_error", ctx.focus_state_label()),
            policy_version: self.name().to_string(),
            model_version: "error".to_string(),
        }
    }
}

#[async_trait]
impl Policy for OllamaPolicy {
    fn name(&self) -> &'static str {
        "ollama_v0"
    }

    async fn decide(&self, ctx: &Context) -> PolicyDecision {
        if let Some(action) = Self::precheck(ctx) {
            return PolicyDecision {
                action,
                policy_version: self.name().to_string(),
                model_version: "n/a".to_string(),
            };
        }

        let model = ctx
            .signal("ollama_model")
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.cfg.model.as_str())
            .to_string();
        let prompt = Self::build_prompt(ctx);

        tracing::info!(model = %model, "calling ollama");
        match self.call_backend(&model, &prompt).await {
            Ok(reply) => PolicyDecision {
                action: Self::map_reply(reply, ctx),
                policy_version: self.name().to_string(),
                model_version: model,
            },
            Err(err) => {
                tracing::error!(error = %err, "ollama call failed");
                self.error_decision(ctx)
            }
        }
    }
}
