//! Policy name resolution.
//!
//! An immutable name-to-instance table built once at startup. Unknown names
//! resolve to the unavailable fallback, an empty name to the documented
//! default; configuration absence must never crash the service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bandit::BanditPolicy;
use crate::model::{Action, Context};
use crate::ollama::{OllamaConfig, OllamaPolicy};
use crate::rules::RulePolicy;
use crate::store::StatsStore;
use crate::{Policy, PolicyDecision};

/// Fallback policy for unknown configuration: always silent, clearly labeled.
#[derive(Debug, Default)]
pub struct UnavailablePolicy;

#[async_trait]
impl Policy for UnavailablePolicy {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn decide(&self, ctx: &Context) -> PolicyDecision {
        PolicyDecision {
            action: Action::silent(
                "no policy backend available",
                "unavailable",
                ctx.focus_state_label(),
            ),
            policy_version: self.name().to_string(),
            model_version: "n/a".to_string(),
        }
    }
}

pub struct PolicyRegistry {
    policies: HashMap<&'static str, Arc<dyn Policy>>,
    default_policy: Arc<dyn Policy>,
    unavailable: Arc<dyn Policy>,
}

impl PolicyRegistry {
    /// Builds the singleton table: `bandit`, `ollama` (default), `rules`.
    pub fn new(ollama_cfg: OllamaConfig, stats_store: Box<dyn StatsStore>) -> Self {
        let bandit: Arc<dyn Policy> = Arc::new(BanditPolicy::new(stats_store));
        let ollama: Arc<dyn Policy> = Arc::new(OllamaPolicy::new(ollama_cfg));
        let rules: Arc<dyn Policy> = Arc::new(RulePolicy);

        let mut policies: HashMap<&'static str, Arc<dyn Policy>> = HashMap::new();
        policies.insert("bandit", bandit);
        policies.insert("ollama", ollama.clone());
        policies.insert("rules", rules);

        Self {
            policies,
            default_policy: ollama,
            unavailable: Arc::new(UnavailablePolicy),
        }
    }

    /// Resolves a trimmed, case-insensitive policy name. Empty resolves to
    /// the default, unknown to the unavailable fallback.
    pub fn resolve(&self, name: &str) -> Arc<dyn Policy> {
        let key = name.trim().to_ascii_lowercase();
        if key.is_empty() {
            return self.default_policy.clone();
        }
        self.policies
            .get(key.as_str())
            .cloned()
            .unwrap_or_else(|| {
                tracing::warn!(policy = %key, "unknown policy name, using unavailable fallback");
                self.unavailable.clone()
            })
    }
}
