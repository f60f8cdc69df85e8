//! Environment-driven service configuration.
//!
//! Everything is resolved once at startup with safe defaults; malformed
//! values log a warning and fall back, they never abort startup.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use luma_policy::gate::Gate;
use luma_policy::ollama::OllamaConfig;
use luma_policy::signals;

const DEFAULT_ADDR: &str = "127.0.0.1:8791";
const DEFAULT_OLLAMA_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Configured policy name (`LUMA_POLICY`); empty means the default.
    pub policy: String,
    pub gate: Gate,
    pub addr: SocketAddr,
    /// Base directory for stats and logs (`LUMA_DATA`, default `~/.luma`).
    pub data_dir: PathBuf,
    pub ollama: OllamaConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let ollama_defaults = OllamaConfig::default();
        Self {
            policy: env::var("LUMA_POLICY").unwrap_or_default(),
            gate: Gate {
                agent_enabled: env_bool("LUMA_AGENT_ENABLED", true),
                rule_only: env_bool("LUMA_RULE_ONLY", false),
            },
            addr: env_addr("LUMA_ADDR", DEFAULT_ADDR),
            data_dir: data_dir(),
            ollama: OllamaConfig {
                url: env::var("OLLAMA_URL").unwrap_or(ollama_defaults.url),
                model: env::var("OLLAMA_MODEL").unwrap_or(ollama_defaults.model),
                timeout: Duration::from_secs(env_u64(
                    "OLLAMA_TIMEOUT_SECS",
                    DEFAULT_OLLAMA_TIMEOUT_SECS,
                )),
            },
        }
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join("state").join("bandit_stats.json")
    }

    pub fn feedback_log_path(&self) -> PathBuf {
        self.data_dir.join("logs").join("ai_feedback.jsonl")
    }
}

fn data_dir() -> PathBuf {
    match env::var("LUMA_DATA") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => {
            let home = dirs::home_dir().unwrap_or_else(|| ".".into());
            home.join(".luma")
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => signals::parse_bool(&value).unwrap_or_else(|| {
            tracing::warn!("invalid value for {key}='{value}', falling back to {default}");
            default
        }),
        Err(_) => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(value) => value.parse::<u64>().unwrap_or_else(|_| {
            tracing::warn!("invalid value for {key}='{value}', falling back to {default}");
            default
        }),
        Err(_) => default,
    }
}

fn env_addr(key: &str, default: &str) -> SocketAddr {
    let fallback = || {
        default
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8791)))
    };
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!("invalid value for {key}='{value}', falling back to {default}");
            fallback()
        }),
        Err(_) => fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 8] = [
        "LUMA_POLICY",
        "LUMA_AGENT_ENABLED",
        "LUMA_RULE_ONLY",
        "LUMA_ADDR",
        "LUMA_DATA",
        "OLLAMA_URL",
        "OLLAMA_MODEL",
        "OLLAMA_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_when_env_is_empty() {
        clear_env();
        let cfg = ServiceConfig::from_env();
        assert!(cfg.policy.is_empty());
        assert!(cfg.gate.agent_enabled);
        assert!(!cfg.gate.rule_only);
        assert_eq!(cfg.addr.port(), 8791);
        assert_eq!(cfg.ollama.model, "llama3.1:8b");
        assert_eq!(cfg.ollama.timeout, Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn env_overrides_are_applied() {
        clear_env();
        env::set_var("LUMA_POLICY", "bandit");
        env::set_var("LUMA_AGENT_ENABLED", "off");
        env::set_var("LUMA_RULE_ONLY", "yes");
        env::set_var("LUMA_ADDR", "0.0.0.0:9000");
        env::set_var("LUMA_DATA", "/tmp/luma-test");
        env::set_var("OLLAMA_MODEL", "custom:3b");
        env::set_var("OLLAMA_TIMEOUT_SECS", "5");

        let cfg = ServiceConfig::from_env();
        assert_eq!(cfg.policy, "bandit");
        assert!(!cfg.gate.agent_enabled);
        assert!(cfg.gate.rule_only);
        assert_eq!(cfg.addr.port(), 9000);
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/luma-test"));
        assert_eq!(cfg.ollama.model, "custom:3b");
        assert_eq!(cfg.ollama.timeout, Duration::from_secs(5));
        assert_eq!(
            cfg.stats_path(),
            PathBuf::from("/tmp/luma-test/state/bandit_stats.json")
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn malformed_values_fall_back() {
        clear_env();
        env::set_var("LUMA_AGENT_ENABLED", "definitely");
        env::set_var("LUMA_ADDR", "not-an-addr");
        env::set_var("OLLAMA_TIMEOUT_SECS", "soon");

        let cfg = ServiceConfig::from_env();
        assert!(cfg.gate.agent_enabled);
        assert_eq!(cfg.addr.port(), 8791);
        assert_eq!(cfg.ollama.timeout, Duration::from_secs(60));
        clear_env();
    }
}
