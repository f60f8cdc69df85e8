//! Epsilon-greedy contextual bandit.
//!
//! Rewards are bucketed by (mode, hour-of-day, focus-state). With
//! probability epsilon the bandit explores uniformly over all action types,
//! otherwise it exploits the best average reward in the bucket, breaking
//! ties uniformly. Feedback is attributed through a bounded pending map
//! keyed by request id.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::prelude::*;

use crate::model::{Action, ActionType, Context, Mode, RiskLevel};
use crate::store::{ArmStats, BanditStats, StatsStore};
use crate::{Policy, PolicyDecision};

const DEFAULT_EPSILON: f64 = 0.15;

/// Pending entries without matching feedback expire after this long.
const PENDING_TTL: Duration = Duration::from_secs(60 * 60);
/// Hard cap on tracked pending decisions; oldest entries are evicted first.
const PENDING_CAP: usize = 4096;

#[derive(Debug, Clone)]
struct PendingEntry {
    bucket: String,
    action: ActionType,
    recorded_at: Instant,
}

#[derive(Debug, Default)]
struct BanditState {
    stats: BanditStats,
    pending: HashMap<String, PendingEntry>,
}

/// Epsilon-greedy policy over bucketed reward statistics.
pub struct BanditPolicy {
    epsilon: f64,
    store: Box<dyn StatsStore>,
    state: Mutex<BanditState>,
}

impl BanditPolicy {
    /// Loads persisted statistics once; a missing or corrupt store starts empty.
    pub fn new(store: Box<dyn StatsStore>) -> Self {
        Self::with_epsilon(store, DEFAULT_EPSILON)
    }

    pub fn with_epsilon(store: Box<dyn StatsStore>, epsilon: f64) -> Self {
        let stats = store.load();
        Self {
            epsilon,
            store,
            state: Mutex::new(BanditState {
                stats,
                pending: HashMap::new(),
            }),
        }
    }

    /// Contexts sharing (mode, hour, focus state) share statistics.
    fn bucket_key(ctx: &Context) -> String {
        let hour = ctx.signal("hour_of_day").unwrap_or("");
        let focus = ctx.signal("focus_state").unwrap_or("UNKNOWN");
        format!("{}|{}|{}", ctx.mode, hour, focus)
    }

    fn select_action(
        &self,
        bucket_stats: Option<&HashMap<String, ArmStats>>,
        rng: &mut ThreadRng,
    ) -> (ActionType, bool) {
        if rng.gen::<f64>() < self.epsilon {
            let choice = ActionType::ALL
                .choose(rng)
                .copied()
                .unwrap_or(ActionType::DoNotDisturb);
            return (choice, true);
        }

        let mut best_score = f64::NEG_INFINITY;
        let mut best: Vec<ActionType> = Vec::new();
        for action in ActionType::ALL {
            let score = bucket_stats
                .and_then(|b| b.get(action.as_str()))
                .map(ArmStats::average)
                .unwrap_or(0.0);
            if score > best_score {
                best_score = score;
                best = vec![action];
            } else if score == best_score {
                best.push(action);
            }
        }
        let choice = best
            .choose(rng)
            .copied()
            .unwrap_or(ActionType::DoNotDisturb);
        (choice, false)
    }

    fn build_message(action: ActionType, ctx: &Context) -> String {
        let focus_minutes = ctx.signal("focus_minutes").unwrap_or("0");
        let app_name = ctx.signal("focus_app").unwrap_or("");
        match action {
            ActionType::RestReminder => {
                format!("You've focused for {focus_minutes} minutes. Want a short break?")
            }
            ActionType::TaskBreakdown => {
                "If the task feels large, try breaking it into 2-3 small steps.".to_string()
            }
            ActionType::Reframe => {
                "Maybe try a different angle. Start with the easiest part?".to_string()
            }
            ActionType::Encourage => {
                if app_name.is_empty() {
                    "Good progress. Keep this pace.".to_string()
                } else {
                    format!("Nice pace in {app_name}. Keep it up.")
                }
            }
            ActionType::DoNotDisturb => {
                "I'll stay quiet. Tap me if you need anything.".to_string()
            }
        }
    }

    fn build_reason(
        bucket: &str,
        bucket_stats: Option<&HashMap<String, ArmStats>>,
        action: ActionType,
        exploring: bool,
    ) -> String {
        let arm = bucket_stats
            .and_then(|b| b.get(action.as_str()))
            .copied()
            .unwrap_or_default();
        let mode = if exploring { "explore" } else { "exploit" };
        format!(
            "bandit:{mode} bucket={bucket} avg_reward={:.2} count={}",
            arm.average(),
            arm.count
        )
    }

    /// Maps feedback text to a reward via its upper-cased prefix before the
    /// first `:`. Unknown feedback yields 0 and is not recorded as a trial.
    fn feedback_reward(feedback: &str) -> f64 {
        let prefix = feedback
            .split_once(':')
            .map(|(head, _)| head)
            .unwrap_or(feedback)
            .trim()
            .to_ascii_uppercase();
        match prefix.as_str() {
            "LIKE" | "ADOPTED" | "OPEN_PANEL" => 1.0,
            "DISLIKE" | "IGNORED" | "CLOSED" => -1.0,
            _ => 0.0,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BanditState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exposes current statistics, mainly for tests and diagnostics.
    pub fn stats_snapshot(&self) -> BanditStats {
        self.lock().stats.clone()
    }
}

fn prune_pending(pending: &mut HashMap<String, PendingEntry>, now: Instant) {
    pending.retain(|_, entry| now.duration_since(entry.recorded_at) < PENDING_TTL);
    while pending.len() >= PENDING_CAP {
        let oldest = pending
            .iter()
            .min_by_key(|(_, entry)| entry.recorded_at)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                pending.remove(&id);
            }
            None => break,
        }
    }
}

#[async_trait]
impl Policy for BanditPolicy {
    fn name(&self) -> &'static str {
        "bandit_v0"
    }

    async fn decide(&self, ctx: &Context) -> PolicyDecision {
        let bucket = Self::bucket_key(ctx);
        let state = self.lock();
        let bucket_stats = state.stats.buckets.get(&bucket);

        let (chosen, exploring) = if ctx.mode == Mode::Silent {
            (ActionType::DoNotDisturb, false)
        } else {
            let mut rng = thread_rng();
            self.select_action(bucket_stats, &mut rng)
        };

        let reason = Self::build_reason(&bucket, bucket_stats, chosen, exploring);
        drop(state);

        let action = Action {
            action_type: chosen,
            message: Self::build_message(chosen, ctx),
            confidence: 0.6,
            cost: chosen.cost(),
            risk_level: RiskLevel::Low,
            reason: Some(reason),
            state: Some(ctx.focus_state_label()),
        };
        PolicyDecision {
            action,
            policy_version: self.name().to_string(),
            model_version: "bandit_local".to_string(),
        }
    }

    fn record_decision(&self, request_id: &str, ctx: &Context, action: &Action) {
        if request_id.is_empty() {
            return;
        }
        let mut state = self.lock();
        let now = Instant::now();
        prune_pending(&mut state.pending, now);
        state.pending.insert(
            request_id.to_string(),
            PendingEntry {
                bucket: Self::bucket_key(ctx),
                action: action.action_type,
                recorded_at: now,
            },
        );
    }

    fn record_feedback(&self, request_id: &str, feedback: &str) {
        if request_id.is_empty() {
            return;
        }
        let mut state = self.lock();
        let Some(entry) = state.pending.remove(request_id) else {
            return;
        };
        let reward = Self::feedback_reward(feedback);
        if reward == 0.0 {
            return;
        }

        let arm = state
            .stats
            .buckets
            .entry(entry.bucket)
            .or_default()
            .entry(entry.action.as_str().to_string())
            .or_default();
        arm.count += 1;
        arm.reward += reward;

        if let Err(err) = self.store.save(&state.stats) {
            tracing::warn!(error = %err, "failed to persist bandit stats");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[derive(Default)]
    struct MemStore {
        initial: BanditStats,
        saves: Mutex<Vec<BanditStats>>,
    }

    impl StatsStore for Arc<MemStore> {
        fn load(&self) -> BanditStats {
            self.initial.clone()
        }

        fn save(&self, stats: &BanditStats) -> crate::Result<()> {
            self.saves
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(stats.clone());
            Ok(())
        }
    }

    fn ctx(mode: Mode, signals: &[(&str, &str)]) -> Context {
        Context {
            user_text: String::new(),
            timestamp: 0,
            mode,
            signals: signals
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            focus_state: None,
            switch_count: None,
            history_summary: None,
            profile_summary: None,
            memory_summary: None,
        }
    }

    fn bandit_with(epsilon: f64) -> (BanditPolicy, Arc<MemStore>) {
        let store = Arc::new(MemStore::default());
        (
            BanditPolicy::with_epsilon(Box::new(store.clone()), epsilon),
            store,
        )
    }

    #[tokio::test]
    async fn silent_mode_always_do_not_disturb() {
        let (bandit, _) = bandit_with(1.0);
        for _ in 0..25 {
            let decision = bandit.decide(&ctx(Mode::Silent, &[])).await;
            assert_eq!(decision.action.action_type, ActionType::DoNotDisturb);
            assert!(decision
                .action
                .reason
                .as_deref()
                .unwrap()
                .starts_with("bandit:exploit"));
        }
    }

    #[tokio::test]
    async fn exploit_with_empty_stats_spreads_over_all_actions() {
        let (bandit, _) = bandit_with(0.0);
        let context = ctx(Mode::Active, &[("hour_of_day", "10")]);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let decision = bandit.decide(&context).await;
            seen.insert(decision.action.action_type);
        }
        assert_eq!(seen.len(), ActionType::ALL.len());
    }

    #[tokio::test]
    async fn exploit_prefers_highest_average_reward() {
        let mut initial = BanditStats::default();
        initial.buckets.entry("ACTIVE|10|FOCUSED".into()).or_default().insert(
            "ENCOURAGE".into(),
            ArmStats {
                count: 4,
                reward: 4.0,
            },
        );
        let store = Arc::new(MemStore {
            initial,
            saves: Mutex::new(Vec::new()),
        });
        let bandit = BanditPolicy::with_epsilon(Box::new(store), 0.0);
        let context = ctx(
            Mode::Active,
            &[("hour_of_day", "10"), ("focus_state", "FOCUSED")],
        );

        let decision = bandit.decide(&context).await;
        assert_eq!(decision.action.action_type, ActionType::Encourage);
        let reason = decision.action.reason.unwrap();
        assert!(reason.contains("bandit:exploit"));
        assert!(reason.contains("bucket=ACTIVE|10|FOCUSED"));
        assert!(reason.contains("avg_reward=1.00"));
        assert!(reason.contains("count=4"));
        assert_eq!(decision.policy_version, "bandit_v0");
        assert_eq!(decision.model_version, "bandit_local");
    }

    #[tokio::test]
    async fn like_feedback_updates_stats_and_persists() {
        let (bandit, store) = bandit_with(0.0);
        let context = ctx(Mode::Light, &[("hour_of_day", "9")]);
        let decision = bandit.decide(&context).await;
        bandit.record_decision("req-1", &context, &decision.action);
        bandit.record_feedback("req-1", "LIKE:panel");

        let stats = bandit.stats_snapshot();
        let arm = stats.buckets["LIGHT|9|UNKNOWN"][decision.action.action_type.as_str()];
        assert_eq!(arm.count, 1);
        assert_eq!(arm.reward, 1.0);
        assert_eq!(store.saves.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dislike_feedback_decrements_reward() {
        let (bandit, _) = bandit_with(0.0);
        let context = ctx(Mode::Light, &[]);
        let decision = bandit.decide(&context).await;
        bandit.record_decision("req-2", &context, &decision.action);
        bandit.record_feedback("req-2", "DISLIKE");

        let stats = bandit.stats_snapshot();
        let arm = stats.buckets["LIGHT||UNKNOWN"][decision.action.action_type.as_str()];
        assert_eq!(arm.count, 1);
        assert_eq!(arm.reward, -1.0);
    }

    #[tokio::test]
    async fn unknown_feedback_is_not_recorded_and_not_persisted() {
        let (bandit, store) = bandit_with(0.0);
        let context = ctx(Mode::Light, &[]);
        let decision = bandit.decide(&context).await;
        bandit.record_decision("req-3", &context, &decision.action);
        bandit.record_feedback("req-3", "NOOP");

        assert!(bandit.stats_snapshot().buckets.is_empty());
        assert!(store.saves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_feedback_for_same_request_is_a_noop() {
        let (bandit, store) = bandit_with(0.0);
        let context = ctx(Mode::Light, &[]);
        let decision = bandit.decide(&context).await;
        bandit.record_decision("req-4", &context, &decision.action);
        bandit.record_feedback("req-4", "ADOPTED");
        bandit.record_feedback("req-4", "ADOPTED");

        let stats = bandit.stats_snapshot();
        let arm = stats.buckets["LIGHT||UNKNOWN"][decision.action.action_type.as_str()];
        assert_eq!(arm.count, 1);
        assert_eq!(store.saves.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_request_id_is_never_tracked() {
        let (bandit, _) = bandit_with(0.0);
        let context = ctx(Mode::Light, &[]);
        let decision = bandit.decide(&context).await;
        bandit.record_decision("", &context, &decision.action);
        bandit.record_feedback("", "LIKE");
        assert!(bandit.stats_snapshot().buckets.is_empty());
    }

    #[test]
    fn reward_mapping_uses_prefix_before_colon() {
        assert_eq!(BanditPolicy::feedback_reward("LIKE:whatever"), 1.0);
        assert_eq!(BanditPolicy::feedback_reward("open_panel"), 1.0);
        assert_eq!(BanditPolicy::feedback_reward(" closed : late"), -1.0);
        assert_eq!(BanditPolicy::feedback_reward("SHRUG"), 0.0);
        assert_eq!(BanditPolicy::feedback_reward(""), 0.0);
    }

    #[test]
    fn pending_prune_drops_expired_and_respects_cap() {
        let now = Instant::now();
        let mut pending = HashMap::new();
        pending.insert(
            "old".to_string(),
            PendingEntry {
                bucket: "b".into(),
                action: ActionType::Encourage,
                recorded_at: now - PENDING_TTL - Duration::from_secs(1),
            },
        );
        for i in 0..PENDING_CAP {
            pending.insert(
                format!("req-{i}"),
                PendingEntry {
                    bucket: "b".into(),
                    action: ActionType::Encourage,
                    recorded_at: now,
                },
            );
        }
        prune_pending(&mut pending, now);
        assert!(!pending.contains_key("old"));
        assert!(pending.len() < PENDING_CAP + 1);
    }
}
