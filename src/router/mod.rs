//! Model Router (spec §4.2) — scores a fleet of configured models against a
//! request profile and picks one, with failover on repeated errors.
//!
//! No direct teacher precedent; built from the spec's literal scoring rules.
//! The bounded audit ring and per-model failure/cooldown tracking follow the
//! teacher's `config/types/provider.rs` `FailoverConfig` shape.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::{FailoverConfig, ModelDescriptorConfig};

const DISQUALIFY: i64 = -1000;

/// Coarse request priority, affecting nothing in the scoring itself today
/// but carried through the audit trail per spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Interactive,
    Background,
}

/// Profile of one routing decision request.
#[derive(Debug, Clone)]
pub struct RouterRequest {
    pub last_user_utterance: String,
    pub estimated_context_tokens: u32,
    pub needs_tools: bool,
    pub priority: Priority,
    pub hints: HashMap<String, String>,
}

impl RouterRequest {
    pub fn new(utterance: impl Into<String>) -> Self {
        RouterRequest {
            last_user_utterance: utterance.into(),
            estimated_context_tokens: 0,
            needs_tools: false,
            priority: Priority::Interactive,
            hints: HashMap::new(),
        }
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }
}

/// Utterance complexity classification driving the speed/quality tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Classify an utterance by keyword pattern (spec §4.2).
pub fn classify_complexity(utterance: &str) -> Complexity {
    let lower = utterance.to_lowercase();

    const SIMPLE_VERBS: &[&str] = &[
        "turn on", "turn off", "lock", "unlock", "set", "search", "read", "list", "fetch", "find",
        "check",
    ];
    const COMPLEX_VERBS: &[&str] = &[
        "explain", "analyze", "compare", "recommend", "why", "history",
    ];

    if COMPLEX_VERBS.iter().any(|v| lower.contains(v)) {
        return Complexity::Complex;
    }
    if SIMPLE_VERBS.iter().any(|v| lower.contains(v)) {
        return Complexity::Simple;
    }
    if lower.contains('?') || lower.starts_with("what") || lower.starts_with("is ") {
        return Complexity::Moderate;
    }
    Complexity::Moderate
}

/// One recorded routing decision, appended to the bounded audit ring.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub request_id: String,
    pub chosen_model: String,
    pub candidate_score_map: HashMap<String, i64>,
    pub rules_matched: HashMap<String, Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct FailureState {
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
}

/// Routing/failover statistics snapshot for introspection endpoints.
#[derive(Debug, Clone)]
pub struct RouterStats {
    pub configured_models: usize,
    pub decisions_recorded: usize,
    pub models_on_cooldown: usize,
}

/// Scores and selects a model per Run, tracking per-model failover state.
pub struct ModelRouter {
    models: Vec<ModelDescriptorConfig>,
    local_first: bool,
    failover: FailoverConfig,
    audit_ring_size: usize,
    audit: Mutex<VecDeque<RoutingDecision>>,
    failures: Mutex<HashMap<String, FailureState>>,
}

impl ModelRouter {
    pub fn new(
        models: Vec<ModelDescriptorConfig>,
        local_first: bool,
        audit_ring_size: usize,
        failover: FailoverConfig,
    ) -> Self {
        ModelRouter {
            models,
            local_first,
            failover,
            audit_ring_size: audit_ring_size.max(1),
            audit: Mutex::new(VecDeque::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Highest configured quality, or 10 when no models are configured.
    pub fn max_quality(&self) -> u8 {
        self.models.iter().map(|m| m.quality).max().unwrap_or(10)
    }

    fn is_on_cooldown(&self, model: &str) -> bool {
        let failures = self.failures.lock().unwrap();
        failures
            .get(model)
            .and_then(|s| s.cooldown_until)
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    /// Record a call failure against a model; once `max_failures` consecutive
    /// failures accrue, the model is put on cooldown and excluded from
    /// selection until it elapses.
    pub fn record_failure(&self, model: &str) {
        if !self.failover.enabled {
            return;
        }
        let mut failures = self.failures.lock().unwrap();
        let state = failures.entry(model.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failover.max_failures {
            state.cooldown_until =
                Some(Instant::now() + Duration::from_secs(self.failover.cooldown_secs));
        }
    }

    /// Record a successful call, clearing any accrued failure streak.
    pub fn record_success(&self, model: &str) {
        let mut failures = self.failures.lock().unwrap();
        if let Some(state) = failures.get_mut(model) {
            state.consecutive_failures = 0;
            state.cooldown_until = None;
        }
    }

    /// Pick the next fallback model in the failover list that isn't on cooldown.
    pub fn next_fallback(&self, exclude: &str) -> Option<String> {
        self.failover
            .fallback_models
            .iter()
            .find(|m| m.as_str() != exclude && !self.is_on_cooldown(m))
            .cloned()
    }

    /// Route a request to a model, recording the decision in the audit ring.
    pub fn route(&self, request_id: &str, req: &RouterRequest) -> (String, RoutingDecision) {
        if self.models.is_empty() {
            let decision = RoutingDecision {
                request_id: request_id.to_string(),
                chosen_model: String::new(),
                candidate_score_map: HashMap::new(),
                rules_matched: HashMap::new(),
                timestamp: Utc::now(),
            };
            return (String::new(), decision);
        }

        let complexity = classify_complexity(&req.last_user_utterance);
        let quality_floor: Option<u8> = req
            .hints
            .get("quality_floor")
            .and_then(|v| v.parse().ok());
        let prefer_speed = req.hints.get("prefer_speed").map(|v| v == "true").unwrap_or(false);
        let local_only = req.hints.get("local_only").map(String::as_str);

        let mut scores = HashMap::new();
        let mut rules: HashMap<String, Vec<String>> = HashMap::new();

        for model in &self.models {
            let mut score: i64 = 0;
            let mut applied = Vec::new();

            match complexity {
                Complexity::Simple => {
                    score += model.speed as i64;
                    applied.push("complexity:simple".to_string());
                }
                Complexity::Complex => {
                    score += model.quality as i64;
                    applied.push("complexity:complex".to_string());
                }
                Complexity::Moderate => {
                    score += (model.speed as i64 + model.quality as i64) / 2;
                    applied.push("complexity:moderate".to_string());
                }
            }

            if req.needs_tools && !model.supports_tools {
                score += DISQUALIFY;
                applied.push("tool_support:disqualified".to_string());
            }

            if req.estimated_context_tokens > model.context_window {
                score += DISQUALIFY;
                applied.push("context_window:exceeded".to_string());
            }

            if let Some(floor) = quality_floor {
                if model.quality < floor {
                    score += DISQUALIFY;
                    applied.push("quality_floor:below".to_string());
                }
            }

            let local_suppressed = local_only == Some("false");
            if self.local_first && model.cost_tier == 0 && !local_suppressed {
                score += 5;
                applied.push("local_bias:bonus".to_string());
            }

            if local_only == Some("true") && model.cost_tier != 0 {
                score -= 200;
                applied.push("local_only:penalty".to_string());
            }

            if prefer_speed {
                score += model.speed as i64;
                applied.push("prefer_speed:bonus".to_string());
            }

            if self.is_on_cooldown(&model.name) {
                score += DISQUALIFY;
                applied.push("failover:on_cooldown".to_string());
            }

            scores.insert(model.name.clone(), score);
            rules.insert(model.name.clone(), applied);
        }

        let chosen = self
            .models
            .iter()
            .enumerate()
            .max_by_key(|(idx, m)| (scores[&m.name], std::cmp::Reverse(*idx)))
            .map(|(_, m)| m.name.clone())
            .unwrap_or_else(|| self.models[0].name.clone());

        let decision = RoutingDecision {
            request_id: request_id.to_string(),
            chosen_model: chosen.clone(),
            candidate_score_map: scores,
            rules_matched: rules,
            timestamp: Utc::now(),
        };

        self.push_audit(decision.clone());

        (chosen, decision)
    }

    fn push_audit(&self, decision: RoutingDecision) {
        let mut audit = self.audit.lock().unwrap();
        audit.push_back(decision);
        while audit.len() > self.audit_ring_size {
            audit.pop_front();
        }
    }

    pub fn get_audit_log(&self, limit: usize) -> Vec<RoutingDecision> {
        let audit = self.audit.lock().unwrap();
        audit.iter().rev().take(limit).cloned().collect()
    }

    pub fn explain(&self, request_id: &str) -> Option<RoutingDecision> {
        let audit = self.audit.lock().unwrap();
        audit.iter().find(|d| d.request_id == request_id).cloned()
    }

    pub fn get_stats(&self) -> RouterStats {
        let audit = self.audit.lock().unwrap();
        let failures = self.failures.lock().unwrap();
        RouterStats {
            configured_models: self.models.len(),
            decisions_recorded: audit.len(),
            models_on_cooldown: failures
                .values()
                .filter(|s| {
                    s.cooldown_until
                        .map(|until| Instant::now() < until)
                        .unwrap_or(false)
                })
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, speed: u8, quality: u8, cost_tier: u8, supports_tools: bool) -> ModelDescriptorConfig {
        ModelDescriptorConfig {
            name: name.to_string(),
            provider: "openrouter".to_string(),
            supports_tools,
            speed,
            quality,
            cost_tier,
            context_window: 128_000,
        }
    }

    #[test]
    fn test_quality_floor_beats_prefer_speed() {
        let local = model("local", 9, 5, 0, true);
        let cloud = model("cloud", 3, 8, 3, true);
        let router = ModelRouter::new(vec![local, cloud], false, 10, FailoverConfig::default());

        let req = RouterRequest::new("do something")
            .with_hint("quality_floor", "6")
            .with_hint("prefer_speed", "true");

        let (chosen, _) = router.route("r1", &req);
        assert_eq!(chosen, "cloud");
    }

    #[test]
    fn test_explicit_local_opt_out_suppresses_bonus() {
        let local = model("local", 5, 5, 0, true);
        let cloud = model("cloud", 5, 10, 3, true);
        let router = ModelRouter::new(vec![local, cloud], true, 10, FailoverConfig::default());

        let req = RouterRequest::new("analyze patterns")
            .with_hint("local_only", "false")
            .with_hint("quality_floor", "8");
        let (chosen, _) = router.route("r1", &req);
        assert_eq!(chosen, "cloud");

        let req2 = RouterRequest::new("analyze patterns");
        let (chosen2, _) = router.route("r2", &req2);
        assert_eq!(chosen2, "local");
    }

    #[test]
    fn test_cooldown_disqualifies_model() {
        let a = model("a", 5, 5, 0, true);
        let b = model("b", 4, 4, 0, true);
        let failover = FailoverConfig {
            enabled: true,
            fallback_models: vec![],
            cooldown_secs: 300,
            max_failures: 1,
        };
        let router = ModelRouter::new(vec![a, b], false, 10, failover);
        router.record_failure("a");

        let req = RouterRequest::new("turn on the lights");
        let (chosen, _) = router.route("r1", &req);
        assert_eq!(chosen, "b");
    }

    #[test]
    fn test_tool_support_disqualifies() {
        let no_tools = model("no_tools", 9, 9, 0, false);
        let with_tools = model("with_tools", 1, 1, 0, true);
        let router = ModelRouter::new(vec![no_tools, with_tools], false, 10, FailoverConfig::default());

        let mut req = RouterRequest::new("search for something");
        req.needs_tools = true;
        let (chosen, _) = router.route("r1", &req);
        assert_eq!(chosen, "with_tools");
    }

    #[test]
    fn test_audit_log_bounded() {
        let a = model("a", 5, 5, 0, true);
        let router = ModelRouter::new(vec![a], false, 2, FailoverConfig::default());
        for i in 0..5 {
            router.route(&format!("r{}", i), &RouterRequest::new("hi"));
        }
        assert_eq!(router.get_audit_log(10).len(), 2);
    }
}
