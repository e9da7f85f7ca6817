//! Second-stage ordering of fused search candidates.
//!
//! The final score blends normalized RRF relevance with recency (exponential
//! half-life from last access), personalization (owner match and preferred
//! categories), and stored confidence.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::Memory;
use crate::config::RerankConfig;

/// Who is asking, for the personalization signal.
#[derive(Debug, Clone, Default)]
pub struct RequesterProfile {
    pub agent_id: Option<String>,
    pub preferred_categories: Vec<String>,
}

impl RequesterProfile {
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            preferred_categories: Vec::new(),
        }
    }

    pub fn prefer(mut self, category: impl Into<String>) -> Self {
        self.preferred_categories.push(category.into());
        self
    }
}

/// Per-signal breakdown, kept on each result for inspection.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScoreBreakdown {
    pub relevance: f64,
    pub recency: f64,
    pub personalization: f64,
    pub confidence: f64,
}

pub fn recency_score(memory: &Memory, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
    let stamp = memory.last_accessed.as_deref().unwrap_or(&memory.created_at);
    let Ok(at) = DateTime::parse_from_rfc3339(stamp) else {
        return 0.0;
    };
    let age_hours = (now - at.with_timezone(&Utc)).num_seconds().max(0) as f64 / 3600.0;
    0.5f64.powf(age_hours / half_life_hours)
}

pub fn personalization_score(memory: &Memory, profile: &RequesterProfile) -> f64 {
    let mut score: f64 = 0.0;
    if profile.agent_id.as_deref() == Some(memory.agent_id.as_str()) {
        score += 1.0;
    }
    if let Some(category) = &memory.category {
        if profile.preferred_categories.iter().any(|c| c == category) {
            score += 0.5;
        }
    }
    score.min(1.0)
}

/// Reorder `(memory, fused_score)` candidates by blended score, descending.
///
/// The sort is stable so candidates with equal blended scores keep their
/// fused order.
pub fn rerank(
    candidates: Vec<(Memory, f64)>,
    profile: &RequesterProfile,
    config: &RerankConfig,
    now: DateTime<Utc>,
) -> Vec<(Memory, f64, ScoreBreakdown)> {
    let max_fused = candidates
        .iter()
        .map(|(_, s)| *s)
        .fold(0.0f64, f64::max);

    let mut scored: Vec<(Memory, f64, ScoreBreakdown)> = candidates
        .into_iter()
        .map(|(memory, fused)| {
            let breakdown = ScoreBreakdown {
                relevance: if max_fused > 0.0 { fused / max_fused } else { 0.0 },
                recency: recency_score(&memory, now, config.recency_half_life_hours),
                personalization: personalization_score(&memory, profile),
                confidence: memory.confidence,
            };
            let score = config.relevance_weight * breakdown.relevance
                + config.recency_weight * breakdown.recency
                + config.personalization_weight * breakdown.personalization
                + config.confidence_weight * breakdown.confidence;
            (memory, score, breakdown)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{MemoryKind, Visibility};

    fn memory(id: &str, agent: &str, category: Option<&str>, created: DateTime<Utc>) -> Memory {
        Memory {
            id: id.into(),
            kind: MemoryKind::Fact,
            content: format!("content {id}"),
            agent_id: agent.into(),
            visibility: Visibility::Shared,
            category: category.map(str::to_string),
            confidence: 1.0,
            access_count: 0,
            last_accessed: None,
            created_at: created.to_rfc3339(),
            updated_at: created.to_rfc3339(),
            superseded_by: None,
            metadata: None,
        }
    }

    fn relevance_only() -> RerankConfig {
        RerankConfig {
            relevance_weight: 1.0,
            recency_weight: 0.0,
            personalization_weight: 0.0,
            confidence_weight: 0.0,
            recency_half_life_hours: 24.0,
        }
    }

    #[test]
    fn recency_halves_each_half_life() {
        let now = Utc::now();
        let m = memory("a", "x", None, now - chrono::Duration::hours(24));
        let r = recency_score(&m, now, 24.0);
        assert!((r - 0.5).abs() < 1e-3);

        let fresh = memory("b", "x", None, now);
        assert!((recency_score(&fresh, now, 24.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn recency_prefers_last_access_over_creation() {
        let now = Utc::now();
        let mut m = memory("a", "x", None, now - chrono::Duration::days(30));
        m.last_accessed = Some(now.to_rfc3339());
        assert!(recency_score(&m, now, 24.0) > 0.99);
    }

    #[test]
    fn personalization_combines_owner_and_category() {
        let now = Utc::now();
        let profile = RequesterProfile::agent("trader").prefer("markets");
        assert_eq!(personalization_score(&memory("a", "trader", Some("markets"), now), &profile), 1.0);
        assert_eq!(personalization_score(&memory("b", "other", Some("markets"), now), &profile), 0.5);
        assert_eq!(personalization_score(&memory("c", "trader", None, now), &profile), 1.0);
        assert_eq!(personalization_score(&memory("d", "other", None, now), &RequesterProfile::default()), 0.0);
    }

    #[test]
    fn relevance_only_keeps_fused_order() {
        let now = Utc::now();
        let candidates = vec![
            (memory("first", "x", None, now - chrono::Duration::days(300)), 0.030),
            (memory("second", "x", None, now), 0.020),
            (memory("third", "x", None, now), 0.010),
        ];
        let out = rerank(candidates, &RequesterProfile::default(), &relevance_only(), now);
        let ids: Vec<&str> = out.iter().map(|(m, _, _)| m.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert!((out[0].2.relevance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn personalization_can_lift_a_weaker_match() {
        let now = Utc::now();
        let config = RerankConfig {
            relevance_weight: 0.5,
            recency_weight: 0.0,
            personalization_weight: 0.5,
            confidence_weight: 0.0,
            recency_half_life_hours: 24.0,
        };
        let candidates = vec![
            (memory("theirs", "other", None, now), 0.030),
            (memory("mine", "me", None, now), 0.025),
        ];
        let out = rerank(candidates, &RequesterProfile::agent("me"), &config, now);
        assert_eq!(out[0].0.id, "mine");
    }

    #[test]
    fn recency_can_lift_a_fresh_memory() {
        let now = Utc::now();
        let config = RerankConfig {
            relevance_weight: 0.3,
            recency_weight: 0.7,
            personalization_weight: 0.0,
            confidence_weight: 0.0,
            recency_half_life_hours: 24.0,
        };
        let candidates = vec![
            (memory("stale", "x", None, now - chrono::Duration::days(60)), 0.030),
            (memory("fresh", "x", None, now), 0.028),
        ];
        let out = rerank(candidates, &RequesterProfile::default(), &config, now);
        assert_eq!(out[0].0.id, "fresh");
    }
}
