//! Memory decay and retrieval strength calculation.
//!
//! Relevance decays exponentially from the most recent of update and access,
//! with a logarithmic boost for memories that keep getting retrieved.
//! Archived memories are left alone; decay never pushes a memory down to the
//! archive score on its own.

use chrono::{DateTime, Utc};
use recall_models::Memory;

/// Default half-life in days for memory decay.
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 30.0;

/// Lowest relevance decay can produce. Sits above the archive score so only
/// pruning archives.
pub const DECAY_FLOOR: f64 = 0.15;

/// Maximum strength cap.
pub const MAX_STRENGTH: f64 = 1.0;

/// Changes smaller than this are not written back.
pub const DECAY_EPSILON: f64 = 1e-3;

/// Configuration for decay calculations.
#[derive(Debug, Clone)]
pub struct DecayConfig {
    /// Half-life in days for exponential decay.
    pub half_life_days: f64,
    /// Lower bound of decayed relevance.
    pub floor: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            floor: DECAY_FLOOR,
        }
    }
}

impl DecayConfig {
    pub fn new(half_life_days: f64) -> Self {
        Self {
            half_life_days: half_life_days.max(1.0),
            ..Default::default()
        }
    }
}

/// Calculate the retrieval strength of a memory at `now`.
pub fn calculate_strength(
    updated_at: DateTime<Utc>,
    last_accessed: Option<DateTime<Utc>>,
    access_count: i64,
    half_life_days: f64,
    now: DateTime<Utc>,
) -> f64 {
    let base_time = match last_accessed {
        Some(accessed) if accessed > updated_at => accessed,
        _ => updated_at,
    };

    let days_elapsed = (now.signed_duration_since(base_time).num_seconds() as f64 / 86400.0).max(0.0);
    let decay_factor = 0.5_f64.powf(days_elapsed / half_life_days.max(1.0));

    let access_boost = if access_count > 0 {
        (1.0 + access_count as f64).log2() * 0.1
    } else {
        0.0
    };

    (decay_factor + access_boost).clamp(0.0, MAX_STRENGTH)
}

/// New relevance for `memory`, or `None` when it should not change.
pub fn decayed_relevance(memory: &Memory, now: DateTime<Utc>, config: &DecayConfig) -> Option<f64> {
    if memory.is_archived() {
        return None;
    }

    let strength = calculate_strength(
        memory.updated_at,
        memory.last_accessed,
        memory.access_count,
        config.half_life_days,
        now,
    );
    let next = strength.max(config.floor);

    ((next - memory.relevance_score).abs() > DECAY_EPSILON).then_some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use recall_models::ARCHIVED_RELEVANCE;

    #[test]
    fn test_fresh_memory_has_high_strength() {
        let now = Utc::now();
        let strength = calculate_strength(now, None, 0, 30.0, now);
        assert!(strength > 0.95);
    }

    #[test]
    fn test_old_memory_decays() {
        let now = Utc::now();
        let strength = calculate_strength(now - Duration::days(30), None, 0, 30.0, now);
        assert!(strength > 0.45 && strength < 0.55);
    }

    #[test]
    fn test_access_boosts_strength() {
        let now = Utc::now();
        let thirty_days_ago = now - Duration::days(30);
        let no_access = calculate_strength(thirty_days_ago, None, 0, 30.0, now);
        let with_access = calculate_strength(thirty_days_ago, None, 10, 30.0, now);
        assert!(with_access > no_access);
    }

    #[test]
    fn test_recent_access_resets_decay() {
        let now = Utc::now();
        let thirty_days_ago = now - Duration::days(30);
        let stale = calculate_strength(thirty_days_ago, None, 0, 30.0, now);
        let recent = calculate_strength(thirty_days_ago, Some(now - Duration::days(1)), 0, 30.0, now);
        assert!(recent > stale);
    }

    #[test]
    fn test_strength_capped() {
        let now = Utc::now();
        assert!(calculate_strength(now, Some(now), 1000, 30.0, now) <= MAX_STRENGTH);
    }

    #[test]
    fn test_decayed_relevance_floors_above_archive() {
        let now = Utc::now();
        let mut memory = Memory::new("u1", "old fact");
        memory.updated_at = now - Duration::days(365);

        let next = decayed_relevance(&memory, now, &DecayConfig::default()).unwrap();
        assert_eq!(next, DECAY_FLOOR);
        assert!(next > ARCHIVED_RELEVANCE);
    }

    #[test]
    fn test_decayed_relevance_skips_archived_and_unchanged() {
        let now = Utc::now();
        let mut memory = Memory::new("u1", "fresh");
        memory.updated_at = now;
        assert!(decayed_relevance(&memory, now, &DecayConfig::default()).is_none());

        memory.updated_at = now - Duration::days(365);
        memory.relevance_score = ARCHIVED_RELEVANCE;
        assert!(decayed_relevance(&memory, now, &DecayConfig::default()).is_none());
    }
}
