//! Policy evaluator: classifies the inventory into an ordered deletion plan.
//!
//! Evaluation is pure. It never touches the network, never mutates its
//! inputs, and takes `now` as an argument, so identical inventory and
//! configuration always produce an identical plan. This is what makes a
//! dry-run trustworthy: the plan it reports is exactly the plan a real run
//! would execute against unchanged inventory.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    cleanup::{CleanupUnit, DeletionPlanItem, DeletionReason, PolicyMode},
    config::{CleanupConfig, PressurePolicyConfig, RetentionPolicyConfig},
};

/// Malformed policy configuration. Fatal, surfaced before any deletion.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("{field} must be a positive number of days")]
    InvalidMaxAge { field: &'static str },

    #[error("{field} must be within (0, 1], got {value}")]
    InvalidRatio { field: &'static str, value: f64 },

    #[error("pressure used_bytes ({used}) exceeds capacity_bytes ({capacity})")]
    UsedExceedsCapacity { used: u64, capacity: u64 },

    #[error("pressure mode requires target_free_bytes or a used/capacity pair")]
    MissingPressureTarget,
}

/// Compute the ordered deletion plan for the given mode.
pub fn evaluate(
    units: &[CleanupUnit],
    mode: PolicyMode,
    config: &CleanupConfig,
    now: DateTime<Utc>,
) -> Result<Vec<DeletionPlanItem>, EvaluationError> {
    match mode {
        PolicyMode::Retention => evaluate_retention(units, &config.retention, now),
        PolicyMode::Pressure => evaluate_pressure(units, &config.pressure),
    }
}

fn validate_retention(config: &RetentionPolicyConfig) -> Result<(), EvaluationError> {
    if config.max_age_days == 0 {
        return Err(EvaluationError::InvalidMaxAge {
            field: "retention.max_age_days",
        });
    }
    if config.room_max_age_days == Some(0) {
        return Err(EvaluationError::InvalidMaxAge {
            field: "retention.room_max_age_days",
        });
    }
    if config.media_max_age_days == Some(0) {
        return Err(EvaluationError::InvalidMaxAge {
            field: "retention.media_max_age_days",
        });
    }
    Ok(())
}

/// Retention: strictly older than the threshold, oldest first.
fn evaluate_retention(
    units: &[CleanupUnit],
    config: &RetentionPolicyConfig,
    now: DateTime<Utc>,
) -> Result<Vec<DeletionPlanItem>, EvaluationError> {
    validate_retention(config)?;

    let mut eligible: Vec<&CleanupUnit> = units
        .iter()
        .filter(|unit| {
            if unit.protected {
                return false;
            }
            // Unknown age is never eligible under retention.
            let Some(last) = unit.last_activity else {
                return false;
            };
            let threshold = Duration::days(i64::from(config.max_age_for(unit.kind)));
            now.signed_duration_since(last) > threshold
        })
        .collect();

    eligible.sort_by(|a, b| {
        a.last_activity
            .cmp(&b.last_activity)
            .then_with(|| a.id.cmp(&b.id))
    });

    Ok(eligible
        .into_iter()
        .map(|unit| {
            let age_days = unit
                .last_activity
                .map(|last| now.signed_duration_since(last).num_days())
                .unwrap_or_default();
            let threshold = config.max_age_for(unit.kind);
            DeletionPlanItem {
                unit: unit.clone(),
                reason: DeletionReason::RetentionExpired,
                justification: format!(
                    "inactive for {age_days} days (threshold {threshold} days)"
                ),
            }
        })
        .collect())
}

fn validate_pressure(config: &PressurePolicyConfig) -> Result<(), EvaluationError> {
    for (field, value) in [
        ("pressure.pressure_ratio", config.pressure_ratio),
        ("pressure.emergency_ratio", config.emergency_ratio),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            return Err(EvaluationError::InvalidRatio { field, value });
        }
    }
    if let Some((used, capacity)) = config.usage_pair()
        && used > capacity
    {
        return Err(EvaluationError::UsedExceedsCapacity { used, capacity });
    }
    if config.target_free_bytes.is_none() && config.usage_pair().is_none() {
        return Err(EvaluationError::MissingPressureTarget);
    }
    Ok(())
}

/// Bytes that still need to be reclaimed to satisfy the pressure target.
/// Zero means pressure relief is not needed.
fn pressure_deficit(config: &PressurePolicyConfig) -> u64 {
    if let Some(target) = config.target_free_bytes {
        return match config.free_bytes() {
            Some(free) => target.saturating_sub(free),
            None => target,
        };
    }

    // No explicit target: reclaim enough to bring usage down to the
    // pressure ratio. validate_pressure guarantees the pair is present.
    match config.usage_pair() {
        Some((used, capacity)) => {
            let allowed_used = (config.pressure_ratio * capacity as f64) as u64;
            used.saturating_sub(allowed_used)
        }
        None => 0,
    }
}

/// Value ranking for pressure mode: oldest first, unknown age last,
/// larger reclaim first among equally stale items, id as the final
/// determinism tie-break.
fn pressure_rank(a: &CleanupUnit, b: &CleanupUnit) -> Ordering {
    let by_age = match (a.last_activity, b.last_activity) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_age
        .then_with(|| b.size_bytes.cmp(&a.size_bytes))
        .then_with(|| a.id.cmp(&b.id))
}

/// Pressure: greedily select lowest-value units until the deficit is met.
fn evaluate_pressure(
    units: &[CleanupUnit],
    config: &PressurePolicyConfig,
) -> Result<Vec<DeletionPlanItem>, EvaluationError> {
    validate_pressure(config)?;

    let deficit = pressure_deficit(config);
    if deficit == 0 {
        tracing::info!(
            usage_ratio = config.usage_ratio(),
            "Free space already meets the pressure target, nothing to plan"
        );
        return Ok(Vec::new());
    }

    let mut candidates: Vec<&CleanupUnit> = units.iter().filter(|u| !u.protected).collect();
    candidates.sort_by(|a, b| pressure_rank(a, b));

    let mut plan = Vec::new();
    let mut reclaimed = 0u64;
    for unit in candidates {
        if reclaimed >= deficit {
            break;
        }
        reclaimed += unit.size_bytes;
        plan.push(DeletionPlanItem {
            unit: unit.clone(),
            reason: DeletionReason::PressureSelected,
            justification: format!(
                "rank {}, frees {} bytes (running total {} bytes)",
                plan.len() + 1,
                unit.size_bytes,
                reclaimed
            ),
        });
    }

    if reclaimed < deficit {
        tracing::warn!(
            deficit,
            planned_bytes = reclaimed,
            shortfall = deficit - reclaimed,
            "Pressure plan falls short of target, best-effort maximum planned"
        );
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;
    use crate::cleanup::UnitKind;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn unit(id: &str, size: u64, age_days: Option<i64>) -> CleanupUnit {
        CleanupUnit {
            id: id.to_string(),
            kind: UnitKind::Room,
            size_bytes: size,
            last_activity: age_days.map(|d| fixed_now() - Duration::days(d)),
            protected: false,
        }
    }

    fn protected(id: &str, size: u64, age_days: Option<i64>) -> CleanupUnit {
        CleanupUnit {
            protected: true,
            ..unit(id, size, age_days)
        }
    }

    fn retention_config(max_age_days: u32) -> CleanupConfig {
        CleanupConfig {
            retention: RetentionPolicyConfig {
                max_age_days,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pressure_config(target_free_bytes: u64) -> CleanupConfig {
        CleanupConfig {
            pressure: PressurePolicyConfig {
                target_free_bytes: Some(target_free_bytes),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn plan_ids(plan: &[DeletionPlanItem]) -> Vec<&str> {
        plan.iter().map(|item| item.unit.id.as_str()).collect()
    }

    #[rstest]
    #[case::exactly_at_threshold(30, false)]
    #[case::one_day_older(31, true)]
    #[case::well_within(5, false)]
    fn test_retention_boundary(#[case] age_days: i64, #[case] eligible: bool) {
        let units = vec![unit("!a:x", 10, Some(age_days))];
        let plan = evaluate(&units, PolicyMode::Retention, &retention_config(30), fixed_now())
            .unwrap();
        assert_eq!(!plan.is_empty(), eligible, "age {age_days} days");
    }

    #[test]
    fn test_retention_orders_oldest_first_with_id_tie_break() {
        let units = vec![
            unit("!b:x", 10, Some(40)),
            unit("!c:x", 10, Some(60)),
            unit("!a:x", 10, Some(40)),
        ];
        let plan = evaluate(&units, PolicyMode::Retention, &retention_config(30), fixed_now())
            .unwrap();
        assert_eq!(plan_ids(&plan), vec!["!c:x", "!a:x", "!b:x"]);
        assert!(plan.iter().all(|i| i.reason == DeletionReason::RetentionExpired));
        assert!(plan[0].justification.contains("60 days"));
    }

    #[test]
    fn test_retention_skips_protected_and_unknown_age() {
        let units = vec![
            protected("!sys:x", 10, Some(100)),
            unit("!unknown:x", 10, None),
            unit("!old:x", 10, Some(100)),
        ];
        let plan = evaluate(&units, PolicyMode::Retention, &retention_config(30), fixed_now())
            .unwrap();
        assert_eq!(plan_ids(&plan), vec!["!old:x"]);
    }

    #[test]
    fn test_retention_per_kind_override() {
        let mut media = unit("mxc://x/m1", 10, Some(45));
        media.kind = UnitKind::Media;
        let units = vec![media, unit("!room:x", 10, Some(45))];

        let mut config = retention_config(30);
        config.retention.media_max_age_days = Some(90);

        let plan = evaluate(&units, PolicyMode::Retention, &config, fixed_now()).unwrap();
        // The room is past its 30-day threshold; the media is within 90 days.
        assert_eq!(plan_ids(&plan), vec!["!room:x"]);
    }

    #[test]
    fn test_retention_rejects_zero_max_age() {
        let result = evaluate(&[], PolicyMode::Retention, &retention_config(0), fixed_now());
        assert!(matches!(
            result,
            Err(EvaluationError::InvalidMaxAge { .. })
        ));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let units = vec![
            unit("!a:x", 100, Some(50)),
            unit("!b:x", 50, Some(50)),
            unit("!c:x", 30, None),
        ];
        let config = pressure_config(120);
        let first = evaluate(&units, PolicyMode::Pressure, &config, fixed_now()).unwrap();
        let second = evaluate(&units, PolicyMode::Pressure, &config, fixed_now()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pressure_sufficiency_stops_at_target() {
        // Oldest first: !a (100 bytes) then !b (50 bytes) reach 150 >= 120
        // before !c is considered.
        let units = vec![
            unit("!c:x", 30, Some(10)),
            unit("!a:x", 100, Some(30)),
            unit("!b:x", 50, Some(20)),
        ];
        let plan =
            evaluate(&units, PolicyMode::Pressure, &pressure_config(120), fixed_now()).unwrap();
        assert_eq!(plan_ids(&plan), vec!["!a:x", "!b:x"]);
        assert!(plan[1].justification.contains("running total 150 bytes"));
    }

    #[test]
    fn test_pressure_size_breaks_age_ties() {
        let units = vec![
            unit("!small:x", 10, Some(30)),
            unit("!large:x", 100, Some(30)),
        ];
        let plan =
            evaluate(&units, PolicyMode::Pressure, &pressure_config(100), fixed_now()).unwrap();
        assert_eq!(plan_ids(&plan)[0], "!large:x");
    }

    #[test]
    fn test_pressure_unknown_age_ranked_last() {
        let units = vec![
            unit("!unknown:x", 500, None),
            unit("!old:x", 100, Some(30)),
        ];
        let plan =
            evaluate(&units, PolicyMode::Pressure, &pressure_config(600), fixed_now()).unwrap();
        assert_eq!(plan_ids(&plan), vec!["!old:x", "!unknown:x"]);
    }

    #[test]
    fn test_pressure_skips_protected() {
        let units = vec![
            protected("!sys:x", 1000, Some(90)),
            unit("!old:x", 100, Some(30)),
        ];
        let plan =
            evaluate(&units, PolicyMode::Pressure, &pressure_config(100), fixed_now()).unwrap();
        assert_eq!(plan_ids(&plan), vec!["!old:x"]);
    }

    #[test]
    fn test_pressure_noop_when_free_space_sufficient() {
        let units = vec![unit("!a:x", 100, Some(30))];
        let config = CleanupConfig {
            pressure: PressurePolicyConfig {
                target_free_bytes: Some(1_000),
                capacity_bytes: Some(10_000),
                used_bytes: Some(5_000),
                ..Default::default()
            },
            ..Default::default()
        };
        let plan = evaluate(&units, PolicyMode::Pressure, &config, fixed_now()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_pressure_deficit_accounts_for_current_free_space() {
        // free = 400, target = 1000 -> deficit 600.
        let units = vec![
            unit("!a:x", 500, Some(30)),
            unit("!b:x", 200, Some(20)),
            unit("!c:x", 200, Some(10)),
        ];
        let config = CleanupConfig {
            pressure: PressurePolicyConfig {
                target_free_bytes: Some(1_000),
                capacity_bytes: Some(10_000),
                used_bytes: Some(9_600),
                ..Default::default()
            },
            ..Default::default()
        };
        let plan = evaluate(&units, PolicyMode::Pressure, &config, fixed_now()).unwrap();
        assert_eq!(plan_ids(&plan), vec!["!a:x", "!b:x"]);
    }

    #[test]
    fn test_pressure_ratio_derived_target() {
        // used 9200 of 10000 at ratio 0.85 -> need to free 700.
        let units = vec![
            unit("!a:x", 600, Some(30)),
            unit("!b:x", 200, Some(20)),
            unit("!c:x", 200, Some(10)),
        ];
        let config = CleanupConfig {
            pressure: PressurePolicyConfig {
                capacity_bytes: Some(10_000),
                used_bytes: Some(9_200),
                ..Default::default()
            },
            ..Default::default()
        };
        let plan = evaluate(&units, PolicyMode::Pressure, &config, fixed_now()).unwrap();
        assert_eq!(plan_ids(&plan), vec!["!a:x", "!b:x"]);
    }

    #[test]
    fn test_pressure_best_effort_when_under_target() {
        let units = vec![unit("!a:x", 100, Some(30)), protected("!b:x", 500, Some(40))];
        let plan =
            evaluate(&units, PolicyMode::Pressure, &pressure_config(1_000), fixed_now()).unwrap();
        // Shortfall is not an error: everything eligible gets planned.
        assert_eq!(plan_ids(&plan), vec!["!a:x"]);
    }

    #[test]
    fn test_pressure_config_validation() {
        let bad_ratio = CleanupConfig {
            pressure: PressurePolicyConfig {
                target_free_bytes: Some(100),
                pressure_ratio: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            evaluate(&[], PolicyMode::Pressure, &bad_ratio, fixed_now()),
            Err(EvaluationError::InvalidRatio { .. })
        ));

        let inverted = CleanupConfig {
            pressure: PressurePolicyConfig {
                used_bytes: Some(200),
                capacity_bytes: Some(100),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            evaluate(&[], PolicyMode::Pressure, &inverted, fixed_now()),
            Err(EvaluationError::UsedExceedsCapacity { .. })
        ));

        let missing = CleanupConfig::default();
        assert!(matches!(
            evaluate(&[], PolicyMode::Pressure, &missing, fixed_now()),
            Err(EvaluationError::MissingPressureTarget)
        ));
    }

    #[test]
    fn test_evaluate_does_not_mutate_inputs() {
        let units = vec![unit("!b:x", 10, Some(40)), unit("!a:x", 10, Some(50))];
        let before = units.clone();
        evaluate(&units, PolicyMode::Retention, &retention_config(30), fixed_now()).unwrap();
        assert_eq!(units, before);
    }
}
