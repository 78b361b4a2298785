//! Cleanup policy configuration.
//!
//! Controls which units are scanned, which are protected from deletion,
//! and the parameters of the retention and pressure policies.
//!
//! # Example
//!
//! ```toml
//! [cleanup]
//! dry_run = true
//!
//! [cleanup.retention]
//! max_age_days = 30
//! media_max_age_days = 90
//!
//! [cleanup.pressure]
//! capacity_bytes = 500_000_000_000
//! used_bytes = 440_000_000_000
//!
//! [cleanup.protection]
//! ids = ["!ops:chat.example.com"]
//! id_prefixes = ["!system-"]
//! ```

use serde::{Deserialize, Serialize};

use crate::cleanup::UnitKind;

/// Cleanup behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupConfig {
    /// If true, compute and report the full deletion plan without
    /// performing any deletion.
    #[serde(default)]
    pub dry_run: bool,

    /// Scan rooms for deletion candidates.
    #[serde(default = "default_true")]
    pub include_rooms: bool,

    /// Scan media for deletion candidates.
    #[serde(default = "default_true")]
    pub include_media: bool,

    /// Retention policy parameters.
    #[serde(default)]
    pub retention: RetentionPolicyConfig,

    /// Pressure policy parameters.
    #[serde(default)]
    pub pressure: PressurePolicyConfig,

    /// Units that must never be deleted, regardless of policy.
    #[serde(default)]
    pub protection: ProtectionConfig,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            include_rooms: true,
            include_media: true,
            retention: RetentionPolicyConfig::default(),
            pressure: PressurePolicyConfig::default(),
            protection: ProtectionConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Retention policy: delete content strictly older than an age threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionPolicyConfig {
    /// Age threshold in days. A unit is eligible only when its last
    /// activity is strictly older than this.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Per-kind override for rooms. Falls back to `max_age_days`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_max_age_days: Option<u32>,

    /// Per-kind override for media. Media is typically kept longer than
    /// room history. Falls back to `max_age_days`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_max_age_days: Option<u32>,
}

impl Default for RetentionPolicyConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            room_max_age_days: None,
            media_max_age_days: None,
        }
    }
}

fn default_max_age_days() -> u32 {
    30
}

impl RetentionPolicyConfig {
    /// Effective age threshold for a unit kind.
    pub fn max_age_for(&self, kind: UnitKind) -> u32 {
        match kind {
            UnitKind::Room => self.room_max_age_days.unwrap_or(self.max_age_days),
            UnitKind::Media => self.media_max_age_days.unwrap_or(self.max_age_days),
            UnitKind::Event => self.max_age_days,
        }
    }
}

/// Pressure policy: reclaim a target amount of storage, least-valuable
/// content first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressurePolicyConfig {
    /// Explicit amount of free space to reach, in bytes. When omitted,
    /// the target is derived from `pressure_ratio` and the usage pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_free_bytes: Option<u64>,

    /// Total capacity of the storage volume, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_bytes: Option<u64>,

    /// Currently used bytes on the storage volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_bytes: Option<u64>,

    /// Usage ratio above which pressure relief kicks in.
    #[serde(default = "default_pressure_ratio")]
    pub pressure_ratio: f64,

    /// Usage ratio considered an emergency. Exposed so schedulers can run
    /// more aggressive pressure passes; the evaluator itself only needs
    /// `pressure_ratio`.
    #[serde(default = "default_emergency_ratio")]
    pub emergency_ratio: f64,
}

impl Default for PressurePolicyConfig {
    fn default() -> Self {
        Self {
            target_free_bytes: None,
            capacity_bytes: None,
            used_bytes: None,
            pressure_ratio: default_pressure_ratio(),
            emergency_ratio: default_emergency_ratio(),
        }
    }
}

fn default_pressure_ratio() -> f64 {
    0.85
}

fn default_emergency_ratio() -> f64 {
    0.92
}

impl PressurePolicyConfig {
    /// The used/capacity pair, when both sides are configured.
    pub fn usage_pair(&self) -> Option<(u64, u64)> {
        match (self.used_bytes, self.capacity_bytes) {
            (Some(used), Some(capacity)) => Some((used, capacity)),
            _ => None,
        }
    }

    /// Fraction of capacity currently in use, when the pair is known.
    pub fn usage_ratio(&self) -> Option<f64> {
        self.usage_pair()
            .filter(|(_, capacity)| *capacity > 0)
            .map(|(used, capacity)| used as f64 / capacity as f64)
    }

    /// Currently free bytes, when the pair is known.
    pub fn free_bytes(&self) -> Option<u64> {
        self.usage_pair()
            .map(|(used, capacity)| capacity.saturating_sub(used))
    }
}

/// Units that are never eligible for deletion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtectionConfig {
    /// Exact unit ids (room ids, `mxc://` URIs) to protect.
    #[serde(default)]
    pub ids: Vec<String>,

    /// Id prefixes to protect, e.g. a server-internal room namespace.
    #[serde(default)]
    pub id_prefixes: Vec<String>,
}

impl ProtectionConfig {
    /// Check whether an id is covered by the protection list.
    pub fn covers(&self, id: &str) -> bool {
        self.ids.iter().any(|p| p == id)
            || self.id_prefixes.iter().any(|p| id.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CleanupConfig::default();
        assert!(!config.dry_run);
        assert!(config.include_rooms);
        assert!(config.include_media);
        assert_eq!(config.retention.max_age_days, 30);
        assert_eq!(config.pressure.pressure_ratio, 0.85);
        assert_eq!(config.pressure.emergency_ratio, 0.92);
        assert!(config.protection.ids.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            dry_run = true
            include_media = false

            [retention]
            max_age_days = 14
            media_max_age_days = 90

            [pressure]
            target_free_bytes = 1000000
            capacity_bytes = 10000000
            used_bytes = 9500000

            [protection]
            ids = ["!ops:chat.example.com"]
            id_prefixes = ["!system-"]
        "#;
        let config: CleanupConfig = toml::from_str(toml_str).unwrap();
        assert!(config.dry_run);
        assert!(!config.include_media);
        assert_eq!(config.retention.max_age_days, 14);
        assert_eq!(config.retention.max_age_for(UnitKind::Media), 90);
        assert_eq!(config.retention.max_age_for(UnitKind::Room), 14);
        assert_eq!(config.pressure.target_free_bytes, Some(1_000_000));
        assert_eq!(config.pressure.free_bytes(), Some(500_000));
        assert!(config.protection.covers("!ops:chat.example.com"));
        assert!(config.protection.covers("!system-presence:chat.example.com"));
        assert!(!config.protection.covers("!general:chat.example.com"));
    }

    #[test]
    fn test_usage_ratio() {
        let config: PressurePolicyConfig = toml::from_str(
            r#"
            capacity_bytes = 1000
            used_bytes = 850
        "#,
        )
        .unwrap();
        assert_eq!(config.usage_ratio(), Some(0.85));

        let missing = PressurePolicyConfig::default();
        assert_eq!(missing.usage_ratio(), None);
        assert_eq!(missing.free_bytes(), None);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<CleanupConfig, _> = toml::from_str("max_age = 3");
        assert!(result.is_err());
    }
}
