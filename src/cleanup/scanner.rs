//! Inventory scanner: enumerates candidate cleanup units.
//!
//! Enumeration failure is fatal to the run and surfaces as a [`ScanError`].
//! Missing size metadata is not: such units are kept with a zero size and
//! counted as degraded, since a unit the policy cannot weigh is still a
//! unit the policy may delete by age.

use std::collections::HashSet;

use thiserror::Error;

use crate::{
    cleanup::{CleanupUnit, UnitKind},
    client::{ClientError, HomeserverClient},
    config::CleanupConfig,
};

/// Scope filters and protection rules applied during a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanFilters {
    pub include_rooms: bool,
    pub include_media: bool,
    /// Exact ids that must never be deleted.
    pub protected_ids: HashSet<String>,
    /// Id prefixes that must never be deleted.
    pub protected_prefixes: Vec<String>,
}

impl ScanFilters {
    /// Derive filters from the cleanup configuration.
    pub fn from_config(config: &CleanupConfig) -> Self {
        Self {
            include_rooms: config.include_rooms,
            include_media: config.include_media,
            protected_ids: config.protection.ids.iter().cloned().collect(),
            protected_prefixes: config.protection.id_prefixes.clone(),
        }
    }

    fn is_protected(&self, id: &str) -> bool {
        self.protected_ids.contains(id)
            || self
                .protected_prefixes
                .iter()
                .any(|p| id.starts_with(p.as_str()))
    }
}

/// Inventory enumeration failed outright.
#[derive(Debug, Error)]
#[error("failed to enumerate {scope}: {source}")]
pub struct ScanError {
    /// Which enumeration failed ("rooms" or "media").
    pub scope: &'static str,
    #[source]
    pub source: ClientError,
}

/// Enumerate all candidate units matching the filters.
///
/// The `protected` flag on each unit is the OR of the caller-supplied
/// protection lists and the server-reported system flag.
pub async fn scan(
    client: &dyn HomeserverClient,
    filters: &ScanFilters,
) -> Result<Vec<CleanupUnit>, ScanError> {
    let mut units = Vec::new();
    let mut degraded = 0usize;

    if filters.include_rooms {
        let rooms = client.enumerate_rooms().await.map_err(|source| ScanError {
            scope: "rooms",
            source,
        })?;

        for room in rooms {
            let size_bytes = match room.size_bytes {
                Some(size) => size,
                None => {
                    degraded += 1;
                    tracing::debug!(room = %room.room_id, "Room has no size metadata");
                    0
                }
            };
            units.push(CleanupUnit {
                protected: room.is_system || filters.is_protected(&room.room_id),
                id: room.room_id,
                kind: UnitKind::Room,
                size_bytes,
                last_activity: room.last_activity,
            });
        }
    }

    if filters.include_media {
        let media = client.enumerate_media().await.map_err(|source| ScanError {
            scope: "media",
            source,
        })?;

        for entry in media {
            let size_bytes = match entry.size_bytes {
                Some(size) => size,
                None => {
                    degraded += 1;
                    tracing::debug!(media = %entry.mxc_uri, "Media has no size metadata");
                    0
                }
            };
            units.push(CleanupUnit {
                protected: filters.is_protected(&entry.mxc_uri),
                id: entry.mxc_uri,
                kind: UnitKind::Media,
                size_bytes,
                last_activity: entry.last_access,
            });
        }
    }

    if degraded > 0 {
        tracing::warn!(
            degraded,
            "Scan found units without size metadata, treated as zero-sized"
        );
    }

    tracing::debug!(total = units.len(), "Inventory scan complete");

    Ok(units)
}
