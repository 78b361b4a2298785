//! Homeserver client abstraction.
//!
//! The cleanup engine talks to the homeserver exclusively through the
//! [`HomeserverClient`] capability set, so the engine can be driven against
//! the real admin API or an in-memory recording fake. All operations return
//! a typed [`ClientError`]; the retry layer uses its classification to
//! decide which failures are worth another attempt.

pub mod http;
pub mod recording;

use std::time::Duration;

pub use http::HttpHomeserverClient;
pub use recording::RecordingClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A typed failure from a homeserver operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection-level failure (refused, reset, DNS, 5xx).
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded its configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The homeserver throttled the request.
    #[error("rate limited by homeserver")]
    RateLimited {
        /// Server-suggested wait before the next attempt, when provided.
        retry_after: Option<Duration>,
    },

    /// The target no longer exists. For deletions this means the unit is
    /// already gone.
    #[error("not found: {0}")]
    NotFound(String),

    /// The admin token lacks the rights for this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Anything the client could not classify.
    #[error("unexpected homeserver response: {0}")]
    Unknown(String),
}

impl ClientError {
    /// Whether the failure class is worth retrying.
    ///
    /// Not-found and permission-denied are definitive answers; unclassified
    /// failures are not retried either, since repeating a destructive call
    /// on an unknown failure risks repeating its side effects.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. }
        )
    }

    /// Server-suggested backoff, when the failure carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A room as reported by the homeserver admin API.
#[derive(Debug, Clone)]
pub struct RoomEntry {
    /// Opaque room id, e.g. `!abc:chat.example.com`.
    pub room_id: String,
    /// Display name, if the room has one.
    pub name: Option<String>,
    /// Approximate storage attributable to the room.
    pub size_bytes: Option<u64>,
    /// Timestamp of the most recent activity in the room.
    pub last_activity: Option<DateTime<Utc>>,
    /// Server-internal room (e.g. server notices) that must not be deleted.
    pub is_system: bool,
}

/// A media object as reported by the homeserver admin API.
#[derive(Debug, Clone)]
pub struct MediaEntry {
    /// Media id as an `mxc://server/id` URI.
    pub mxc_uri: String,
    /// Stored size of the media object.
    pub size_bytes: Option<u64>,
    /// Timestamp of the most recent access.
    pub last_access: Option<DateTime<Utc>>,
}

/// The homeserver operations the cleanup engine needs.
///
/// Event ids are opaque `room_id/event_id` composites; the homeserver
/// exposes no bulk event enumeration, so events only enter a run when the
/// caller assembles its own inventory.
#[async_trait]
pub trait HomeserverClient: Send + Sync {
    /// List all rooms visible to the admin API.
    async fn enumerate_rooms(&self) -> Result<Vec<RoomEntry>, ClientError>;

    /// List all media objects visible to the admin API.
    async fn enumerate_media(&self) -> Result<Vec<MediaEntry>, ClientError>;

    /// Delete a room and its history.
    async fn delete_room(&self, room_id: &str) -> Result<(), ClientError>;

    /// Delete a media object by its `mxc://` URI.
    async fn delete_media(&self, mxc_uri: &str) -> Result<(), ClientError>;

    /// Redact a single event, addressed as `room_id/event_id`.
    async fn redact_event(&self, event_ref: &str) -> Result<(), ClientError>;
}
