//! HTTP homeserver client speaking the admin API.
//!
//! Enumeration endpoints are paginated with opaque continuation tokens.
//! Deletion endpoints are plain `DELETE` calls. Every response status is
//! mapped onto the [`ClientError`] taxonomy so the retry layer never has
//! to look at HTTP details.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::{
    client::{ClientError, HomeserverClient, MediaEntry, RoomEntry},
    config::HomeserverConfig,
};

/// Client for the homeserver admin API.
pub struct HttpHomeserverClient {
    http: reqwest::Client,
    base_url: Url,
    admin_token: String,
    timeout: Duration,
    page_size: u32,
}

impl HttpHomeserverClient {
    /// Build a client from connection settings.
    pub fn new(config: &HomeserverConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::Unknown(format!("invalid base URL: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Unknown(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            admin_token: config.admin_token.clone(),
            timeout: config.timeout(),
            page_size: config.page_size,
        })
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Unknown("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and map any failure onto the error taxonomy.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        target: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let response = request
            .bearer_auth(&self.admin_token)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(error_for_status(status, target, &response))
    }

    fn map_transport_error(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else if error.is_connect() || error.is_request() {
            ClientError::Network(error.to_string())
        } else {
            ClientError::Unknown(error.to_string())
        }
    }
}

/// Map a non-success status onto a typed failure.
fn error_for_status(status: StatusCode, target: &str, response: &reqwest::Response) -> ClientError {
    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(target.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ClientError::PermissionDenied(target.to_string())
        }
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited {
            retry_after: response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        s if s.is_server_error() => {
            ClientError::Network(format!("homeserver returned {s} for {target}"))
        }
        s => ClientError::Unknown(format!("homeserver returned {s} for {target}")),
    }
}

/// Split an `mxc://server/id` URI into its server name and media id.
pub fn parse_mxc(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("mxc://")?;
    let (server, media_id) = rest.split_once('/')?;
    if server.is_empty() || media_id.is_empty() || media_id.contains('/') {
        return None;
    }
    Some((server, media_id))
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[derive(Debug, Deserialize)]
struct RoomsPage {
    #[serde(default)]
    rooms: Vec<WireRoom>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRoom {
    room_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    approx_size_bytes: Option<u64>,
    #[serde(default)]
    last_activity_ts: Option<i64>,
    #[serde(default)]
    is_system: bool,
}

impl From<WireRoom> for RoomEntry {
    fn from(wire: WireRoom) -> Self {
        Self {
            room_id: wire.room_id,
            name: wire.name,
            size_bytes: wire.approx_size_bytes,
            last_activity: wire.last_activity_ts.and_then(millis_to_datetime),
            is_system: wire.is_system,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MediaPage {
    #[serde(default)]
    media: Vec<WireMedia>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    mxc_uri: String,
    #[serde(default)]
    size_bytes: Option<u64>,
    #[serde(default)]
    last_access_ts: Option<i64>,
}

impl From<WireMedia> for MediaEntry {
    fn from(wire: WireMedia) -> Self {
        Self {
            mxc_uri: wire.mxc_uri,
            size_bytes: wire.size_bytes,
            last_access: wire.last_access_ts.and_then(millis_to_datetime),
        }
    }
}

#[async_trait::async_trait]
impl HomeserverClient for HttpHomeserverClient {
    async fn enumerate_rooms(&self) -> Result<Vec<RoomEntry>, ClientError> {
        let mut rooms = Vec::new();
        let mut from: Option<String> = None;

        loop {
            let url = self.endpoint(&["_admin", "v1", "rooms"])?;
            let mut request = self
                .http
                .get(url)
                .query(&[("limit", self.page_size.to_string())]);
            if let Some(token) = &from {
                request = request.query(&[("from", token.as_str())]);
            }

            let response = self.send(request, "rooms").await?;
            let page: RoomsPage = response
                .json()
                .await
                .map_err(|e| ClientError::Unknown(format!("malformed rooms response: {e}")))?;

            rooms.extend(page.rooms.into_iter().map(RoomEntry::from));

            match page.next_token {
                Some(token) if !token.is_empty() => from = Some(token),
                _ => break,
            }
        }

        Ok(rooms)
    }

    async fn enumerate_media(&self) -> Result<Vec<MediaEntry>, ClientError> {
        let mut media = Vec::new();
        let mut from: Option<String> = None;

        loop {
            let url = self.endpoint(&["_admin", "v1", "media"])?;
            let mut request = self
                .http
                .get(url)
                .query(&[("limit", self.page_size.to_string())]);
            if let Some(token) = &from {
                request = request.query(&[("from", token.as_str())]);
            }

            let response = self.send(request, "media").await?;
            let page: MediaPage = response
                .json()
                .await
                .map_err(|e| ClientError::Unknown(format!("malformed media response: {e}")))?;

            media.extend(page.media.into_iter().map(MediaEntry::from));

            match page.next_token {
                Some(token) if !token.is_empty() => from = Some(token),
                _ => break,
            }
        }

        Ok(media)
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&["_admin", "v1", "rooms", room_id])?;
        self.send(self.http.delete(url), room_id).await?;
        Ok(())
    }

    async fn delete_media(&self, mxc_uri: &str) -> Result<(), ClientError> {
        let (server, media_id) = parse_mxc(mxc_uri)
            .ok_or_else(|| ClientError::Unknown(format!("not an mxc URI: {mxc_uri}")))?;
        let url = self.endpoint(&["_admin", "v1", "media", server, media_id])?;
        self.send(self.http.delete(url), mxc_uri).await?;
        Ok(())
    }

    async fn redact_event(&self, event_ref: &str) -> Result<(), ClientError> {
        let (room_id, event_id) = event_ref.split_once('/').ok_or_else(|| {
            ClientError::Unknown(format!("event ref must be room_id/event_id: {event_ref}"))
        })?;
        let url = self.endpoint(&["_admin", "v1", "rooms", room_id, "events", event_id])?;
        self.send(self.http.delete(url), event_ref).await?;
        Ok(())
    }
}
