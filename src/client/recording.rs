//! Recording homeserver client for tests.
//!
//! Serves a scripted inventory, fails scripted operations in order, and
//! records every delete call so tests can assert on exactly what the
//! executor did. Deliberately not `#[cfg(test)]`: downstream users drive
//! the engine against it the same way the in-crate tests do.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;

use crate::client::{ClientError, HomeserverClient, MediaEntry, RoomEntry};

/// In-memory [`HomeserverClient`] with scripted inventory and failures.
#[derive(Default)]
pub struct RecordingClient {
    rooms: Vec<RoomEntry>,
    media: Vec<MediaEntry>,
    enumerate_rooms_failure: Mutex<Option<ClientError>>,
    enumerate_media_failure: Mutex<Option<ClientError>>,
    scripted_failures: Mutex<HashMap<String, VecDeque<ClientError>>>,
    deleted: Mutex<Vec<String>>,
    attempts: Mutex<HashMap<String, u32>>,
    delete_delay: Option<Duration>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve these rooms from `enumerate_rooms`.
    pub fn with_rooms(mut self, rooms: Vec<RoomEntry>) -> Self {
        self.rooms = rooms;
        self
    }

    /// Serve these media entries from `enumerate_media`.
    pub fn with_media(mut self, media: Vec<MediaEntry>) -> Self {
        self.media = media;
        self
    }

    /// Sleep this long inside every delete call, to let tests exercise
    /// concurrency and cancellation windows.
    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    /// Make the next `enumerate_rooms` call fail once.
    pub fn fail_enumerate_rooms(self, error: ClientError) -> Self {
        *self
            .enumerate_rooms_failure
            .lock()
            .expect("recording client lock poisoned") = Some(error);
        self
    }

    /// Make the next `enumerate_media` call fail once.
    pub fn fail_enumerate_media(self, error: ClientError) -> Self {
        *self
            .enumerate_media_failure
            .lock()
            .expect("recording client lock poisoned") = Some(error);
        self
    }

    /// Queue failures for delete calls against `id`, consumed in order.
    /// Once the queue is drained, further calls succeed.
    pub fn fail_deletes(self, id: &str, errors: impl IntoIterator<Item = ClientError>) -> Self {
        self.scripted_failures
            .lock()
            .expect("recording client lock poisoned")
            .entry(id.to_string())
            .or_default()
            .extend(errors);
        self
    }

    /// Ids successfully deleted, in completion order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted
            .lock()
            .expect("recording client lock poisoned")
            .clone()
    }

    /// Number of delete attempts made against `id`, including failures.
    pub fn attempts(&self, id: &str) -> u32 {
        self.attempts
            .lock()
            .expect("recording client lock poisoned")
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    async fn record_delete(&self, id: &str) -> Result<(), ClientError> {
        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }

        *self
            .attempts
            .lock()
            .expect("recording client lock poisoned")
            .entry(id.to_string())
            .or_insert(0) += 1;

        if let Some(error) = self
            .scripted_failures
            .lock()
            .expect("recording client lock poisoned")
            .get_mut(id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        self.deleted
            .lock()
            .expect("recording client lock poisoned")
            .push(id.to_string());
        Ok(())
    }
}

#[async_trait]
impl HomeserverClient for RecordingClient {
    async fn enumerate_rooms(&self) -> Result<Vec<RoomEntry>, ClientError> {
        if let Some(error) = self
            .enumerate_rooms_failure
            .lock()
            .expect("recording client lock poisoned")
            .take()
        {
            return Err(error);
        }
        Ok(self.rooms.clone())
    }

    async fn enumerate_media(&self) -> Result<Vec<MediaEntry>, ClientError> {
        if let Some(error) = self
            .enumerate_media_failure
            .lock()
            .expect("recording client lock poisoned")
            .take()
        {
            return Err(error);
        }
        Ok(self.media.clone())
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), ClientError> {
        self.record_delete(room_id).await
    }

    async fn delete_media(&self, mxc_uri: &str) -> Result<(), ClientError> {
        self.record_delete(mxc_uri).await
    }

    async fn redact_event(&self, event_ref: &str) -> Result<(), ClientError> {
        self.record_delete(event_ref).await
    }
}
