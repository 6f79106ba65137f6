//! Coordination store: pub/sub notifications and the shared recording
//! registry used by sibling supervisor instances.
//!
//! The store is multi-writer with no ordering guarantee across instances;
//! everything published here is fire-and-forget lifecycle signaling.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

/// Pub/sub channel names shared across all supervisor instances.
pub mod channels {
    /// Payload `{videoId}:0` on confirmed start, `{videoId}:1` on a
    /// members-only block.
    pub const START_STREAM: &str = "youtube.startstream";
    /// Payload `{videoId}`; periodic-restart signal.
    pub const RERECORD: &str = "youtube.rerecord";
    /// Payload `{videoId}`, one publish per file routed to member-only.
    pub const MEMBER_ONLY: &str = "youtube.memberonly";
    /// Payload `{videoId}`, one publish per file routed to unarchived.
    pub const UNARCHIVED: &str = "youtube.unarchived";
    /// Payload `{videoId}`, one publish per file routed to the archive.
    pub const END_STREAM: &str = "youtube.endstream";
    /// Payload = this instance's host name; asks the orchestrator to
    /// remove the finished container.
    pub const REMOVE_BY_ID: &str = "streamrec.removeById";
}

/// Set of video ids currently being recorded, across all instances.
pub const NOW_RECORDING_SET: &str = "youtube.nowRecord";

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("coordination store unreachable: {0}")]
    Unreachable(String),

    #[error("coordination command failed: {0}")]
    Command(String),
}

/// Lifecycle notifications and the shared "currently recording" registry.
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CoordinationError>;

    /// Add a video id to the shared recording registry.
    async fn add_recording(&self, video_id: &str) -> Result<(), CoordinationError>;

    /// Remove a video id from the shared recording registry.
    async fn remove_recording(&self, video_id: &str) -> Result<(), CoordinationError>;
}

/// Coordinator used when coordination is disabled; every operation succeeds
/// and does nothing.
#[derive(Debug, Default)]
pub struct NoopCoordinator;

#[async_trait]
impl Coordinator for NoopCoordinator {
    async fn publish(&self, _channel: &str, _payload: &str) -> Result<(), CoordinationError> {
        Ok(())
    }

    async fn add_recording(&self, _video_id: &str) -> Result<(), CoordinationError> {
        Ok(())
    }

    async fn remove_recording(&self, _video_id: &str) -> Result<(), CoordinationError> {
        Ok(())
    }
}

/// Redis-backed coordinator.
pub struct RedisCoordinator {
    conn: redis::aio::ConnectionManager,
}

impl RedisCoordinator {
    /// Connect to the store. An unreachable server is a setup error; the
    /// session must not start without coordination when it was asked for.
    pub async fn connect(url: &str) -> Result<Self, CoordinationError> {
        let client = redis::Client::open(url)
            .map_err(|e| CoordinationError::Unreachable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CoordinationError::Unreachable(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Coordinator for RedisCoordinator {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| CoordinationError::Command(e.to_string()))?;
        Ok(())
    }

    async fn add_recording(&self, video_id: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .sadd(NOW_RECORDING_SET, video_id)
            .await
            .map_err(|e| CoordinationError::Command(e.to_string()))?;
        Ok(())
    }

    async fn remove_recording(&self, video_id: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .srem(NOW_RECORDING_SET, video_id)
            .await
            .map_err(|e| CoordinationError::Command(e.to_string()))?;
        Ok(())
    }
}

/// In-memory coordinator that records everything it is told. Test double.
#[derive(Debug, Default)]
pub struct MemoryCoordinator {
    published: Mutex<Vec<(String, String)>>,
    recording: Mutex<HashSet<String>>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(channel, payload)` pairs published so far, in order.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    /// Payloads published on one channel, in order.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn is_recording(&self, video_id: &str) -> bool {
        self.recording.lock().unwrap().contains(video_id)
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CoordinationError> {
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }

    async fn add_recording(&self, video_id: &str) -> Result<(), CoordinationError> {
        self.recording.lock().unwrap().insert(video_id.to_string());
        Ok(())
    }

    async fn remove_recording(&self, video_id: &str) -> Result<(), CoordinationError> {
        self.recording.lock().unwrap().remove(video_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_coordinator_tracks_registry_and_publishes() {
        let coordinator = MemoryCoordinator::new();

        coordinator.add_recording("dQw4w9WgXcQ").await.unwrap();
        assert!(coordinator.is_recording("dQw4w9WgXcQ"));

        coordinator
            .publish(channels::START_STREAM, "dQw4w9WgXcQ:0")
            .await
            .unwrap();
        assert_eq!(
            coordinator.published_on(channels::START_STREAM),
            vec!["dQw4w9WgXcQ:0".to_string()]
        );

        coordinator.remove_recording("dQw4w9WgXcQ").await.unwrap();
        assert!(!coordinator.is_recording("dQw4w9WgXcQ"));
    }

    #[tokio::test]
    async fn noop_coordinator_accepts_everything() {
        let coordinator = NoopCoordinator;
        coordinator.publish(channels::RERECORD, "x").await.unwrap();
        coordinator.add_recording("x").await.unwrap();
        coordinator.remove_recording("x").await.unwrap();
    }
}
