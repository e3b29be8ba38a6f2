use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::SyncError;

/// Values seen at a subscribed path, current value first. An absent node is
/// reported as `Value::Null`.
pub type Snapshots = mpsc::UnboundedReceiver<Value>;

/// A JSON tree addressed by slash-separated paths, shared by every client.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, SyncError>;

    /// Replace the node at `path`. Writing `null` deletes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), SyncError>;

    /// Write each field under `path`, leaving siblings untouched.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), SyncError>;

    /// Add a child under a generated, time-ordered key and return the key.
    async fn push(&self, path: &str, value: Value) -> Result<String, SyncError>;

    async fn subscribe(&self, path: &str) -> Result<Snapshots, SyncError>;

    /// Register a write to perform when this client disconnects.
    async fn on_disconnect_set(&self, path: &str, value: Value) -> Result<(), SyncError>;

    /// Drop registered disconnect writes at or below `path`.
    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), SyncError>;

    /// Run the registered disconnect writes.
    async fn disconnect(&self) -> Result<(), SyncError>;
}

pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub(crate) fn join_path(base: &str, child: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), child.trim_start_matches('/'))
}

/// Whether `path` is `prefix` or lies below it.
pub(crate) fn is_under(path: &str, prefix: &str) -> bool {
    let (path, prefix) = (segments(path), segments(prefix));
    path.len() >= prefix.len() && path.iter().zip(&prefix).all(|(a, b)| a == b)
}

pub(crate) fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Millisecond timestamp in fixed-width hex followed by random characters,
/// so keys sort by creation time.
pub(crate) fn push_key() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{:012x}{}", millis, random_suffix(8))
}
