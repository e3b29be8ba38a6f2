//! Realtime store backed by the Firebase Realtime Database REST API.
//!
//! Subscriptions poll the node and report it whenever it changes.
//! Disconnect hooks are kept locally and written on [`RealtimeStore::disconnect`],
//! so a process that dies without shutting down leaves its presence flags set.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::store::{is_under, RealtimeStore, Snapshots};
use super::SyncError;
use crate::config::RealtimeConfig;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Clone)]
struct Endpoint {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

impl Endpoint {
    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, SyncError> {
        let mut req = self.client.request(method, self.url(path));
        if let Some(auth) = &self.auth {
            req = req.query(&[("auth", auth)]);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| SyncError::Store(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Store(format!("HTTP {status} for {path}")));
        }
        resp.json().await.map_err(|e| SyncError::Decode(e.to_string()))
    }
}

pub struct FirebaseStore {
    endpoint: Endpoint,
    poll_interval: Duration,
    hooks: Mutex<Vec<(String, Value)>>,
}

impl FirebaseStore {
    pub fn new(config: &RealtimeConfig, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(Self {
            endpoint: Endpoint {
                client,
                base_url: config.database_url.trim_end_matches('/').to_string(),
                auth: config.auth.clone(),
            },
            poll_interval: DEFAULT_POLL_INTERVAL,
            hooks: Mutex::new(Vec::new()),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn hooks(&self) -> MutexGuard<'_, Vec<(String, Value)>> {
        self.hooks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RealtimeStore for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, SyncError> {
        let value = self.endpoint.call(Method::GET, path, None).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), SyncError> {
        if value.is_null() {
            self.endpoint.call(Method::DELETE, path, None).await?;
        } else {
            self.endpoint.call(Method::PUT, path, Some(&value)).await?;
        }
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), SyncError> {
        self.endpoint
            .call(Method::PATCH, path, Some(&Value::Object(fields)))
            .await?;
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, SyncError> {
        let reply = self.endpoint.call(Method::POST, path, Some(&value)).await?;
        reply["name"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SyncError::Decode("push reply has no name".into()))
    }

    async fn subscribe(&self, path: &str) -> Result<Snapshots, SyncError> {
        let first = self.endpoint.call(Method::GET, path, None).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(first.clone());

        let endpoint = self.endpoint.clone();
        let interval = self.poll_interval;
        let path = path.to_string();
        tokio::spawn(async move {
            let mut last = first;
            loop {
                tokio::time::sleep(interval).await;
                if tx.is_closed() {
                    break;
                }
                match endpoint.call(Method::GET, &path, None).await {
                    Ok(value) if value != last => {
                        if tx.send(value.clone()).is_err() {
                            break;
                        }
                        last = value;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(path = %path, "Realtime poll failed: {e}"),
                }
            }
            tracing::debug!(path = %path, "Realtime subscription closed");
        });
        Ok(rx)
    }

    async fn on_disconnect_set(&self, path: &str, value: Value) -> Result<(), SyncError> {
        self.hooks().push((path.to_string(), value));
        Ok(())
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), SyncError> {
        self.hooks().retain(|(hook, _)| !is_under(hook, path));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SyncError> {
        let hooks = std::mem::take(&mut *self.hooks());
        for (path, value) in hooks {
            self.set(&path, value).await?;
        }
        Ok(())
    }
}
