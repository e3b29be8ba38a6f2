//! In-process realtime store.
//!
//! Every [`MemoryStore::connection`] shares one tree but keeps its own
//! disconnect hooks, which makes it a stand-in for two clients of a hosted
//! database.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::store::{is_under, join_path, push_key, segments, RealtimeStore, Snapshots};
use super::SyncError;

struct Subscriber {
    path: Vec<String>,
    tx: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
struct Tree {
    root: Value,
    subscribers: Vec<Subscriber>,
}

impl Tree {
    fn write(&mut self, path: &str, value: Value) {
        let segs = segments(path);
        write_at(&mut self.root, &segs, value);
        self.notify(&segs);
    }

    /// Subscribers on an ancestor or descendant of `changed` get a fresh
    /// snapshot; closed receivers are dropped.
    fn notify(&mut self, changed: &[&str]) {
        let root = &self.root;
        self.subscribers.retain(|sub| {
            let related = sub.path.iter().zip(changed).all(|(a, b)| a.as_str() == *b);
            if !related {
                return !sub.tx.is_closed();
            }
            let segs: Vec<&str> = sub.path.iter().map(String::as_str).collect();
            let snapshot = read_at(root, &segs).cloned().unwrap_or(Value::Null);
            sub.tx.send(snapshot).is_ok()
        });
    }
}

fn read_at<'a>(node: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let found = segs.iter().try_fold(node, |node, seg| node.get(*seg))?;
    (!found.is_null()).then_some(found)
}

fn write_at(node: &mut Value, segs: &[&str], value: Value) {
    let Some((head, rest)) = segs.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    let prune = {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        write_at(child, rest, value);
        child.is_null() || child.as_object().is_some_and(Map::is_empty)
    };
    if prune {
        map.remove(*head);
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tree: Arc<Mutex<Tree>>,
    hooks: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Another client of the same tree.
    pub fn connection(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            hooks: Arc::default(),
        }
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn hooks(&self) -> MutexGuard<'_, Vec<(String, Value)>> {
        self.hooks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, SyncError> {
        Ok(read_at(&self.tree().root, &segments(path)).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), SyncError> {
        self.tree().write(path, value);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), SyncError> {
        let mut tree = self.tree();
        for (key, value) in fields {
            tree.write(&join_path(path, &key), value);
        }
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, SyncError> {
        let key = push_key();
        self.tree().write(&join_path(path, &key), value);
        Ok(key)
    }

    async fn subscribe(&self, path: &str) -> Result<Snapshots, SyncError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let segs = segments(path);
        let mut tree = self.tree();
        let current = read_at(&tree.root, &segs).cloned().unwrap_or(Value::Null);
        // The receiver is still in scope, so this cannot fail.
        let _ = tx.send(current);
        tree.subscribers.push(Subscriber {
            path: segs.iter().map(|s| s.to_string()).collect(),
            tx,
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
        let mut tree = self.tree();
        for (path, value) in hooks {
            tree.write(&path, value);
        }
        Ok(())
    }
}
