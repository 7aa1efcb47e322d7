//! In-memory shared store
//!
//! A single [`MemoryStore`] holds the document; every participant talks to it
//! through its own [`MemoryClient`], which carries the participant's
//! subscriptions and disconnect registrations. Used for local play, the demo
//! binary and tests of the sync layer and orchestrator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, mpsc};

use serde_json::{Map, Value};

use super::store::{Store, Subscription, SubscriptionId, split_path, validate_path};
use crate::error::StoreError;

/// Attempts before a contended transaction gives up
const MAX_TRANSACTION_ATTEMPTS: u32 = 32;

struct SubscriberEntry {
    id: SubscriptionId,
    session: u64,
    segments: Vec<String>,
    tx: mpsc::Sender<Option<Value>>,
}

struct Inner {
    root: Value,
    subscribers: Vec<SubscriberEntry>,
    on_disconnect: HashMap<u64, Vec<String>>,
    next_subscription: SubscriptionId,
    next_push: u64,
    next_session: u64,
    offline: bool,
}

impl Inner {
    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// Send the current value to every subscriber overlapping a written path
    fn notify(&mut self, written: &[Vec<String>]) {
        let root = &self.root;
        self.subscribers.retain(|sub| {
            let touched = written.iter().any(|w| overlaps(&sub.segments, w));
            if !touched {
                return true;
            }
            let value = value_at(root, &sub.segments).cloned();
            sub.tx.send(value).is_ok()
        });
    }
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

fn owned(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

/// Value at a path; nulls count as absent
fn value_at<'a, S: AsRef<str>>(root: &'a Value, segments: &[S]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        let segment = segment.as_ref();
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if node.is_null() { None } else { Some(node) }
}

/// Whether a node carries no data and can be pruned from its parent
fn is_vacant(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Write `value` at `segments` below `node`, creating objects on the way
///
/// Writing `Null` removes the key and prunes parents left empty.
fn write_at(node: &mut Value, segments: &[&str], value: Value) -> Result<(), ()> {
    let Some((head, rest)) = segments.split_first() else {
        *node = if value.is_null() { Value::Object(Map::new()) } else { value };
        return Ok(());
    };

    if !node.is_object() && !node.is_array() {
        if value.is_null() {
            return Ok(());
        }
        *node = Value::Object(Map::new());
    }

    match node {
        Value::Object(map) => {
            if rest.is_empty() {
                if value.is_null() {
                    map.remove(*head);
                } else {
                    map.insert(head.to_string(), value);
                }
                return Ok(());
            }
            let child = map.entry(head.to_string()).or_insert(Value::Null);
            write_at(child, rest, value)?;
            if is_vacant(child) {
                map.remove(*head);
            }
            Ok(())
        }
        Value::Array(items) => {
            let index = head.parse::<usize>().map_err(|_| ())?;
            if rest.is_empty() {
                if index < items.len() {
                    items[index] = value;
                    Ok(())
                } else if index == items.len() && !value.is_null() {
                    items.push(value);
                    Ok(())
                } else if value.is_null() {
                    Ok(())
                } else {
                    Err(())
                }
            } else {
                let child = items.get_mut(index).ok_or(())?;
                write_at(child, rest, value)
            }
        }
        _ => Err(()),
    }
}

/// Shared backing document
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                root: Value::Object(Map::new()),
                subscribers: Vec::new(),
                on_disconnect: HashMap::new(),
                next_subscription: 1,
                next_push: 1,
                next_session: 1,
                offline: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a client session
    pub fn connect(&self) -> MemoryClient {
        let mut inner = self.lock();
        let session = inner.next_session;
        inner.next_session += 1;
        log::debug!("Store session {} connected", session);
        MemoryClient {
            store: self.clone(),
            session,
        }
    }

    /// Simulate an outage; every read and write fails while offline
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Inspect the document directly (bypasses the offline switch)
    pub fn snapshot(&self, path: &str) -> Option<Value> {
        let inner = self.lock();
        value_at(&inner.root, &split_path(path)).cloned()
    }

    /// Number of live subscriptions across all sessions
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Apply every write or none of them, then notify once
    fn write_many(&self, writes: Vec<(Vec<String>, Value)>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.ensure_online()?;
        let mut root = inner.root.clone();
        for (segments, value) in &writes {
            let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
            write_at(&mut root, &refs, value.clone()).map_err(|_| StoreError::InvalidPath {
                path: segments.join("/"),
            })?;
        }
        inner.root = root;
        let written: Vec<Vec<String>> = writes.into_iter().map(|(segments, _)| segments).collect();
        inner.notify(&written);
        Ok(())
    }
}

/// One participant's connection to a [`MemoryStore`]
pub struct MemoryClient {
    store: MemoryStore,
    session: u64,
}

impl MemoryClient {
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn backend(&self) -> &MemoryStore {
        &self.store
    }

    /// Simulate an abrupt network loss
    ///
    /// Runs every registered disconnect removal and drops this session's
    /// subscriptions.
    pub fn disconnect(&self) {
        let mut inner = self.store.lock();
        let paths = inner.on_disconnect.remove(&self.session).unwrap_or_default();
        let mut written = Vec::with_capacity(paths.len());
        for path in paths {
            let segments = split_path(&path);
            if write_at(&mut inner.root, &segments, Value::Null).is_ok() {
                written.push(owned(&segments));
            }
        }
        let session = self.session;
        inner.subscribers.retain(|sub| sub.session != session);
        inner.notify(&written);
        log::info!("Store session {} disconnected, {} paths removed", session, written.len());
    }
}

impl Store for MemoryClient {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        validate_path(path)?;
        let inner = self.store.lock();
        inner.ensure_online()?;
        Ok(value_at(&inner.root, &split_path(path)).cloned())
    }

    fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        validate_path(path)?;
        self.store.write_many(vec![(owned(&split_path(path)), value)])
    }

    fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        validate_path(path)?;
        let base = split_path(path);
        let mut writes = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            validate_path(&key)?;
            let mut segments = owned(&base);
            segments.extend(split_path(&key).into_iter().map(str::to_string));
            writes.push((segments, value));
        }
        self.store.write_many(writes)
    }

    fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        validate_path(path)?;
        let key = {
            let mut inner = self.store.lock();
            inner.ensure_online()?;
            let key = format!("p{:012}", inner.next_push);
            inner.next_push += 1;
            key
        };
        let mut segments = owned(&split_path(path));
        segments.push(key.clone());
        self.store.write_many(vec![(segments, value)])?;
        Ok(key)
    }

    fn transaction(
        &self,
        path: &str,
        apply: &mut dyn FnMut(Option<Value>) -> Option<Value>,
    ) -> Result<Option<Value>, StoreError> {
        validate_path(path)?;
        let segments = split_path(path);

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let current = {
                let inner = self.store.lock();
                inner.ensure_online()?;
                value_at(&inner.root, &segments).cloned()
            };

            // The lock is not held while `apply` runs
            let Some(next) = apply(current.clone()) else {
                return Ok(current);
            };

            let mut inner = self.store.lock();
            inner.ensure_online()?;
            if value_at(&inner.root, &segments) != current.as_ref() {
                log::debug!("Transaction on {} contended (attempt {})", path, attempt);
                continue;
            }
            write_at(&mut inner.root, &segments, next.clone()).map_err(|_| StoreError::InvalidPath {
                path: path.to_string(),
            })?;
            inner.notify(&[owned(&segments)]);
            return Ok(if next.is_null() { None } else { Some(next) });
        }

        Err(StoreError::TransactionAborted {
            path: path.to_string(),
            attempts: MAX_TRANSACTION_ATTEMPTS,
        })
    }

    fn subscribe(&self, path: &str) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let segments = owned(&split_path(path));
        let mut inner = self.store.lock();
        let id = inner.next_subscription;
        inner.next_subscription += 1;
        // Initial delivery mirrors a value listener firing on attach
        let _ = tx.send(value_at(&inner.root, &segments).cloned());
        inner.subscribers.push(SubscriberEntry {
            id,
            session: self.session,
            segments,
            tx,
        });
        Subscription::new(id, path, rx)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.store.lock().subscribers.retain(|sub| sub.id != id);
    }

    fn on_disconnect_remove(&self, path: &str) -> Result<(), StoreError> {
        validate_path(path)?;
        let mut inner = self.store.lock();
        inner.ensure_online()?;
        inner
            .on_disconnect
            .entry(self.session)
            .or_default()
            .push(path.to_string());
        Ok(())
    }

    fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
        let mut inner = self.store.lock();
        if let Some(paths) = inner.on_disconnect.get_mut(&self.session) {
            paths.retain(|p| p != path);
        }
        Ok(())
    }
}
