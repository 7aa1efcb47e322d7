//! Shared store capability
//!
//! The only channel between processes is a tree-structured key-path document
//! store with JSON values. Components receive a [`Store`] handle at
//! construction instead of reaching for a process-wide connection.
//!
//! Change notifications are push-based: a [`Subscription`] receives the full
//! value at its path after every write touching it. Consumers drain it from
//! their own update step; rapid writes may be coalesced by reading only the
//! latest value.

use std::sync::mpsc;

use serde_json::{Map, Value};

use crate::error::StoreError;

/// Identifier of a live subscription
pub type SubscriptionId = u64;

/// Read/write/subscribe access to the shared document
pub trait Store: Send + Sync {
    /// Read the value at `path` once
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value at `path`; `Value::Null` removes it
    fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Merge `fields` into the object at `path`, leaving other keys untouched
    ///
    /// Field keys may themselves be relative paths (`"bracket/0/winner"`).
    fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// Append `value` under a new, chronologically ordered child key
    fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;

    /// Remove the value at `path`
    fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.set(path, Value::Null)
    }

    /// Atomic read-modify-write of the value at `path`
    ///
    /// `apply` receives the current value and returns the replacement
    /// (`None` aborts without writing). It may be invoked more than once if
    /// a concurrent writer changes the value in between.
    fn transaction(
        &self,
        path: &str,
        apply: &mut dyn FnMut(Option<Value>) -> Option<Value>,
    ) -> Result<Option<Value>, StoreError>;

    /// Watch `path`; the current value is delivered immediately
    fn subscribe(&self, path: &str) -> Subscription;

    /// Stop delivering changes for a subscription
    fn unsubscribe(&self, id: SubscriptionId);

    /// Ask the store to delete `path` when this client disconnects abruptly
    fn on_disconnect_remove(&self, path: &str) -> Result<(), StoreError>;

    /// Cancel every pending disconnect removal registered for `path`
    fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError>;
}

/// Receiving end of a path subscription
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    path: String,
    rx: mpsc::Receiver<Option<Value>>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, path: impl Into<String>, rx: mpsc::Receiver<Option<Value>>) -> Self {
        Self {
            id,
            path: path.into(),
            rx,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Newest pending value, discarding older ones
    ///
    /// `None` means no change arrived; `Some(None)` means the path was removed.
    pub fn latest(&self) -> Option<Option<Value>> {
        self.rx.try_iter().last()
    }

    /// All pending values in delivery order
    pub fn drain(&self) -> Vec<Option<Value>> {
        self.rx.try_iter().collect()
    }
}

/// Split a key path into its non-empty segments
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join two path fragments with a single separator
pub fn join_path(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if base.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{child}")
    }
}

/// Whether a path is usable as a store key path
pub fn validate_path(path: &str) -> Result<(), StoreError> {
    let invalid = path
        .split('/')
        .filter(|s| !s.is_empty())
        .any(|segment| segment.chars().any(|c| matches!(c, '.' | '#' | '$' | '[' | ']')));
    if invalid {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_and_join() {
        assert_eq!(split_path("/lobbies//ABC/status/"), vec!["lobbies", "ABC", "status"]);
        assert_eq!(join_path("lobbies/ABC/", "/status"), "lobbies/ABC/status");
        assert_eq!(join_path("", "leaderboard"), "leaderboard");
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("lobbies/ABC123/players/p000001").is_ok());
        assert!(validate_path("lobbies/a.b").is_err());
        assert!(validate_path("leaderboard/$name").is_err());
    }
}
