//! Historical win leaderboard
//!
//! Lives under `leaderboard/{playerName}` as plain counters. The periodic
//! aggregation job folds finished lobbies into it and then wipes `lobbies`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::net::{Store, validate_path};

pub const LEADERBOARD_PATH: &str = "leaderboard";
pub const LOBBIES_PATH: &str = "lobbies";

/// One ranked entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub wins: u64,
}

/// Ranked view of the stored counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Rank counters by wins (descending), then name
    pub fn from_counts(counts: impl IntoIterator<Item = (String, u64)>) -> Self {
        let mut entries: Vec<LeaderboardEntry> = counts
            .into_iter()
            .filter(|(_, wins)| *wins > 0)
            .map(|(name, wins)| LeaderboardEntry { name, wins })
            .collect();
        entries.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.name.cmp(&b.name)));
        Self { entries }
    }

    /// Read and rank `leaderboard`; non-numeric counters are skipped
    pub fn load(store: &dyn Store) -> Result<Self, StoreError> {
        let Some(Value::Object(map)) = store.get(LEADERBOARD_PATH)? else {
            log::info!("Leaderboard is empty");
            return Ok(Self::new());
        };
        let board = Self::from_counts(
            map.into_iter()
                .filter_map(|(name, wins)| wins.as_u64().map(|w| (name, w))),
        );
        log::info!("Loaded leaderboard with {} entries", board.entries.len());
        Ok(board)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn leader(&self) -> Option<&LeaderboardEntry> {
        self.entries.first()
    }

    /// 1-indexed rank of `name`
    pub fn rank_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name).map(|i| i + 1)
    }

    pub fn wins_of(&self, name: &str) -> u64 {
        self.entries.iter().find(|e| e.name == name).map_or(0, |e| e.wins)
    }

    pub fn top(&self, n: usize) -> &[LeaderboardEntry] {
        &self.entries[..n.min(self.entries.len())]
    }
}

/// Outcome of one aggregation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationReport {
    pub lobbies_seen: usize,
    /// Wins added per name
    pub wins_added: BTreeMap<String, u64>,
}

/// Count tournament winners across a `lobbies` value
pub fn collect_winners(lobbies: &Value) -> BTreeMap<String, u64> {
    let mut wins = BTreeMap::new();
    let Some(map) = lobbies.as_object() else {
        return wins;
    };
    for (lobby_id, lobby) in map {
        let Some(winner) = lobby.get("winner").and_then(Value::as_str) else {
            continue;
        };
        if winner.is_empty() || winner.contains('/') || validate_path(winner).is_err() {
            log::warn!("Skipping unusable winner {:?} in lobby {}", winner, lobby_id);
            continue;
        }
        *wins.entry(winner.to_string()).or_insert(0) += 1;
    }
    wins
}

/// Atomically add `wins` to a player's counter; returns the new total
pub fn add_wins(store: &dyn Store, name: &str, wins: u64) -> Result<u64, StoreError> {
    let path = format!("{LEADERBOARD_PATH}/{name}");
    let updated = store.transaction(&path, &mut |current| {
        let previous = current.as_ref().and_then(Value::as_u64).unwrap_or(0);
        Some(Value::from(previous + wins))
    })?;
    Ok(updated.as_ref().and_then(Value::as_u64).unwrap_or(0))
}

/// Fold every finished lobby into the leaderboard, then wipe `lobbies`
///
/// No-op when there are no lobbies. All winners are credited in a single
/// transaction on `leaderboard`, and `lobbies` is only removed once it
/// committed, so a failed run credits nothing and can simply be retried.
pub fn run_aggregation(store: &dyn Store) -> Result<AggregationReport, StoreError> {
    let Some(lobbies) = store.get(LOBBIES_PATH)? else {
        log::info!("No lobbies to clean up");
        return Ok(AggregationReport::default());
    };

    let report = AggregationReport {
        lobbies_seen: lobbies.as_object().map_or(0, |m| m.len()),
        wins_added: collect_winners(&lobbies),
    };
    if !report.wins_added.is_empty() {
        store.transaction(LEADERBOARD_PATH, &mut |current| {
            let mut board = match current {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            for (name, wins) in &report.wins_added {
                let previous = board.get(name).and_then(Value::as_u64).unwrap_or(0);
                log::debug!("{} +{} -> {}", name, wins, previous + wins);
                board.insert(name.clone(), Value::from(previous + wins));
            }
            Some(Value::Object(board))
        })?;
    }

    store.remove(LOBBIES_PATH)?;
    log::info!(
        "Aggregated {} lobbies, {} winners credited",
        report.lobbies_seen,
        report.wins_added.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{MemoryClient, MemoryStore, Subscription, SubscriptionId};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_ranking() {
        let board = Leaderboard::from_counts([
            ("Bob".to_string(), 2),
            ("Alice".to_string(), 5),
            ("Cara".to_string(), 2),
            ("Nobody".to_string(), 0),
        ]);
        let names: Vec<&str> = board.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "Cara"]);
        assert_eq!(board.rank_of("Cara"), Some(3));
        assert_eq!(board.rank_of("Nobody"), None);
        assert_eq!(board.wins_of("Alice"), 5);
        assert_eq!(board.top(2).len(), 2);
        assert_eq!(board.top(10).len(), 3);
    }

    #[test]
    fn test_aggregation_without_lobbies_is_noop() {
        let store = MemoryStore::new();
        let client = store.connect();
        client.set("leaderboard/Alice", json!(3)).unwrap();
        let report = run_aggregation(&client).unwrap();
        assert_eq!(report, AggregationReport::default());
        assert_eq!(store.snapshot("leaderboard/Alice"), Some(json!(3)));
    }

    #[test]
    fn test_aggregation_adds_and_wipes() {
        let store = MemoryStore::new();
        let client = store.connect();
        client.set("leaderboard/Alice", json!(3)).unwrap();
        client
            .set(
                "lobbies",
                json!({
                    "L1": {"status": "COMPLETE", "winner": "Alice"},
                    "L2": {"status": "COMPLETE", "winner": "Bob"},
                    "L3": {"status": "COMPLETE", "winner": "Alice"},
                    "L4": {"status": "LOBBY"},
                }),
            )
            .unwrap();

        let report = run_aggregation(&client).unwrap();
        assert_eq!(report.lobbies_seen, 4);
        assert_eq!(report.wins_added.get("Alice"), Some(&2));
        assert_eq!(store.snapshot("lobbies"), None);

        let board = Leaderboard::load(&client).unwrap();
        assert_eq!(board.wins_of("Alice"), 5);
        assert_eq!(board.wins_of("Bob"), 1);
        assert_eq!(board.leader().map(|e| e.name.as_str()), Some("Alice"));
    }

    #[test]
    fn test_failed_update_keeps_lobbies() {
        let store = MemoryStore::new();
        let client = store.connect();
        client.set("lobbies/L1/winner", json!("Alice")).unwrap();
        store.set_offline(true);
        assert_eq!(run_aggregation(&client), Err(StoreError::Unavailable));
        store.set_offline(false);
        assert!(store.snapshot("lobbies/L1").is_some());
    }

    /// Client whose next leaderboard transaction fails
    struct FlakyClient {
        client: MemoryClient,
        fail_next: AtomicBool,
    }

    impl Store for FlakyClient {
        fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
            self.client.get(path)
        }

        fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
            self.client.set(path, value)
        }

        fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
            self.client.update(path, fields)
        }

        fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
            self.client.push(path, value)
        }

        fn transaction(
            &self,
            path: &str,
            apply: &mut dyn FnMut(Option<Value>) -> Option<Value>,
        ) -> Result<Option<Value>, StoreError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Unavailable);
            }
            self.client.transaction(path, apply)
        }

        fn subscribe(&self, path: &str) -> Subscription {
            self.client.subscribe(path)
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            self.client.unsubscribe(id)
        }

        fn on_disconnect_remove(&self, path: &str) -> Result<(), StoreError> {
            self.client.on_disconnect_remove(path)
        }

        fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
            self.client.cancel_on_disconnect(path)
        }
    }

    #[test]
    fn test_retry_after_failed_credit_counts_once() {
        let store = MemoryStore::new();
        let flaky = FlakyClient {
            client: store.connect(),
            fail_next: AtomicBool::new(true),
        };
        flaky
            .set("lobbies", json!({"L1": {"winner": "Alice"}, "L2": {"winner": "Bob"}}))
            .unwrap();

        assert_eq!(run_aggregation(&flaky), Err(StoreError::Unavailable));
        assert_eq!(store.snapshot("leaderboard"), None);
        assert!(store.snapshot("lobbies").is_some());

        run_aggregation(&flaky).unwrap();
        assert_eq!(store.snapshot("leaderboard/Alice"), Some(json!(1)));
        assert_eq!(store.snapshot("leaderboard/Bob"), Some(json!(1)));
        assert_eq!(store.snapshot("lobbies"), None);
    }

    #[test]
    fn test_concurrent_add_wins() {
        let store = MemoryStore::new();
        let a = store.connect();
        let b = store.connect();
        let handles = [a, b].map(|client| std::thread::spawn(move || add_wins(&client, "Alice", 1).unwrap()));
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.snapshot("leaderboard/Alice"), Some(json!(2)));
    }
}
