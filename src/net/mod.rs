//! Networking over a shared key-path store
//!
//! - `store`: the store capability every online component is handed
//! - `memory`: in-process store used for local play and tests
//! - `snapshot`: wire shape of a match's published state
//! - `sync`: host/guest/spectator match synchronization

pub mod memory;
pub mod snapshot;
pub mod store;
pub mod sync;

pub use memory::{MemoryClient, MemoryStore};
pub use snapshot::{BallSnapshot, GameStateSnapshot};
pub use store::{Store, Subscription, SubscriptionId, join_path, split_path, validate_path};
pub use sync::{MatchSync, SpectatorView, SyncConfig, SyncRole, gamestate_path};
