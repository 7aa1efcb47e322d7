//! Host-authoritative match synchronization
//!
//! The host runs the real simulation and publishes rate-limited snapshots of
//! ball, score and its paddle. The guest runs a replica engine (no ball
//! physics), publishes only its own paddle and steers its ball toward each
//! received snapshot. Spectators only read.
//!
//! Everything is polled from the owner's frame loop: `publish` reads the
//! engine between ticks and `poll` drains the store subscription.

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::snapshot::GameStateSnapshot;
use super::store::{Store, Subscription, join_path};
use crate::sim::{FrameView, GameConfig, MatchEngine, MatchState, Paddle, Score, Side, Surface};

/// Sync tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Minimum time between two publishes
    pub publish_interval_ms: u64,
    /// Host skips a publish unless the ball moved more than this on an axis
    pub min_ball_displacement: f32,
    /// Fraction of the remaining distance the guest ball closes per snapshot
    pub lerp_factor: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: 50,
            min_ball_displacement: 2.0,
            lerp_factor: 0.85,
        }
    }
}

/// What this participant does in a match, chosen once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRole {
    /// Authoritative left player; mirrors the right paddle when it is AI-driven
    Host { mirror_right_paddle: bool },
    /// Right player running a replica
    Guest,
    /// Observer of someone else's match
    Spectator,
}

impl SyncRole {
    pub fn publishes_ball_and_score(&self) -> bool {
        matches!(self, SyncRole::Host { .. })
    }

    pub fn publishes_own_paddle(&self) -> bool {
        !self.is_read_only()
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, SyncRole::Spectator)
    }

    /// Paddle this participant drives, if any
    pub fn own_side(&self) -> Option<Side> {
        match self {
            SyncRole::Host { .. } => Some(Side::Left),
            SyncRole::Guest => Some(Side::Right),
            SyncRole::Spectator => None,
        }
    }
}

/// Store path of a match's published state
pub fn gamestate_path(lobby_id: &str, match_id: &str) -> String {
    format!("lobbies/{lobby_id}/matches/{match_id}/gamestate")
}

/// Convert a published top-left y into the center-based position input
fn center_from_top(top: f32, config: &GameConfig) -> f32 {
    top + config.paddle_height / 2.0
}

/// One participant's sync session for a single match
pub struct MatchSync {
    store: Arc<dyn Store>,
    role: SyncRole,
    config: SyncConfig,
    path: String,
    subscription: Option<Subscription>,
    known: GameStateSnapshot,
    last_publish: Option<Instant>,
    last_ball: Option<Vec2>,
    last_score: Option<Score>,
    last_paddle: Option<f32>,
}

impl MatchSync {
    pub fn new(
        store: Arc<dyn Store>,
        lobby_id: &str,
        match_id: &str,
        role: SyncRole,
        config: SyncConfig,
    ) -> Self {
        let path = gamestate_path(lobby_id, match_id);
        // The host only cares about the guest's paddle, not its own echoes
        let watched = match role {
            SyncRole::Host { .. } => join_path(&path, "paddleRight"),
            SyncRole::Guest | SyncRole::Spectator => path.clone(),
        };
        let subscription = store.subscribe(&watched);
        log::info!("Match sync opened on {} as {:?}", path, role);
        Self {
            store,
            role,
            config,
            path,
            subscription: Some(subscription),
            known: GameStateSnapshot::default(),
            last_publish: None,
            last_ball: None,
            last_score: None,
            last_paddle: None,
        }
    }

    pub fn role(&self) -> SyncRole {
        self.role
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// Last known published state (absent fields never received)
    pub fn known(&self) -> &GameStateSnapshot {
        &self.known
    }

    /// Put an engine into the mode this role needs
    pub fn configure_engine(&self, engine: &mut MatchEngine) {
        match self.role {
            SyncRole::Host { .. } => engine.set_ball_authority(true),
            SyncRole::Guest | SyncRole::Spectator => engine.set_ball_authority(false),
        }
    }

    /// Publish this participant's share of the match state if due
    ///
    /// Returns true if a write went out. Write failures are logged and
    /// otherwise ignored; the next publish carries fresher state anyway.
    pub fn publish(&mut self, engine: &MatchEngine, now: Instant) -> bool {
        if !self.is_open() || self.role.is_read_only() {
            return false;
        }
        let interval = Duration::from_millis(self.config.publish_interval_ms);
        if self.last_publish.is_some_and(|last| now.saturating_duration_since(last) < interval) {
            return false;
        }

        let fields = match self.role {
            SyncRole::Host { mirror_right_paddle } => {
                let Some(fields) = self.host_fields(engine, mirror_right_paddle) else {
                    return false;
                };
                fields
            }
            SyncRole::Guest => {
                let y = engine.paddle(Side::Right).y;
                if self.last_paddle == Some(y) {
                    return false;
                }
                let mut fields = Map::new();
                fields.insert("paddleRight".into(), Value::from(y));
                fields
            }
            SyncRole::Spectator => return false,
        };

        self.last_publish = Some(now);
        match self.store.update(&self.path, fields) {
            Ok(()) => {
                match self.role {
                    SyncRole::Host { .. } => {
                        self.last_ball = Some(engine.ball().pos);
                        self.last_score = Some(engine.score());
                    }
                    _ => self.last_paddle = Some(engine.paddle(Side::Right).y),
                }
                true
            }
            Err(err) => {
                log::warn!("Publish to {} failed: {}", self.path, err);
                false
            }
        }
    }

    fn host_fields(&self, engine: &MatchEngine, mirror_right_paddle: bool) -> Option<Map<String, Value>> {
        let score_changed = self.last_score != Some(engine.score());
        // The final score must go out even though the loop has stopped
        if engine.state() != MatchState::Playing && !score_changed {
            return None;
        }
        let pos = engine.ball().pos;
        let moved = self.last_ball.is_none_or(|last| {
            (pos.x - last.x).abs() > self.config.min_ball_displacement
                || (pos.y - last.y).abs() > self.config.min_ball_displacement
        });
        if !moved && !score_changed {
            return None;
        }
        Some(GameStateSnapshot::host_view(engine, mirror_right_paddle).to_fields())
    }

    /// Newest delivered change, as a partial snapshot, and the state known before it
    fn receive(&mut self) -> Option<(GameStateSnapshot, GameStateSnapshot)> {
        let value = self.subscription.as_ref()?.latest()??;
        let snapshot = match self.role {
            SyncRole::Host { .. } => GameStateSnapshot {
                paddle_right: value.as_f64().map(|v| v as f32),
                ..Default::default()
            },
            SyncRole::Guest | SyncRole::Spectator => GameStateSnapshot::from_value(&value),
        };
        let previous = self.known;
        self.known.merge(&snapshot);
        Some((snapshot, previous))
    }

    /// Apply any received state to the local engine
    ///
    /// The guest blends toward each host ball position once. Returns true if
    /// a change arrived.
    pub fn poll(&mut self, engine: &mut MatchEngine) -> bool {
        let Some((snapshot, previous)) = self.receive() else {
            return false;
        };
        let config = *engine.config();

        match self.role {
            SyncRole::Host { .. } => {
                if let Some(top) = snapshot.paddle_right {
                    engine.set_paddle_position(Side::Right, center_from_top(top, &config));
                }
            }
            SyncRole::Guest => {
                // Echoes of our own paddle writes redeliver the old ball
                if let Some(ball) = snapshot.ball.filter(|b| previous.ball != Some(*b)) {
                    let lerp = self.config.lerp_factor;
                    let target = Vec2::new(ball.x, ball.y);
                    let replica = engine.ball_mut();
                    replica.pos += (target - replica.pos) * lerp;
                    replica.vel = Vec2::new(ball.vx, ball.vy);
                }
                if let Some(top) = snapshot.paddle_left {
                    engine.set_paddle_position(Side::Left, center_from_top(top, &config));
                }
                if let Some(score) = snapshot.score {
                    engine.adopt_score(score);
                }
            }
            SyncRole::Spectator => {}
        }
        true
    }

    /// Stop listening; further publishes and polls do nothing
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.store.unsubscribe(subscription.id());
            log::debug!("Match sync closed on {}", self.path);
        }
    }
}

impl Drop for MatchSync {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read-only view of someone else's match
pub struct SpectatorView {
    sync: MatchSync,
    game: GameConfig,
}

impl SpectatorView {
    pub fn new(store: Arc<dyn Store>, lobby_id: &str, match_id: &str, game: GameConfig) -> Self {
        Self {
            sync: MatchSync::new(store, lobby_id, match_id, SyncRole::Spectator, SyncConfig::default()),
            game,
        }
    }

    pub fn match_path(&self) -> &str {
        self.sync.path()
    }

    /// Pull the newest published state; returns true on change
    pub fn poll(&mut self) -> bool {
        self.sync.receive().is_some()
    }

    pub fn snapshot(&self) -> &GameStateSnapshot {
        self.sync.known()
    }

    /// Court built from the last known snapshot
    ///
    /// Fields never published fall back to their starting positions.
    pub fn frame_view(&self) -> FrameView {
        let known = self.sync.known();
        let (ball_pos, ball_vel) = match known.ball {
            Some(b) => (Vec2::new(b.x, b.y), Vec2::new(b.vx, b.vy)),
            None => (self.game.center(), Vec2::ZERO),
        };
        let paddle_rect = |side: Side| {
            let mut paddle = Paddle::new(side, &self.game);
            if let Some(top) = known.paddle(side) {
                paddle.y = self.game.clamp_paddle_y(top);
            }
            paddle.rect()
        };
        FrameView {
            state: if known.ball.is_some() { MatchState::Playing } else { MatchState::Lobby },
            canvas_width: self.game.canvas_width,
            canvas_height: self.game.canvas_height,
            ball_pos,
            ball_vel,
            ball_radius: self.game.ball_radius,
            left_paddle: paddle_rect(Side::Left),
            right_paddle: paddle_rect(Side::Right),
            score: known.score.unwrap_or_default(),
            countdown: None,
        }
    }

    pub fn present(&self, surface: &mut dyn Surface) {
        surface.present(&self.frame_view());
    }

    pub fn close(&mut self) {
        self.sync.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MemoryStore;
    use serde_json::json;

    const LOBBY: &str = "ABC123";
    const MATCH: &str = "round_0_match_0";

    fn pair(mirror: bool) -> (MemoryStore, MatchSync, MatchSync) {
        let store = MemoryStore::new();
        let host = MatchSync::new(
            Arc::new(store.connect()),
            LOBBY,
            MATCH,
            SyncRole::Host { mirror_right_paddle: mirror },
            SyncConfig::default(),
        );
        let guest = MatchSync::new(Arc::new(store.connect()), LOBBY, MATCH, SyncRole::Guest, SyncConfig::default());
        (store, host, guest)
    }

    fn engine(seed: u64) -> MatchEngine {
        MatchEngine::with_seed(GameConfig::default(), seed)
    }

    #[test]
    fn test_role_capabilities() {
        let host = SyncRole::Host { mirror_right_paddle: false };
        assert!(host.publishes_ball_and_score());
        assert!(host.publishes_own_paddle());
        assert!(!SyncRole::Guest.publishes_ball_and_score());
        assert!(SyncRole::Guest.publishes_own_paddle());
        assert!(SyncRole::Spectator.is_read_only());
        assert!(!SyncRole::Spectator.publishes_own_paddle());
    }

    #[test]
    fn test_host_publish_is_throttled() {
        let (store, mut host, _guest) = pair(false);
        let mut engine = engine(1);
        engine.start();
        let t0 = Instant::now();

        assert!(host.publish(&engine, t0));
        engine.ball_mut().pos.x += 10.0;
        // Inside the interval
        assert!(!host.publish(&engine, t0 + Duration::from_millis(20)));
        assert!(host.publish(&engine, t0 + Duration::from_millis(60)));

        // Interval elapsed but the ball barely moved
        engine.ball_mut().pos.x += 1.0;
        assert!(!host.publish(&engine, t0 + Duration::from_millis(200)));

        let stored = store.snapshot(&gamestate_path(LOBBY, MATCH)).unwrap();
        assert!(stored.get("paddleRight").is_none());
        assert!(stored.get("paddleLeft").is_some());
    }

    #[test]
    fn test_host_mirrors_ai_paddle() {
        let (store, mut host, _guest) = pair(true);
        let mut engine = engine(1);
        engine.enable_ai(Side::Right);
        engine.start();
        assert!(host.publish(&engine, Instant::now()));
        let stored = store.snapshot(&gamestate_path(LOBBY, MATCH)).unwrap();
        assert_eq!(stored["paddleRight"], json!(engine.paddle(Side::Right).y));
    }

    #[test]
    fn test_guest_follows_host() {
        let (_store, mut host, mut guest) = pair(false);
        let mut host_engine = engine(1);
        let mut guest_engine = engine(2);
        guest.configure_engine(&mut guest_engine);
        host_engine.start();
        guest_engine.start();

        host_engine.set_paddle_position(Side::Left, 100.0);
        host_engine.ball_mut().pos = Vec2::new(300.0, 200.0);
        host_engine.ball_mut().vel = Vec2::new(-6.0, 1.0);
        assert!(host.publish(&host_engine, Instant::now()));

        let before = guest_engine.ball().pos;
        assert!(guest.poll(&mut guest_engine));
        let expected = before + (Vec2::new(300.0, 200.0) - before) * 0.85;
        assert!((guest_engine.ball().pos - expected).length() < 1e-3);
        assert_eq!(guest_engine.ball().vel, Vec2::new(-6.0, 1.0));
        // Top-left y survives the round trip through the center-based input
        assert_eq!(guest_engine.paddle(Side::Left).y, host_engine.paddle(Side::Left).y);
        assert!(!guest.poll(&mut guest_engine));
    }

    #[test]
    fn test_guest_blends_once_per_host_snapshot() {
        let (_store, mut host, mut guest) = pair(false);
        let mut host_engine = engine(1);
        let mut guest_engine = engine(2);
        guest.configure_engine(&mut guest_engine);
        host_engine.start();
        guest_engine.start();

        host_engine.ball_mut().pos = Vec2::new(100.0, 100.0);
        assert!(host.publish(&host_engine, Instant::now()));
        let before = guest_engine.ball().pos;
        assert!(guest.poll(&mut guest_engine));
        let blended = before + (Vec2::new(100.0, 100.0) - before) * 0.85;
        assert!((guest_engine.ball().pos - blended).length() < 1e-3);

        // Our own paddle write comes back with the same host ball
        guest_engine.set_paddle_position(Side::Right, 200.0);
        assert!(guest.publish(&guest_engine, Instant::now()));
        assert!(guest.poll(&mut guest_engine));
        assert!((guest_engine.ball().pos - blended).length() < 1e-3);
        assert_eq!(guest.known().paddle_right, Some(guest_engine.paddle(Side::Right).y));
    }

    #[test]
    fn test_host_applies_guest_paddle() {
        let (_store, mut host, mut guest) = pair(false);
        let mut host_engine = engine(1);
        let mut guest_engine = engine(2);
        guest.configure_engine(&mut guest_engine);
        guest_engine.set_paddle_position(Side::Right, 450.0);

        assert!(guest.publish(&guest_engine, Instant::now()));
        assert!(host.poll(&mut host_engine));
        assert_eq!(host_engine.paddle(Side::Right).y, guest_engine.paddle(Side::Right).y);

        // Unchanged paddle is not republished
        assert!(!guest.publish(&guest_engine, Instant::now() + Duration::from_secs(1)));
    }

    #[test]
    fn test_guest_ends_on_adopted_score() {
        let (_store, mut host, mut guest) = pair(false);
        let mut host_engine = engine(1);
        let mut guest_engine = engine(2);
        guest.configure_engine(&mut guest_engine);
        let events = guest_engine.subscribe();
        host_engine.start();
        guest_engine.start();

        host_engine.adopt_score(Score::new(5, 3));
        assert_eq!(host_engine.state(), MatchState::Ended);
        // Final score still goes out after the host loop stopped
        assert!(host.publish(&host_engine, Instant::now()));
        guest.poll(&mut guest_engine);

        assert_eq!(guest_engine.state(), MatchState::Ended);
        assert!(events.try_iter().any(|e| e == crate::sim::MatchEvent::MatchEnded { winner: Side::Left }));
    }

    #[test]
    fn test_publish_failure_is_swallowed() {
        let (store, mut host, _guest) = pair(false);
        let mut engine = engine(1);
        engine.start();
        store.set_offline(true);
        assert!(!host.publish(&engine, Instant::now()));
        store.set_offline(false);
        engine.ball_mut().pos.x += 10.0;
        assert!(host.publish(&engine, Instant::now() + Duration::from_millis(100)));
    }

    #[test]
    fn test_close_unsubscribes() {
        let (store, mut host, guest) = pair(false);
        assert_eq!(store.subscriber_count(), 2);
        host.close();
        assert_eq!(store.subscriber_count(), 1);
        drop(guest);
        assert_eq!(store.subscriber_count(), 0);
        assert!(!host.publish(&engine(1), Instant::now()));
    }

    #[test]
    fn test_spectator_keeps_last_known() {
        let store = MemoryStore::new();
        let writer = store.connect();
        let mut view = SpectatorView::new(Arc::new(store.connect()), LOBBY, MATCH, GameConfig::default());
        let path = gamestate_path(LOBBY, MATCH);

        let idle = view.frame_view();
        assert_eq!(idle.state, MatchState::Lobby);
        assert_eq!(idle.ball_pos, GameConfig::default().center());

        writer
            .set(&path, json!({"ball": {"x": 10.0, "y": 20.0, "vx": 6.0, "vy": 0.0}, "score": {"left": 1, "right": 2}, "paddleLeft": 40.0}))
            .unwrap();
        assert!(view.poll());
        writer.set(&join_path(&path, "paddleLeft"), json!(80.0)).unwrap();
        assert!(view.poll());

        let frame = view.frame_view();
        assert_eq!(frame.state, MatchState::Playing);
        assert_eq!(frame.ball_pos, Vec2::new(10.0, 20.0));
        assert_eq!(frame.score, Score::new(1, 2));
        assert_eq!(frame.left_paddle.y, 80.0);

        writer.remove(&path).unwrap();
        view.poll();
        assert_eq!(view.frame_view().ball_pos, Vec2::new(10.0, 20.0));
    }
}
