//! Pong Tournament - two-player pong matches with a round-robin tournament layer
//!
//! Core modules:
//! - `sim`: Match simulation (entities, collisions, AI, match engine)
//! - `net`: Shared store capability and host-authoritative match sync
//! - `tournament`: Round-robin brackets, online orchestration, standings
//! - `leaderboard`: Historical win aggregation over finished lobbies
//! - `input`: Keyboard/pointer mapping to paddle drive signals
//! - `settings`: Tunable configuration surface

pub mod error;
pub mod input;
pub mod leaderboard;
pub mod net;
pub mod settings;
pub mod sim;
pub mod tournament;

pub use error::{StoreError, TournamentError};
pub use leaderboard::Leaderboard;
pub use settings::Settings;

/// Game configuration constants
pub mod consts {
    /// Duration of one canonical frame in milliseconds (logical 60 Hz)
    pub const FRAME_MS: f32 = 1000.0 / 60.0;
    /// Largest dt (in canonical frames) a single tick may integrate
    pub const MAX_FRAME_DT: f32 = 4.0;

    /// Horizontal distance between a paddle and its wall
    pub const PADDLE_WALL_OFFSET: f32 = 20.0;
    /// Paddle travel per tick (canonical px)
    pub const PADDLE_SPEED: f32 = 8.0;

    /// Initial horizontal ball speed (canonical px per frame)
    pub const BALL_INITIAL_SPEED: f32 = 6.0;
    /// Initial vertical ball speed is uniform in [-BALL_INITIAL_VY, BALL_INITIAL_VY)
    pub const BALL_INITIAL_VY: f32 = 3.0;
    /// Speed multiplier added on every paddle hit
    pub const BALL_SPEED_STEP: f32 = 0.05;
    /// Hard cap for the speed multiplier
    pub const BALL_MAX_SPEED_MULTIPLIER: f32 = 3.0;
    /// Magnitude of the vertical nudge applied by `Ball::flip_x`
    pub const BALL_FLIP_JITTER: f32 = 0.5;

    /// Maximum bounce angle off a paddle (60 degrees)
    pub const MAX_BOUNCE_ANGLE: f32 = std::f32::consts::FRAC_PI_3;

    /// Display name of the filler entrant for odd-sized groups
    pub const BOT_NAME: &str = "AI Bot";
}

/// Milliseconds since the Unix epoch (0 if the clock is before the epoch)
pub fn now_epoch_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
