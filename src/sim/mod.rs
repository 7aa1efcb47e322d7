//! Match simulation module
//!
//! All match gameplay lives here:
//! - Ball/paddle kinematics with clamped bounds
//! - Speed-preserving paddle bounces and goal detection
//! - Delayed, noisy AI opponent
//! - Match engine state machine and frame loop
//!
//! No networking or store access; the sync layer drives the engine from outside.

pub mod ai;
pub mod collision;
pub mod engine;
pub mod state;

pub use ai::{AiController, AiTuning};
pub use collision::{PaddleHit, bounce_velocity, check_goal, resolve_paddle_collision};
pub use engine::{FrameView, MatchEngine, MatchEvent, Surface, run_to_completion};
pub use state::{Ball, GameConfig, MatchState, Paddle, Rect, Score, Side};
