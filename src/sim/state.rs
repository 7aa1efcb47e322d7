//! Match entities and configuration
//!
//! The ball and both paddles are pure kinematic state with per-tick update
//! rules. Velocities are expressed in canonical-frame units (see
//! [`crate::consts::FRAME_MS`]).

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Which paddle a player occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "LEFT",
            Side::Right => "RIGHT",
        }
    }
}

/// Lifecycle of a match engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchState {
    /// Created or stopped, simulation not running
    Lobby,
    /// Pre-match countdown; the loop runs but nothing moves
    Countdown,
    /// Simulation loop active
    Playing,
    /// Winning score reached (terminal until reset)
    Ended,
}

/// Immutable per-match configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameConfig {
    pub canvas_width: f32,
    pub canvas_height: f32,
    pub paddle_width: f32,
    pub paddle_height: f32,
    pub ball_radius: f32,
    pub winning_score: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            canvas_width: 800.0,
            canvas_height: 600.0,
            paddle_width: 10.0,
            paddle_height: 100.0,
            ball_radius: 6.0,
            winning_score: 5,
        }
    }
}

impl GameConfig {
    /// Center of the play area
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.canvas_width / 2.0, self.canvas_height / 2.0)
    }

    /// Largest legal top-left y for a paddle
    #[inline]
    pub fn max_paddle_y(&self) -> f32 {
        (self.canvas_height - self.paddle_height).max(0.0)
    }

    /// Clamp a paddle top-left y into the vertical play area
    #[inline]
    pub fn clamp_paddle_y(&self, y: f32) -> f32 {
        y.clamp(0.0, self.max_paddle_y())
    }
}

/// Score pair, left then right
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

impl Score {
    pub fn new(left: u32, right: u32) -> Self {
        Self { left, right }
    }

    pub fn get(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// Side that has reached `winning_score`, if any
    pub fn leader_at(&self, winning_score: u32) -> Option<Side> {
        if self.left >= winning_score {
            Some(Side::Left)
        } else if self.right >= winning_score {
            Some(Side::Right)
        } else {
            None
        }
    }
}

/// The ball
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ball {
    pub pos: Vec2,
    pub vel: Vec2,
    pub radius: f32,
    speed_multiplier: f32,
}

impl Ball {
    /// Centered ball with a random serve direction
    pub fn new(config: &GameConfig, rng: &mut impl Rng) -> Self {
        let mut ball = Self {
            pos: config.center(),
            vel: Vec2::ZERO,
            radius: config.ball_radius,
            speed_multiplier: 1.0,
        };
        ball.serve(rng);
        ball
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    /// Advance by one tick and bounce off the top/bottom walls
    pub fn update(&mut self, config: &GameConfig, dt: f32) {
        self.pos += self.vel * self.speed_multiplier * dt;

        if self.pos.y - self.radius < 0.0 {
            self.pos.y = self.radius;
            self.vel.y = -self.vel.y;
        } else if self.pos.y + self.radius > config.canvas_height {
            self.pos.y = config.canvas_height - self.radius;
            self.vel.y = -self.vel.y;
        }
    }

    /// Reverse horizontal direction with a small vertical nudge
    pub fn flip_x(&mut self, rng: &mut impl Rng) {
        self.vel.x = -self.vel.x;
        self.vel.y += rng.random_range(-BALL_FLIP_JITTER..BALL_FLIP_JITTER);
    }

    /// Apply the per-hit speed step, never exceeding the cap
    pub fn increase_speed(&mut self) {
        self.speed_multiplier =
            (self.speed_multiplier + BALL_SPEED_STEP).min(BALL_MAX_SPEED_MULTIPLIER);
    }

    /// Re-center after a point with fresh direction and multiplier
    pub fn reset(&mut self, config: &GameConfig, rng: &mut impl Rng) {
        self.pos = config.center();
        self.radius = config.ball_radius;
        self.speed_multiplier = 1.0;
        self.serve(rng);
    }

    fn serve(&mut self, rng: &mut impl Rng) {
        let direction = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        self.vel = Vec2::new(
            BALL_INITIAL_SPEED * direction,
            rng.random_range(-BALL_INITIAL_VY..BALL_INITIAL_VY),
        );
    }
}

/// Axis-aligned rectangle (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A player's paddle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paddle {
    pub side: Side,
    pub x: f32,
    /// Top edge
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Discrete drive direction (-1 up, 0 idle, +1 down)
    pub velocity: i8,
}

impl Paddle {
    /// Vertically centered paddle on its side of the court
    pub fn new(side: Side, config: &GameConfig) -> Self {
        let x = match side {
            Side::Left => PADDLE_WALL_OFFSET,
            Side::Right => config.canvas_width - PADDLE_WALL_OFFSET - config.paddle_width,
        };
        Self {
            side,
            x,
            y: config.clamp_paddle_y((config.canvas_height - config.paddle_height) / 2.0),
            width: config.paddle_width,
            height: config.paddle_height,
            velocity: 0,
        }
    }

    #[inline]
    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Integrate the discrete velocity
    pub fn update(&mut self, config: &GameConfig) {
        if self.velocity != 0 {
            self.y = config.clamp_paddle_y(self.y + f32::from(self.velocity) * PADDLE_SPEED);
        }
    }

    /// Center the paddle on an absolute y (pointer or synchronized control)
    pub fn set_position(&mut self, y: f32, config: &GameConfig) {
        self.y = config.clamp_paddle_y(y - self.height / 2.0);
    }

    /// Set drive direction; any magnitude collapses to its sign
    pub fn set_velocity(&mut self, direction: i8) {
        self.velocity = direction.signum();
    }

    /// Move at most `PADDLE_SPEED` toward centering on `target_y`
    pub fn move_to(&mut self, target_y: f32, config: &GameConfig) {
        let diff = target_y - self.center_y();
        let step = diff.clamp(-PADDLE_SPEED, PADDLE_SPEED);
        self.y = config.clamp_paddle_y(self.y + step);
    }
}
