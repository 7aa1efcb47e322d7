//! Published match state
//!
//! Wire shape of `lobbies/{lobby}/matches/{match}/gamestate`. Every field is
//! optional: hosts and guests merge-update disjoint parts, and readers keep
//! their last known value for anything absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sim::{MatchEngine, Score, Side};

/// Ball position and velocity (canonical px, px/frame)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Partial match state as stored; paddle values are top-left y
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameStateSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ball: Option<BallSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paddle_left: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paddle_right: Option<f32>,
}

impl GameStateSnapshot {
    /// Parse a stored value leniently
    ///
    /// Malformed fields are dropped one by one rather than discarding the
    /// whole snapshot.
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        let field = |key: &str| map.get(key).cloned().unwrap_or(Value::Null);
        Self {
            ball: serde_json::from_value(field("ball")).ok(),
            score: serde_json::from_value(field("score")).ok(),
            paddle_left: field("paddleLeft").as_f64().map(|v| v as f32),
            paddle_right: field("paddleRight").as_f64().map(|v| v as f32),
        }
    }

    /// Host-side snapshot of an engine; the right paddle is optional
    pub fn host_view(engine: &MatchEngine, include_right_paddle: bool) -> Self {
        let ball = engine.ball();
        Self {
            ball: Some(BallSnapshot {
                x: ball.pos.x,
                y: ball.pos.y,
                vx: ball.vel.x,
                vy: ball.vel.y,
            }),
            score: Some(engine.score()),
            paddle_left: Some(engine.paddle(Side::Left).y),
            paddle_right: include_right_paddle.then(|| engine.paddle(Side::Right).y),
        }
    }

    /// Top-left y published for `side`
    pub fn paddle(&self, side: Side) -> Option<f32> {
        match side {
            Side::Left => self.paddle_left,
            Side::Right => self.paddle_right,
        }
    }

    /// Overlay the fields present in `newer`, keeping the rest
    pub fn merge(&mut self, newer: &GameStateSnapshot) {
        if newer.ball.is_some() {
            self.ball = newer.ball;
        }
        if newer.score.is_some() {
            self.score = newer.score;
        }
        if newer.paddle_left.is_some() {
            self.paddle_left = newer.paddle_left;
        }
        if newer.paddle_right.is_some() {
            self.paddle_right = newer.paddle_right;
        }
    }

    /// Fields for a merge-update of the gamestate node
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
