//! Ball/paddle collision response and goal detection
//!
//! Paddle hits are resolved as angle-changing, speed-preserving bounces: the
//! vertical offset of the contact point along the paddle face selects the
//! outgoing angle, the pre-hit speed magnitude is kept.

use glam::Vec2;

use super::state::{Ball, GameConfig, Paddle, Side};
use crate::consts::MAX_BOUNCE_ANGLE;

/// Result of a paddle collision check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddleHit {
    /// Contact offset along the paddle face (-1 top edge, +1 bottom edge)
    pub offset: f32,
    /// Outgoing angle from horizontal (radians)
    pub angle: f32,
}

/// Whether the ball is travelling toward the given paddle
#[inline]
pub fn moving_toward(ball: &Ball, side: Side) -> bool {
    match side {
        Side::Left => ball.vel.x < 0.0,
        Side::Right => ball.vel.x > 0.0,
    }
}

/// Overlap test between the ball and a paddle face
///
/// Only reports contact when the ball is heading into the paddle so a ball
/// that was just deflected cannot be resolved twice.
pub fn ball_paddle_overlap(ball: &Ball, paddle: &Paddle) -> bool {
    if !moving_toward(ball, paddle.side) {
        return false;
    }
    let within_face = ball.pos.y > paddle.y && ball.pos.y < paddle.y + paddle.height;
    let reached = match paddle.side {
        Side::Left => ball.pos.x - ball.radius < paddle.x + paddle.width,
        Side::Right => ball.pos.x + ball.radius > paddle.x,
    };
    within_face && reached
}

/// Normalized contact offset, clamped to [-1, 1]
pub fn intersect_offset(ball_y: f32, paddle: &Paddle) -> f32 {
    let half = paddle.height / 2.0;
    if half <= 0.0 {
        return 0.0;
    }
    ((ball_y - paddle.center_y()) / half).clamp(-1.0, 1.0)
}

/// Outgoing velocity for a bounce off `side` at contact `offset`
///
/// The result has the same magnitude as `velocity` and an angle from
/// horizontal bounded by `MAX_BOUNCE_ANGLE`.
pub fn bounce_velocity(velocity: Vec2, offset: f32, side: Side) -> Vec2 {
    let angle = offset.clamp(-1.0, 1.0) * MAX_BOUNCE_ANGLE;
    let speed = velocity.length();
    let direction = match side {
        Side::Left => 1.0,
        Side::Right => -1.0,
    };
    Vec2::new(direction * speed * angle.cos(), speed * angle.sin())
}

/// Resolve a ball/paddle collision in place
///
/// On contact the ball is deflected, placed flush against the paddle face and
/// sped up by one step.
pub fn resolve_paddle_collision(ball: &mut Ball, paddle: &Paddle) -> Option<PaddleHit> {
    if !ball_paddle_overlap(ball, paddle) {
        return None;
    }

    let offset = intersect_offset(ball.pos.y, paddle);
    ball.vel = bounce_velocity(ball.vel, offset, paddle.side);
    ball.pos.x = match paddle.side {
        Side::Left => paddle.x + paddle.width + ball.radius,
        Side::Right => paddle.x - ball.radius,
    };
    ball.increase_speed();

    Some(PaddleHit {
        offset,
        angle: offset * MAX_BOUNCE_ANGLE,
    })
}

/// Side that scores when the ball has left the court, if any
///
/// Crossing the left edge scores for the right player and vice versa.
pub fn check_goal(ball: &Ball, config: &GameConfig) -> Option<Side> {
    if ball.pos.x - ball.radius < 0.0 {
        Some(Side::Right)
    } else if ball.pos.x + ball.radius > config.canvas_width {
        Some(Side::Left)
    } else {
        None
    }
}
