//! Imperfect AI opponent
//!
//! The controller "thinks" only once per reaction window. While the ball is
//! inbound it samples a noisy target and commits to it until the next think,
//! which gives human-like latency and imprecision instead of perfect tracking.
//! Reaction time degrades with fatigue during long rallies.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::collision::moving_toward;
use super::state::{Ball, GameConfig, Paddle};

/// Tunable AI constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiTuning {
    /// Reaction window with no fatigue (ms)
    pub base_reaction_ms: f32,
    /// Fatigue ceiling (ms added to the reaction window)
    pub max_fatigue_ms: f32,
    /// Fatigue gained per canonical frame while the ball is inbound
    pub fatigue_growth_per_frame: f32,
    /// Fatigue recovered per think while the ball is departing
    pub fatigue_recovery_per_think: f32,
    /// Target noise is uniform in [-aim_error/2, aim_error/2)
    pub aim_error: f32,
    /// Distance from the court center that counts as "recentered"
    pub recenter_tolerance: f32,
}

impl Default for AiTuning {
    fn default() -> Self {
        Self {
            base_reaction_ms: 200.0,
            max_fatigue_ms: 100.0,
            fatigue_growth_per_frame: 0.05,
            fatigue_recovery_per_think: 0.5,
            aim_error: 30.0,
            recenter_tolerance: 10.0,
        }
    }
}

/// AI controller driving one paddle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiController {
    tuning: AiTuning,
    fatigue: f32,
    last_think_ms: f32,
    target_y: Option<f32>,
    /// Ball position at the previous update, used to spot a re-serve
    last_ball_x: Option<f32>,
}

impl AiController {
    pub fn new(tuning: AiTuning) -> Self {
        Self {
            tuning,
            fatigue: 0.0,
            last_think_ms: 0.0,
            target_y: None,
            last_ball_x: None,
        }
    }

    /// Current reaction window (ms)
    pub fn reaction_ms(&self) -> f32 {
        self.tuning.base_reaction_ms + self.fatigue
    }

    pub fn fatigue(&self) -> f32 {
        self.fatigue
    }

    pub fn target_y(&self) -> Option<f32> {
        self.target_y
    }

    /// Advance the controller by `dt` canonical frames at simulated time `now_ms`
    pub fn update(
        &mut self,
        paddle: &mut Paddle,
        ball: &Ball,
        config: &GameConfig,
        dt: f32,
        now_ms: f32,
        rng: &mut impl Rng,
    ) {
        let inbound = moving_toward(ball, paddle.side);
        let center_x = config.canvas_width / 2.0;
        let near_center = (ball.pos.x - center_x).abs() < self.tuning.recenter_tolerance;
        // A jump back to the center means the ball was re-served after a point
        let reserved = near_center
            && self
                .last_ball_x
                .is_some_and(|x| (x - center_x).abs() > self.tuning.recenter_tolerance * 4.0);
        self.last_ball_x = Some(ball.pos.x);

        if reserved {
            self.fatigue = 0.0;
        } else if inbound {
            self.fatigue =
                (self.fatigue + self.tuning.fatigue_growth_per_frame * dt).min(self.tuning.max_fatigue_ms);
        }

        if now_ms - self.last_think_ms > self.reaction_ms() {
            self.last_think_ms = now_ms;

            if inbound {
                let half = self.tuning.aim_error / 2.0;
                let error = if half > 0.0 { rng.random_range(-half..half) } else { 0.0 };
                self.target_y = Some(ball.pos.y + error);
            } else {
                self.fatigue = (self.fatigue - self.tuning.fatigue_recovery_per_think).max(0.0);
            }
        }

        if let Some(target) = self.target_y {
            paddle.move_to(target, config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FRAME_MS;
    use crate::sim::state::Side;
    use glam::Vec2;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn setup() -> (GameConfig, Ball, Paddle, Pcg32) {
        let config = GameConfig::default();
        let mut rng = Pcg32::seed_from_u64(42);
        let ball = Ball::new(&config, &mut rng);
        let paddle = Paddle::new(Side::Right, &config);
        (config, ball, paddle, rng)
    }

    #[test]
    fn test_waits_for_reaction_window() {
        let (config, mut ball, mut paddle, mut rng) = setup();
        let mut ai = AiController::new(AiTuning::default());
        ball.pos = Vec2::new(600.0, 100.0);
        ball.vel = Vec2::new(6.0, 0.0);

        ai.update(&mut paddle, &ball, &config, 1.0, 50.0, &mut rng);
        assert!(ai.target_y().is_none());

        ai.update(&mut paddle, &ball, &config, 1.0, 250.0, &mut rng);
        let target = ai.target_y().expect("should have reacted");
        assert!((target - 100.0).abs() <= 15.0);
    }

    #[test]
    fn test_tracks_toward_target() {
        let (config, mut ball, mut paddle, mut rng) = setup();
        let mut ai = AiController::new(AiTuning::default());
        ball.pos = Vec2::new(600.0, 50.0);
        ball.vel = Vec2::new(6.0, 0.0);
        let start = paddle.y;

        let mut now = 0.0;
        for _ in 0..60 {
            now += FRAME_MS;
            ai.update(&mut paddle, &ball, &config, 1.0, now, &mut rng);
        }
        assert!(paddle.y < start);
        assert!(paddle.y >= 0.0);
    }

    #[test]
    fn test_ignores_departing_ball() {
        let (config, mut ball, mut paddle, mut rng) = setup();
        let mut ai = AiController::new(AiTuning::default());
        ball.pos = Vec2::new(600.0, 50.0);
        ball.vel = Vec2::new(-6.0, 0.0);
        let start = paddle.y;

        ai.update(&mut paddle, &ball, &config, 1.0, 500.0, &mut rng);
        assert!(ai.target_y().is_none());
        assert_eq!(paddle.y, start);
    }

    #[test]
    fn test_fatigue_grows_bounded_and_recovers() {
        let (config, mut ball, mut paddle, mut rng) = setup();
        let tuning = AiTuning::default();
        let mut ai = AiController::new(tuning);
        ball.pos = Vec2::new(600.0, 300.0);
        ball.vel = Vec2::new(6.0, 0.0);

        let mut now = 0.0;
        for _ in 0..10_000 {
            now += FRAME_MS;
            ai.update(&mut paddle, &ball, &config, 1.0, now, &mut rng);
        }
        assert_eq!(ai.fatigue(), tuning.max_fatigue_ms);
        assert_eq!(ai.reaction_ms(), tuning.base_reaction_ms + tuning.max_fatigue_ms);

        // Ball departs: fatigue decays on each think
        ball.vel = Vec2::new(-6.0, 0.0);
        for _ in 0..120 {
            now += FRAME_MS;
            ai.update(&mut paddle, &ball, &config, 1.0, now, &mut rng);
        }
        assert!(ai.fatigue() < tuning.max_fatigue_ms);

        // Ball re-served at the center: fatigue resets
        ball.pos = config.center();
        ai.update(&mut paddle, &ball, &config, 1.0, now + FRAME_MS, &mut rng);
        assert_eq!(ai.fatigue(), 0.0);
    }
}
