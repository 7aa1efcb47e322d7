//! Match engine
//!
//! Owns the entities of one match, runs the frame-driven simulation loop and
//! reports score and match-end events to its observers.
//!
//! Per-tick order is fixed: ball, input-driven paddles, AI, collisions,
//! scoring. Observers only ever see the state left by a completed tick.

use std::sync::mpsc;
use std::time::Instant;

use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::ai::{AiController, AiTuning};
use super::collision::{check_goal, resolve_paddle_collision};
use super::state::{Ball, GameConfig, MatchState, Paddle, Rect, Score, Side};
use crate::consts::{FRAME_MS, MAX_FRAME_DT};

/// Notifications emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// Score changed (including the reset to 0-0)
    Score(Score),
    /// Winning score reached; fired at most once per match
    MatchEnded { winner: Side },
}

/// Read-only view of the court, taken between ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    pub state: MatchState,
    pub canvas_width: f32,
    pub canvas_height: f32,
    pub ball_pos: glam::Vec2,
    pub ball_vel: glam::Vec2,
    pub ball_radius: f32,
    pub left_paddle: Rect,
    pub right_paddle: Rect,
    pub score: Score,
    /// Whole seconds left before play begins
    pub countdown: Option<u32>,
}

/// Drawable surface supplied by the presentation layer
pub trait Surface {
    fn present(&mut self, view: &FrameView);
}

#[inline]
fn slot(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

/// Simulation of a single match
pub struct MatchEngine {
    config: GameConfig,
    ball: Ball,
    left: Paddle,
    right: Paddle,
    ai: [Option<AiController>; 2],
    ai_tuning: AiTuning,
    state: MatchState,
    score: Score,
    rng: Pcg32,
    observers: Vec<mpsc::Sender<MatchEvent>>,
    surface: Option<Box<dyn Surface>>,
    /// Time of the previous frame; `None` while the loop is not running
    last_frame: Option<Instant>,
    /// Simulated time in ms (drives AI reaction windows)
    sim_time_ms: f32,
    /// Whether this engine runs ball physics and scoring
    ball_authority: bool,
    end_notified: bool,
    /// Simulated ms left in the pre-match countdown
    countdown_ms: f32,
}

impl MatchEngine {
    /// Engine with a randomly seeded RNG
    pub fn new(config: GameConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Engine with a fixed seed (reproducible serves, AI noise)
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        Self {
            config,
            ball: Ball::new(&config, &mut rng),
            left: Paddle::new(Side::Left, &config),
            right: Paddle::new(Side::Right, &config),
            ai: [None, None],
            ai_tuning: AiTuning::default(),
            state: MatchState::Lobby,
            score: Score::default(),
            rng,
            observers: Vec::new(),
            surface: None,
            last_frame: None,
            sim_time_ms: 0.0,
            ball_authority: true,
            end_notified: false,
            countdown_ms: 0.0,
        }
    }

    /// Override the tuning used by AI controllers enabled afterwards
    pub fn set_ai_tuning(&mut self, tuning: AiTuning) {
        self.ai_tuning = tuning;
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    /// Mutable ball access for replica interpolation
    pub fn ball_mut(&mut self) -> &mut Ball {
        &mut self.ball
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn is_ai(&self, side: Side) -> bool {
        self.ai[slot(side)].is_some()
    }

    /// Whether the frame loop is armed
    pub fn is_running(&self) -> bool {
        matches!(self.state, MatchState::Playing | MatchState::Countdown) && self.last_frame.is_some()
    }

    /// Whole seconds left in the countdown, if one is running
    pub fn countdown_remaining(&self) -> Option<u32> {
        (self.state == MatchState::Countdown).then(|| (self.countdown_ms / 1000.0).ceil().max(1.0) as u32)
    }

    pub fn has_ball_authority(&self) -> bool {
        self.ball_authority
    }

    /// Turn ball physics and scoring on (authoritative) or off (replica)
    pub fn set_ball_authority(&mut self, authoritative: bool) {
        self.ball_authority = authoritative;
    }

    /// Register an observer for score and match-end events
    pub fn subscribe(&mut self) -> mpsc::Receiver<MatchEvent> {
        let (tx, rx) = mpsc::channel();
        self.observers.push(tx);
        rx
    }

    fn emit(&mut self, event: MatchEvent) {
        // Drop observers whose receiver is gone
        self.observers.retain(|tx| tx.send(event).is_ok());
    }

    /// Acquire a drawing surface and draw the current court once
    pub fn attach_canvas(&mut self, surface: Box<dyn Surface>) {
        self.surface = Some(surface);
        self.draw();
    }

    /// Release the drawing surface; always stops the loop
    pub fn detach_canvas(&mut self) -> Option<Box<dyn Surface>> {
        self.stop();
        self.surface.take()
    }

    /// Hand a paddle to an AI controller for the rest of the match
    pub fn enable_ai(&mut self, side: Side) {
        log::info!("AI enabled on {} paddle", side.as_str());
        self.paddle_mut(side).velocity = 0;
        self.ai[slot(side)] = Some(AiController::new(self.ai_tuning));
    }

    /// Begin (or resume) play; a finished match is reset first
    ///
    /// Cuts a running countdown short.
    pub fn start(&mut self) {
        match self.state {
            MatchState::Playing => return,
            MatchState::Ended => self.reset(),
            MatchState::Lobby => {
                // The first frame anchors the clock
                self.last_frame = None;
            }
            MatchState::Countdown => {}
        }
        log::info!("Match started");
        self.state = MatchState::Playing;
        self.countdown_ms = 0.0;
    }

    /// Count down `secs` seconds of simulated time, then start
    ///
    /// Ticks spent counting down move nothing. Zero starts immediately.
    pub fn start_countdown(&mut self, secs: u32) {
        if secs == 0 {
            self.start();
            return;
        }
        match self.state {
            MatchState::Playing | MatchState::Countdown => return,
            MatchState::Ended => self.reset(),
            MatchState::Lobby => {}
        }
        log::info!("Match starts in {}s", secs);
        self.state = MatchState::Countdown;
        self.countdown_ms = secs as f32 * 1000.0;
        self.last_frame = None;
        self.draw();
    }

    /// Return to the lobby and cancel the loop; scores and positions are kept
    pub fn stop(&mut self) {
        if self.state == MatchState::Playing {
            log::debug!("Match loop stopped");
        }
        self.state = MatchState::Lobby;
        self.last_frame = None;
    }

    /// Zero the scores, re-center the ball and return to the lobby
    pub fn reset(&mut self) {
        self.score = Score::default();
        self.ball.reset(&self.config, &mut self.rng);
        self.state = MatchState::Lobby;
        self.last_frame = None;
        self.end_notified = false;
        self.emit(MatchEvent::Score(self.score));
        self.draw();
    }

    /// Keyboard-style input; ignored for AI-driven paddles
    pub fn set_paddle_velocity(&mut self, side: Side, direction: i8) {
        if self.is_ai(side) {
            return;
        }
        self.paddle_mut(side).set_velocity(direction);
    }

    /// Pointer or network input (paddle center y); ignored for AI-driven paddles
    pub fn set_paddle_position(&mut self, side: Side, y: f32) {
        if self.is_ai(side) {
            return;
        }
        let config = self.config;
        self.paddle_mut(side).set_position(y, &config);
    }

    /// Adopt an authoritative score received from the host
    ///
    /// Ends the match locally when a side has reached the winning score, so
    /// the match-end notification fires on replicas too.
    pub fn adopt_score(&mut self, score: Score) {
        if score == self.score {
            return;
        }
        self.score = score;
        self.emit(MatchEvent::Score(score));
        if let Some(winner) = score.leader_at(self.config.winning_score) {
            self.end(winner);
        }
    }

    /// Loop body: measure the frame delta against `now`, tick and draw
    ///
    /// Returns true if a tick was simulated.
    pub fn frame(&mut self, now: Instant) -> bool {
        if !matches!(self.state, MatchState::Playing | MatchState::Countdown) {
            return false;
        }
        let Some(last) = self.last_frame.replace(now) else {
            self.draw();
            return false;
        };
        let elapsed_ms = now.saturating_duration_since(last).as_secs_f32() * 1000.0;
        let dt = (elapsed_ms / FRAME_MS).min(MAX_FRAME_DT);
        self.step(dt);
        self.draw();
        true
    }

    /// Advance one tick of `dt` canonical frames
    pub fn step(&mut self, dt: f32) {
        if self.state == MatchState::Countdown {
            self.countdown_ms -= dt * FRAME_MS;
            // Tolerate float drift on the last frame
            if self.countdown_ms <= 0.5 {
                self.start();
            }
            return;
        }
        if self.state != MatchState::Playing {
            return;
        }
        self.sim_time_ms += dt * FRAME_MS;

        if self.ball_authority {
            self.ball.update(&self.config, dt);
        }

        if self.ai[0].is_none() {
            self.left.update(&self.config);
        }
        if self.ai[1].is_none() {
            self.right.update(&self.config);
        }

        if let Some(ai) = self.ai[0].as_mut() {
            ai.update(&mut self.left, &self.ball, &self.config, dt, self.sim_time_ms, &mut self.rng);
        }
        if let Some(ai) = self.ai[1].as_mut() {
            ai.update(&mut self.right, &self.ball, &self.config, dt, self.sim_time_ms, &mut self.rng);
        }

        if !self.ball_authority {
            return;
        }

        for paddle in [&self.left, &self.right] {
            if let Some(hit) = resolve_paddle_collision(&mut self.ball, paddle) {
                log::trace!("{} paddle hit, offset {:.2}", paddle.side.as_str(), hit.offset);
            }
        }

        if let Some(scorer) = check_goal(&self.ball, &self.config) {
            self.handle_score(scorer);
        }
    }

    fn handle_score(&mut self, scorer: Side) {
        match scorer {
            Side::Left => self.score.left += 1,
            Side::Right => self.score.right += 1,
        }
        log::debug!("Point {}: {}-{}", scorer.as_str(), self.score.left, self.score.right);
        self.emit(MatchEvent::Score(self.score));

        if self.score.leader_at(self.config.winning_score).is_some() {
            self.end(scorer);
        } else {
            self.ball.reset(&self.config, &mut self.rng);
        }
    }

    fn end(&mut self, winner: Side) {
        self.state = MatchState::Ended;
        self.last_frame = None;
        if !self.end_notified {
            self.end_notified = true;
            log::info!("Match ended, {} wins {}-{}", winner.as_str(), self.score.left, self.score.right);
            self.emit(MatchEvent::MatchEnded { winner });
        }
    }

    /// Snapshot of the court for rendering or publishing
    pub fn frame_view(&self) -> FrameView {
        FrameView {
            state: self.state,
            canvas_width: self.config.canvas_width,
            canvas_height: self.config.canvas_height,
            ball_pos: self.ball.pos,
            ball_vel: self.ball.vel,
            ball_radius: self.ball.radius,
            left_paddle: self.left.rect(),
            right_paddle: self.right.rect(),
            score: self.score,
            countdown: self.countdown_remaining(),
        }
    }

    fn draw(&mut self) {
        let view = self.frame_view();
        if let Some(surface) = self.surface.as_mut() {
            surface.present(&view);
        }
    }
}

/// Run a match headlessly until it ends or `max_ticks` elapse
///
/// Returns the winner, if any.
pub fn run_to_completion(engine: &mut MatchEngine, max_ticks: u32) -> Option<Side> {
    let events = engine.subscribe();
    engine.start();
    for _ in 0..max_ticks {
        engine.step(1.0);
        if engine.state() != MatchState::Playing {
            break;
        }
    }
    events.try_iter().find_map(|event| match event {
        MatchEvent::MatchEnded { winner } => Some(winner),
        MatchEvent::Score(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn engine() -> MatchEngine {
        MatchEngine::with_seed(GameConfig::default(), 1234)
    }

    /// Put the ball one tick away from leaving past the left edge
    fn aim_past_left(engine: &mut MatchEngine) {
        let ball = engine.ball_mut();
        ball.pos = Vec2::new(8.0, 20.0);
        ball.vel = Vec2::new(-6.0, 0.0);
    }

    struct Recorder(Rc<RefCell<Vec<FrameView>>>);

    impl Surface for Recorder {
        fn present(&mut self, view: &FrameView) {
            self.0.borrow_mut().push(*view);
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut engine = engine();
        assert_eq!(engine.state(), MatchState::Lobby);
        engine.start();
        assert_eq!(engine.state(), MatchState::Playing);
        engine.start();
        assert_eq!(engine.state(), MatchState::Playing);
        engine.stop();
        assert_eq!(engine.state(), MatchState::Lobby);
    }

    #[test]
    fn test_countdown_delays_play() {
        let mut engine = engine();
        engine.enable_ai(Side::Left);
        let events = engine.subscribe();
        let ball = engine.ball().pos;
        let paddle = engine.paddle(Side::Left).y;

        engine.start_countdown(2);
        assert_eq!(engine.state(), MatchState::Countdown);
        assert_eq!(engine.countdown_remaining(), Some(2));
        engine.step(1.0);
        assert_eq!(engine.frame_view().countdown, Some(2));

        for _ in 0..60 {
            engine.step(1.0);
        }
        assert_eq!(engine.countdown_remaining(), Some(1));
        for _ in 0..59 {
            engine.step(1.0);
        }
        assert_eq!(engine.state(), MatchState::Playing);
        assert_eq!(engine.countdown_remaining(), None);
        assert_eq!(engine.ball().pos, ball);
        assert_eq!(engine.paddle(Side::Left).y, paddle);
        assert_eq!(events.try_iter().count(), 0);

        engine.step(1.0);
        assert_ne!(engine.ball().pos, ball);
    }

    #[test]
    fn test_countdown_can_be_skipped() {
        let mut immediate = engine();
        immediate.start_countdown(0);
        assert_eq!(immediate.state(), MatchState::Playing);

        let mut cut_short = engine();
        cut_short.start_countdown(3);
        cut_short.start();
        assert_eq!(cut_short.state(), MatchState::Playing);
        cut_short.stop();
        assert_eq!(cut_short.countdown_remaining(), None);
    }

    #[test]
    fn test_step_is_noop_outside_play() {
        let mut engine = engine();
        let before = engine.ball().pos;
        engine.step(1.0);
        assert_eq!(engine.ball().pos, before);
    }

    #[test]
    fn test_scoring_increments_by_one() {
        let mut engine = engine();
        let events = engine.subscribe();
        engine.start();
        aim_past_left(&mut engine);
        engine.step(1.0);

        assert_eq!(engine.score(), Score::new(0, 1));
        assert_eq!(engine.ball().pos, engine.config().center());
        assert_eq!(events.try_recv(), Ok(MatchEvent::Score(Score::new(0, 1))));
        assert_eq!(engine.state(), MatchState::Playing);
    }

    #[test]
    fn test_match_end_fires_once() {
        let mut engine = engine();
        let events = engine.subscribe();
        engine.start();
        for _ in 0..5 {
            aim_past_left(&mut engine);
            engine.step(1.0);
        }
        assert_eq!(engine.state(), MatchState::Ended);
        assert_eq!(engine.score(), Score::new(0, 5));

        // Further ticks and replayed scores do nothing
        engine.step(1.0);
        engine.adopt_score(Score::new(0, 6));

        let ends: Vec<_> = events
            .try_iter()
            .filter(|e| matches!(e, MatchEvent::MatchEnded { .. }))
            .collect();
        assert_eq!(ends, vec![MatchEvent::MatchEnded { winner: Side::Right }]);
    }

    #[test]
    fn test_reset_notifies_zero_score() {
        let mut engine = engine();
        let events = engine.subscribe();
        engine.start();
        aim_past_left(&mut engine);
        engine.step(1.0);
        engine.reset();

        assert_eq!(engine.state(), MatchState::Lobby);
        assert_eq!(engine.score(), Score::default());
        assert_eq!(events.try_iter().last(), Some(MatchEvent::Score(Score::default())));
    }

    #[test]
    fn test_restart_after_end_resets() {
        let mut engine = engine();
        engine.start();
        engine.adopt_score(Score::new(5, 2));
        assert_eq!(engine.state(), MatchState::Ended);
        engine.start();
        assert_eq!(engine.state(), MatchState::Playing);
        assert_eq!(engine.score(), Score::default());
    }

    #[test]
    fn test_ai_side_ignores_external_input() {
        let mut engine = engine();
        engine.enable_ai(Side::Right);
        let before = engine.paddle(Side::Right).y;
        engine.set_paddle_position(Side::Right, 0.0);
        engine.set_paddle_velocity(Side::Right, 1);
        assert_eq!(engine.paddle(Side::Right).y, before);
        assert_eq!(engine.paddle(Side::Right).velocity, 0);

        engine.set_paddle_position(Side::Left, 0.0);
        assert_eq!(engine.paddle(Side::Left).y, 0.0);
    }

    #[test]
    fn test_velocity_input_moves_paddle() {
        let mut engine = engine();
        engine.start();
        engine.set_paddle_velocity(Side::Left, -1);
        let before = engine.paddle(Side::Left).y;
        engine.step(1.0);
        assert!(engine.paddle(Side::Left).y < before);
    }

    #[test]
    fn test_replica_skips_ball_physics() {
        let mut engine = engine();
        engine.set_ball_authority(false);
        engine.start();
        aim_past_left(&mut engine);
        let before = engine.ball().pos;
        for _ in 0..10 {
            engine.step(1.0);
        }
        assert_eq!(engine.ball().pos, before);
        assert_eq!(engine.score(), Score::default());
    }

    #[test]
    fn test_frame_uses_monotonic_delta() {
        let mut engine = engine();
        engine.start();
        let t0 = Instant::now();
        assert!(!engine.frame(t0));
        let before = engine.ball().pos;
        let vel = engine.ball().vel;
        assert!(engine.frame(t0 + Duration::from_micros(33_333)));
        let moved = engine.ball().pos - before;
        assert!((moved.x - vel.x * 2.0).abs() < 0.05);
    }

    #[test]
    fn test_detach_stops_loop_and_returns_surface() {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let mut engine = engine();
        engine.attach_canvas(Box::new(Recorder(frames.clone())));
        assert_eq!(frames.borrow().len(), 1);

        engine.start();
        let t0 = Instant::now();
        engine.frame(t0);
        engine.frame(t0 + Duration::from_millis(16));
        assert!(engine.is_running());

        assert!(engine.detach_canvas().is_some());
        assert!(!engine.is_running());
        assert_eq!(engine.state(), MatchState::Lobby);
        let drawn = frames.borrow().len();
        assert!(!engine.frame(t0 + Duration::from_millis(32)));
        assert_eq!(frames.borrow().len(), drawn);
    }

    #[test]
    fn test_ai_match_runs_to_completion() {
        let mut engine = engine();
        engine.enable_ai(Side::Left);
        engine.enable_ai(Side::Right);
        let winner = run_to_completion(&mut engine, 200_000);
        assert!(winner.is_some());
        assert_eq!(engine.state(), MatchState::Ended);
        let score = engine.score();
        assert_eq!(score.get(winner.unwrap()), engine.config().winning_score);
    }
}
