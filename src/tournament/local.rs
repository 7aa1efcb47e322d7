//! Offline tournament on a single device

use super::bracket::{BracketState, Match, TournamentPhase};
use super::online::validate_player_name;
use super::standings::Standing;
use crate::error::TournamentError;
use crate::sim::{AiTuning, GameConfig, MatchEngine, Side, run_to_completion};

/// Ticks after which a headless match is abandoned
const MAX_MATCH_TICKS: u32 = 2_000_000;

/// Round-robin tournament where all players share one screen
pub struct LocalTournament {
    bracket: BracketState,
    config: GameConfig,
    ai_tuning: AiTuning,
}

impl LocalTournament {
    pub fn new(names: Vec<String>) -> Result<Self, TournamentError> {
        Self::with_config(names, GameConfig::default())
    }

    pub fn with_config(names: Vec<String>, config: GameConfig) -> Result<Self, TournamentError> {
        let mut cleaned = Vec::with_capacity(names.len());
        for name in names {
            cleaned.push(validate_player_name(&name)?);
        }
        let mut bracket = BracketState::new();
        bracket.start(cleaned)?;
        Ok(Self {
            bracket,
            config,
            ai_tuning: AiTuning::default(),
        })
    }

    pub fn set_ai_tuning(&mut self, tuning: AiTuning) {
        self.ai_tuning = tuning;
    }

    pub fn bracket(&self) -> &BracketState {
        &self.bracket
    }

    pub fn phase(&self) -> TournamentPhase {
        self.bracket.phase
    }

    /// First match of the current round without a winner
    pub fn next_match(&self) -> Option<&Match> {
        self.bracket.matches.iter().find(|m| !m.is_finished())
    }

    /// Engine for `entry`; bot matches get an AI on the right paddle
    pub fn create_engine(&self, entry: &Match, seed: Option<u64>) -> MatchEngine {
        let mut engine = match seed {
            Some(seed) => MatchEngine::with_seed(self.config, seed),
            None => MatchEngine::new(self.config),
        };
        engine.set_ai_tuning(self.ai_tuning);
        if entry.vs_bot {
            engine.enable_ai(Side::Right);
        }
        engine
    }

    /// Record the side that won `match_id`
    pub fn record_result(&mut self, match_id: &str, winner: Side) -> Result<String, TournamentError> {
        let name = self
            .bracket
            .find(match_id)
            .map(|m| m.player(winner).to_string())
            .ok_or_else(|| TournamentError::UnknownMatch(match_id.to_string()))?;
        self.bracket.record_winner(match_id, &name)?;
        Ok(name)
    }

    pub fn advance_round(&mut self) -> Result<TournamentPhase, TournamentError> {
        self.bracket.advance()
    }

    pub fn is_complete(&self) -> bool {
        self.bracket.is_complete()
    }

    pub fn standings(&self) -> Vec<Standing> {
        self.bracket.standings()
    }

    pub fn champion(&self) -> Option<String> {
        self.bracket.champion()
    }

    /// Play every remaining match with AI on both paddles
    ///
    /// Seeds are derived from `seed` so a run is reproducible.
    pub fn play_out_with_ai(&mut self, seed: u64) -> Result<Vec<Standing>, TournamentError> {
        let mut game = 0u64;
        while !self.is_complete() {
            while let Some(entry) = self.next_match().cloned() {
                let mut engine = self.create_engine(&entry, Some(seed.wrapping_add(game)));
                game += 1;
                engine.enable_ai(Side::Left);
                if !entry.vs_bot {
                    engine.enable_ai(Side::Right);
                }
                match run_to_completion(&mut engine, MAX_MATCH_TICKS) {
                    Some(side) => {
                        let name = self.record_result(&entry.id, side)?;
                        log::info!(
                            "{} vs {}: {} wins {}-{}",
                            entry.p1,
                            entry.p2,
                            name,
                            engine.score().left,
                            engine.score().right
                        );
                    }
                    None => {
                        // Rally never ended; award the match to the leader
                        let score = engine.score();
                        let side = if score.right > score.left { Side::Right } else { Side::Left };
                        log::warn!("{} abandoned, awarding {}", entry.id, side.as_str());
                        self.record_result(&entry.id, side)?;
                    }
                }
            }
            self.advance_round()?;
        }
        Ok(self.standings())
    }
}
