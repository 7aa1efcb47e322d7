//! Bracket entries and the tournament state machine
//!
//! [`BracketState`] is the store-free core shared by the local driver and the
//! online orchestrator: it owns the current round, the archived rounds and the
//! phase, and every phase change goes through [`transition`].

use serde::{Deserialize, Serialize};

use super::round_robin::{generate_round, total_rounds};
use super::standings::{Standing, champion, standings};
use crate::error::TournamentError;
use crate::sim::Side;

/// One pairing within a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub p1: String,
    pub p2: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    /// `p2` is the filler bot; set when the round is generated
    #[serde(default)]
    pub vs_bot: bool,
}

impl Match {
    pub fn new(id: impl Into<String>, p1: impl Into<String>, p2: impl Into<String>, vs_bot: bool) -> Self {
        Self {
            id: id.into(),
            p1: p1.into(),
            p2: p2.into(),
            winner: None,
            vs_bot,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.winner.as_deref().is_some_and(|w| !w.is_empty())
    }

    pub fn involves(&self, name: &str) -> bool {
        self.p1 == name || self.p2 == name
    }

    /// Paddle `name` plays on: `p1` is left, `p2` is right
    pub fn side_of(&self, name: &str) -> Option<Side> {
        if self.p1 == name {
            Some(Side::Left)
        } else if self.p2 == name {
            Some(Side::Right)
        } else {
            None
        }
    }

    pub fn player(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.p1,
            Side::Right => &self.p2,
        }
    }
}

/// Lobby status as stored under `lobbies/{id}/status`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LobbyStatus {
    #[default]
    Lobby,
    Started,
    Complete,
}

/// Tournament phase: lobby status plus the round-complete flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TournamentPhase {
    #[default]
    Lobby,
    InRound,
    RoundComplete,
    Complete,
}

impl TournamentPhase {
    pub fn from_status(status: LobbyStatus, round_complete: bool) -> Self {
        match status {
            LobbyStatus::Lobby => TournamentPhase::Lobby,
            LobbyStatus::Started if round_complete => TournamentPhase::RoundComplete,
            LobbyStatus::Started => TournamentPhase::InRound,
            LobbyStatus::Complete => TournamentPhase::Complete,
        }
    }

    pub fn status(&self) -> LobbyStatus {
        match self {
            TournamentPhase::Lobby => LobbyStatus::Lobby,
            TournamentPhase::InRound | TournamentPhase::RoundComplete => LobbyStatus::Started,
            TournamentPhase::Complete => LobbyStatus::Complete,
        }
    }

    pub fn round_complete(&self) -> bool {
        matches!(self, TournamentPhase::RoundComplete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentPhase::Lobby => "in lobby",
            TournamentPhase::InRound => "in round",
            TournamentPhase::RoundComplete => "round complete",
            TournamentPhase::Complete => "complete",
        }
    }
}

/// Inputs to the tournament state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TournamentEvent {
    /// Host starts the tournament
    Start,
    /// Every match of the current round has a winner
    AllResultsIn,
    /// Host moves on; `final_round` when no round follows
    Advance { final_round: bool },
}

impl TournamentEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentEvent::Start => "start",
            TournamentEvent::AllResultsIn => "all results in",
            TournamentEvent::Advance { .. } => "advance",
        }
    }
}

/// The one transition table of the tournament
pub fn transition(phase: TournamentPhase, event: TournamentEvent) -> Result<TournamentPhase, TournamentError> {
    use TournamentEvent as E;
    use TournamentPhase as P;

    match (phase, event) {
        (P::Lobby, E::Start) => Ok(P::InRound),
        (P::InRound, E::AllResultsIn) => Ok(P::RoundComplete),
        (P::RoundComplete, E::AllResultsIn) => Ok(P::RoundComplete),
        (P::RoundComplete, E::Advance { final_round: false }) => Ok(P::InRound),
        (P::RoundComplete, E::Advance { final_round: true }) => Ok(P::Complete),
        _ => Err(TournamentError::InvalidTransition {
            phase: phase.as_str(),
            event: event.as_str(),
        }),
    }
}

/// Whether every match of a round has a recorded winner
pub fn round_is_complete(matches: &[Match]) -> bool {
    !matches.is_empty() && matches.iter().all(Match::is_finished)
}

/// Store-free tournament progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BracketState {
    /// Entrants in registration order
    pub player_names: Vec<String>,
    pub current_round: usize,
    pub total_rounds: usize,
    /// Matches of the current round
    pub matches: Vec<Match>,
    /// Finished rounds, oldest first
    pub history: Vec<Vec<Match>>,
    pub phase: TournamentPhase,
}

impl BracketState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate round 0 for `names`
    pub fn start(&mut self, names: Vec<String>) -> Result<(), TournamentError> {
        if names.len() < 2 {
            return Err(TournamentError::NotEnoughPlayers { count: names.len() });
        }
        let next = transition(self.phase, TournamentEvent::Start)?;
        self.total_rounds = total_rounds(names.len());
        self.current_round = 0;
        self.matches = generate_round(&names, 0);
        self.history.clear();
        self.player_names = names;
        self.phase = next;
        log::info!(
            "Tournament started: {} players, {} rounds",
            self.player_names.len(),
            self.total_rounds
        );
        Ok(())
    }

    pub fn find(&self, match_id: &str) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == match_id)
    }

    pub fn find_index(&self, match_id: &str) -> Option<usize> {
        self.matches.iter().position(|m| m.id == match_id)
    }

    /// Record the winner of a current-round match
    ///
    /// A match keeps its first recorded winner; returns true only when this
    /// call set it. Moves the phase to round-complete once all results are in.
    pub fn record_winner(&mut self, match_id: &str, winner: &str) -> Result<bool, TournamentError> {
        if self.phase != TournamentPhase::InRound && self.phase != TournamentPhase::RoundComplete {
            return Err(TournamentError::InvalidTransition {
                phase: self.phase.as_str(),
                event: "record result",
            });
        }
        let index = self
            .find_index(match_id)
            .ok_or_else(|| TournamentError::UnknownMatch(match_id.to_string()))?;
        let entry = &mut self.matches[index];
        if !entry.involves(winner) {
            return Err(TournamentError::NotInMatch {
                player: winner.to_string(),
                match_id: match_id.to_string(),
            });
        }
        if entry.is_finished() {
            return Ok(false);
        }
        entry.winner = Some(winner.to_string());
        log::debug!("{} won {}", winner, match_id);

        if self.is_round_complete() {
            self.phase = transition(self.phase, TournamentEvent::AllResultsIn)?;
        }
        Ok(true)
    }

    pub fn is_round_complete(&self) -> bool {
        round_is_complete(&self.matches)
    }

    pub fn is_final_round(&self) -> bool {
        self.current_round + 1 >= self.total_rounds
    }

    /// Archive the finished round and generate the next one (or finish)
    pub fn advance(&mut self) -> Result<TournamentPhase, TournamentError> {
        let final_round = self.is_final_round();
        self.phase = transition(self.phase, TournamentEvent::Advance { final_round })?;
        self.history.push(std::mem::take(&mut self.matches));

        if final_round {
            log::info!("Tournament complete after {} rounds", self.history.len());
        } else {
            self.current_round += 1;
            self.matches = generate_round(&self.player_names, self.current_round);
            log::info!("Round {} of {} begins", self.current_round + 1, self.total_rounds);
        }
        Ok(self.phase)
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TournamentPhase::Complete
    }

    /// Archived rounds followed by the current one
    pub fn all_matches(&self) -> impl Iterator<Item = &Match> {
        self.history.iter().flatten().chain(self.matches.iter())
    }

    pub fn standings(&self) -> Vec<Standing> {
        standings(self.all_matches(), &self.player_names)
    }

    /// Top-ranked human entrant
    pub fn champion(&self) -> Option<String> {
        champion(&self.standings())
    }
}
