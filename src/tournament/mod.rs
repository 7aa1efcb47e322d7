//! Tournament layer
//!
//! - `round_robin`: circle-method pairings with a filler bot
//! - `bracket`: matches, lobby status and the tournament state machine
//! - `standings`: win tables
//! - `local`: single-device tournament
//! - `online`: store-backed lobby orchestration

pub mod bracket;
pub mod local;
pub mod online;
pub mod round_robin;
pub mod standings;

pub use bracket::{BracketState, LobbyStatus, Match, TournamentEvent, TournamentPhase, round_is_complete, transition};
pub use local::LocalTournament;
pub use online::{
    Assignment, LobbyPlayer, LobbyView, Tournament, generate_lobby_id, lobby_path, validate_lobby_id,
    validate_player_name,
};
pub use round_robin::{Entrant, generate_round, match_id, pad_entrants, total_rounds};
pub use standings::{Standing, champion, standings};
