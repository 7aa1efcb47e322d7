//! Error types for the store capability and the tournament entry points

use thiserror::Error;

/// Failures reported by a [`crate::net::Store`] implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable")]
    Unavailable,

    #[error("invalid path: {path}")]
    InvalidPath { path: String },

    #[error("transaction on {path} aborted after {attempts} attempts")]
    TransactionAborted { path: String, attempts: u32 },
}

impl StoreError {
    /// Whether retrying the same operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            StoreError::Unavailable => true,
            StoreError::TransactionAborted { .. } => true,
            StoreError::InvalidPath { .. } => false,
        }
    }
}

/// Failures at the tournament entry points
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TournamentError {
    #[error("invalid lobby id: {0:?}")]
    InvalidLobbyId(String),

    #[error("invalid player name: {0:?}")]
    InvalidPlayerName(String),

    #[error("lobby {0} does not exist")]
    LobbyNotFound(String),

    #[error("lobby {0} already exists")]
    LobbyExists(String),

    #[error("player name {0:?} is registered more than once")]
    DuplicatePlayerName(String),

    #[error("need at least 2 players, have {count}")]
    NotEnoughPlayers { count: usize },

    #[error("only the host can {action}")]
    NotHost { action: &'static str },

    #[error("cannot apply {event} while {phase}")]
    InvalidTransition {
        phase: &'static str,
        event: &'static str,
    },

    #[error("unknown match: {0}")]
    UnknownMatch(String),

    #[error("player {player} is not in match {match_id}")]
    NotInMatch { player: String, match_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(StoreError::Unavailable.is_recoverable());
        assert!(
            StoreError::TransactionAborted {
                path: "leaderboard".into(),
                attempts: 32,
            }
            .is_recoverable()
        );
        assert!(!StoreError::InvalidPath { path: "a.b".into() }.is_recoverable());

        let err: TournamentError = StoreError::Unavailable.into();
        assert_eq!(err, TournamentError::Store(StoreError::Unavailable));
        assert_eq!(TournamentError::LobbyExists("L1".into()).to_string(), "lobby L1 already exists");
    }
}
