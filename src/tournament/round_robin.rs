//! Round-robin pairing (circle method)
//!
//! The first entrant stays fixed while the others rotate one seat per round.
//! Seat `i` plays seat `n - 1 - i`. Over `n - 1` rounds every pair of the
//! `n` (padded) entrants meets exactly once.

use super::bracket::Match;
use crate::consts::BOT_NAME;

/// A seat in the rotation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entrant {
    Player(String),
    /// Filler for odd-sized groups
    Bot,
}

impl Entrant {
    pub fn name(&self) -> &str {
        match self {
            Entrant::Player(name) => name,
            Entrant::Bot => BOT_NAME,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Entrant::Bot)
    }
}

/// Entrants in seat order, padded with the bot to an even count
pub fn pad_entrants(names: &[String]) -> Vec<Entrant> {
    let mut entrants: Vec<Entrant> = names.iter().cloned().map(Entrant::Player).collect();
    if entrants.len() % 2 == 1 {
        entrants.push(Entrant::Bot);
    }
    entrants
}

/// Rounds in a full cycle for `player_count` registrants
pub fn total_rounds(player_count: usize) -> usize {
    if player_count < 2 {
        return 0;
    }
    let padded = player_count + player_count % 2;
    padded - 1
}

/// Stable id of the `index`-th match of `round`
pub fn match_id(round: usize, index: usize) -> String {
    format!("round_{round}_match_{index}")
}

/// Pairings of round `round` (taken modulo the cycle length)
pub fn generate_round(names: &[String], round: usize) -> Vec<Match> {
    let entrants = pad_entrants(names);
    let n = entrants.len();
    if n < 2 {
        return Vec::new();
    }

    let rest = n - 1;
    let seats: Vec<&Entrant> = std::iter::once(&entrants[0])
        .chain((0..rest).map(|j| &entrants[1 + (j + round) % rest]))
        .collect();

    (0..n / 2)
        .map(|i| {
            let (mut p1, mut p2) = (seats[i], seats[n - 1 - i]);
            // The bot always takes the right paddle
            if p1.is_bot() {
                std::mem::swap(&mut p1, &mut p2);
            }
            Match::new(match_id(round, i), p1.name(), p2.name(), p2.is_bot())
        })
        .collect()
}
