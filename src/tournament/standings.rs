//! Final standings

use serde::{Deserialize, Serialize};

use super::bracket::Match;
use crate::consts::BOT_NAME;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub name: String,
    pub wins: u32,
}

/// Wins per name, most first
///
/// Ties keep the order in which names first won; entrants without a win
/// follow in registration order. The bot is listed only if it won.
pub fn standings<'a>(matches: impl IntoIterator<Item = &'a Match>, entrants: &[String]) -> Vec<Standing> {
    let mut table: Vec<Standing> = Vec::new();
    for winner in matches.into_iter().filter_map(|m| m.winner.as_deref()) {
        if winner.is_empty() {
            continue;
        }
        match table.iter_mut().find(|s| s.name == winner) {
            Some(entry) => entry.wins += 1,
            None => table.push(Standing {
                name: winner.to_string(),
                wins: 1,
            }),
        }
    }
    for name in entrants {
        if !table.iter().any(|s| &s.name == name) {
            table.push(Standing {
                name: name.clone(),
                wins: 0,
            });
        }
    }
    // Stable: equal counts keep their insertion order
    table.sort_by(|a, b| b.wins.cmp(&a.wins));
    table
}

/// Highest-ranked entrant other than the bot
pub fn champion(table: &[Standing]) -> Option<String> {
    table.iter().find(|s| s.name != BOT_NAME).map(|s| s.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn won(id: &str, p1: &str, p2: &str, winner: &str) -> Match {
        let mut m = Match::new(id, p1, p2, p2 == BOT_NAME);
        m.winner = Some(winner.to_string());
        m
    }

    #[test]
    fn test_sorted_by_wins() {
        let matches = vec![
            won("a", "A", "B", "B"),
            won("b", "C", BOT_NAME, "C"),
            won("c", "A", "C", "C"),
            won("d", "B", BOT_NAME, "B"),
            won("e", "A", BOT_NAME, BOT_NAME),
        ];
        let entrants = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let table = standings(&matches, &entrants);
        let order: Vec<(&str, u32)> = table.iter().map(|s| (s.name.as_str(), s.wins)).collect();
        // B and C tie; B won first
        assert_eq!(order, vec![("B", 2), ("C", 2), (BOT_NAME, 1), ("A", 0)]);
        assert_eq!(champion(&table).as_deref(), Some("B"));
    }

    #[test]
    fn test_unfinished_matches_ignored() {
        let matches = vec![Match::new("a", "A", "B", false)];
        let table = standings(&matches, &["A".to_string(), "B".to_string()]);
        assert!(table.iter().all(|s| s.wins == 0));
        assert_eq!(table[0].name, "A");
    }

    #[test]
    fn test_champion_skips_bot() {
        let table = vec![
            Standing { name: BOT_NAME.into(), wins: 3 },
            Standing { name: "Dee".into(), wins: 1 },
        ];
        assert_eq!(champion(&table).as_deref(), Some("Dee"));
        assert_eq!(champion(&[]), None);
    }
}
