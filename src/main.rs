//! Pong Tournament entry point
//!
//! Headless demo: runs a round-robin tournament with AI on every paddle and
//! prints the standings. With `--online` the same tournament is played by
//! several simulated participants sharing an in-memory store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use pong_tournament::consts::FRAME_MS;
use pong_tournament::leaderboard::{Leaderboard, run_aggregation};
use pong_tournament::net::{MemoryStore, Store, SyncRole};
use pong_tournament::sim::{MatchEvent, MatchState, Side};
use pong_tournament::tournament::{
    Assignment, LocalTournament, Match, Standing, Tournament, TournamentPhase, generate_lobby_id,
};
use pong_tournament::{Settings, TournamentError};

/// Ticks before an online demo match is abandoned
const MAX_MATCH_TICKS: u32 = 500_000;

/// Headless round-robin pong tournament
#[derive(Parser, Debug)]
#[command(name = "pong-tournament")]
#[command(about = "Run a round-robin pong tournament with AI paddles", long_about = None)]
struct Cli {
    /// Play through the shared store with host/guest sync
    #[arg(long)]
    online: bool,

    /// Comma-separated player names, in registration order
    #[arg(long, value_delimiter = ',', default_value = "Alice,Bob,Cara")]
    players: Vec<String>,

    /// Seed for match engines and the lobby id
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Settings JSON file
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn print_standings(standings: &[Standing]) {
    println!("\nFinal standings");
    for (rank, entry) in standings.iter().enumerate() {
        println!("{:>2}. {:<16} {}", rank + 1, entry.name, entry.wins);
    }
}

fn run_local(options: &Cli, settings: &Settings) -> Result<(), TournamentError> {
    let mut tournament = LocalTournament::with_config(options.players.clone(), settings.game)?;
    tournament.set_ai_tuning(settings.ai);
    let standings = tournament.play_out_with_ai(options.seed)?;
    print_standings(&standings);
    if let Some(champion) = tournament.champion() {
        println!("\nChampion: {champion}");
    }
    Ok(())
}

/// Play one online match between two participants until the host's engine ends
fn play_online_match(
    host: &Tournament,
    guest: Option<&Tournament>,
    entry: &Match,
    settings: &Settings,
) -> Side {
    let mut host_engine = host.create_engine(entry, Side::Left, settings.game);
    host_engine.set_ai_tuning(settings.ai);
    host_engine.enable_ai(Side::Left);
    let mut host_sync = host.open_sync(
        entry,
        SyncRole::Host {
            mirror_right_paddle: entry.vs_bot,
        },
        settings.sync,
    );

    let mut guest_side = guest.map(|g| {
        let mut engine = g.create_engine(entry, Side::Right, settings.game);
        engine.set_ai_tuning(settings.ai);
        engine.enable_ai(Side::Right);
        let sync = g.open_sync(entry, SyncRole::Guest, settings.sync);
        sync.configure_engine(&mut engine);
        (engine, sync)
    });

    let host_events = host_engine.subscribe();
    host_engine.start_countdown(settings.countdown_secs);
    if let Some((engine, _)) = guest_side.as_mut() {
        engine.start_countdown(settings.countdown_secs);
    }

    let frame = Duration::from_secs_f32(FRAME_MS / 1000.0);
    let mut now = Instant::now();
    for _ in 0..MAX_MATCH_TICKS {
        now += frame;
        host_engine.step(1.0);
        host_sync.poll(&mut host_engine);
        host_sync.publish(&host_engine, now);

        if let Some((engine, sync)) = guest_side.as_mut() {
            engine.step(1.0);
            sync.poll(engine);
            sync.publish(engine, now);
        }

        if host_engine.state() == MatchState::Ended {
            break;
        }
    }

    // Let the guest see the final score
    if let Some((engine, sync)) = guest_side.as_mut() {
        host_sync.publish(&host_engine, now + frame * 10);
        sync.poll(engine);
        log::debug!("Guest engine finished in {:?}", engine.state());
    }

    host_events
        .try_iter()
        .find_map(|event| match event {
            MatchEvent::MatchEnded { winner } => Some(winner),
            MatchEvent::Score(_) => None,
        })
        .unwrap_or_else(|| {
            let score = host_engine.score();
            if score.right > score.left { Side::Right } else { Side::Left }
        })
}

fn run_online(options: &Cli, settings: &Settings) -> Result<(), TournamentError> {
    let store = MemoryStore::new();
    let mut rng = Pcg32::seed_from_u64(options.seed);
    let lobby_id = generate_lobby_id(&mut rng);
    println!("Lobby {lobby_id}");

    let Some((host_name, guests)) = options.players.split_first() else {
        return Err(TournamentError::NotEnoughPlayers { count: 0 });
    };
    let mut participants = vec![Tournament::create(Arc::new(store.connect()), &lobby_id, host_name)?];
    for name in guests {
        participants.push(Tournament::join(Arc::new(store.connect()), &lobby_id, name)?);
    }
    participants[0].start()?;

    while participants[0].phase() != TournamentPhase::Complete {
        for p in participants.iter_mut() {
            p.poll();
        }

        // Every match is driven from its left player's assignment
        let assignments: Vec<Assignment> = participants.iter().map(Tournament::my_assignment).collect();
        for (host_idx, assignment) in assignments.iter().enumerate() {
            let Assignment::Play {
                entry,
                side: Side::Left,
                ..
            } = assignment
            else {
                continue;
            };
            let guest_idx = participants.iter().position(|p| p.player_name() == entry.p2);

            let winner = play_online_match(
                &participants[host_idx],
                guest_idx.map(|i| &participants[i]),
                entry,
                settings,
            );
            println!("{} vs {}: {} wins", entry.p1, entry.p2, entry.player(winner));

            if let Some(idx) = guest_idx {
                participants[idx].report_result(&entry.id, winner)?;
            }
            participants[host_idx].report_result(&entry.id, winner)?;
        }

        for p in participants.iter_mut() {
            p.poll();
        }
        let phase = participants[0].advance_round()?;
        log::info!("Lobby {} now {:?}", lobby_id, phase);
    }

    for p in participants.iter_mut() {
        p.poll();
    }
    print_standings(&participants[0].standings());
    if let Some(winner) = &participants[0].view().winner {
        println!("\nChampion: {winner}");
    }

    let admin = store.connect();
    let report = run_aggregation(&admin)?;
    log::info!("Aggregation credited {:?}", report.wins_added);
    let board = Leaderboard::load(&admin)?;
    println!("\nLeaderboard");
    for entry in board.top(10) {
        println!("  {:<16} {}", entry.name, entry.wins);
    }
    drop(participants);
    log::debug!("Remaining store root: {:?}", admin.get("lobbies")?);
    Ok(())
}

fn main() {
    env_logger::init();
    log::info!("Pong Tournament starting...");

    let options = Cli::parse();
    let settings = match &options.settings {
        Some(path) => Settings::load(path),
        None => Settings::default(),
    };

    let result = if options.online {
        run_online(&options, &settings)
    } else {
        run_local(&options, &settings)
    };
    if let Err(err) = result {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["pong-tournament"]).unwrap();
        assert!(!cli.online);
        assert_eq!(cli.players, vec!["Alice", "Bob", "Cara"]);
        assert_eq!(cli.seed, 42);
        assert_eq!(cli.settings, None);
    }

    #[test]
    fn test_cli_players_and_seed() {
        let cli =
            Cli::try_parse_from(["pong-tournament", "--online", "--players", "Ann,Ben", "--seed", "7"]).unwrap();
        assert!(cli.online);
        assert_eq!(cli.players, vec!["Ann", "Ben"]);
        assert_eq!(cli.seed, 7);
    }

    #[test]
    fn test_cli_rejects_bad_values() {
        assert!(Cli::try_parse_from(["pong-tournament", "--seed", "abc"]).is_err());
        assert!(Cli::try_parse_from(["pong-tournament", "--players"]).is_err());
        assert!(Cli::try_parse_from(["pong-tournament", "--bogus"]).is_err());
    }
}
