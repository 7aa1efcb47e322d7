//! Online tournament orchestration over the shared store
//!
//! Every participant keeps a [`LobbyView`] cache of `lobbies/{id}` fed by
//! per-field subscriptions (the busy `matches` subtree is never watched).
//! Writes follow a single-writer rule per field:
//!
//! - each participant owns its own `players/{key}` entry
//! - the `p1` of a match owns `bracket/{i}/winner`
//! - the host owns everything else (`status`, `bracket`, rounds, `history`)

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::bracket::{BracketState, LobbyStatus, Match, TournamentEvent, TournamentPhase, round_is_complete, transition};
use super::standings::Standing;
use crate::consts::BOT_NAME;
use crate::error::TournamentError;
use crate::net::{MatchSync, SpectatorView, Store, Subscription, SyncConfig, SyncRole, join_path, validate_path};
use crate::now_epoch_ms;
use crate::sim::{GameConfig, MatchEngine, Side};

/// Lobby fields watched by every participant
const LOBBY_FIELDS: [&str; 9] = [
    "status",
    "players",
    "bracket",
    "currentRound",
    "totalRounds",
    "roundComplete",
    "playerNames",
    "history",
    "winner",
];

const MAX_LOBBY_ID_LEN: usize = 32;
const MAX_PLAYER_NAME_LEN: usize = 32;
const LOBBY_ID_LEN: usize = 6;
const LOBBY_ID_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Check a lobby code before it reaches the store
pub fn validate_lobby_id(lobby_id: &str) -> Result<String, TournamentError> {
    let id = lobby_id.trim();
    let valid = !id.is_empty()
        && id.len() <= MAX_LOBBY_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(TournamentError::InvalidLobbyId(lobby_id.to_string()));
    }
    Ok(id.to_string())
}

/// Check and trim a display name; names double as leaderboard keys
pub fn validate_player_name(name: &str) -> Result<String, TournamentError> {
    let trimmed = name.trim();
    let invalid = trimmed.is_empty()
        || trimmed.chars().count() > MAX_PLAYER_NAME_LEN
        || trimmed == BOT_NAME
        || trimmed.contains('/')
        || trimmed.chars().any(char::is_control)
        || validate_path(trimmed).is_err();
    if invalid {
        return Err(TournamentError::InvalidPlayerName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Random six-character lobby code
pub fn generate_lobby_id(rng: &mut impl Rng) -> String {
    (0..LOBBY_ID_LEN)
        .map(|_| LOBBY_ID_CHARS[rng.random_range(0..LOBBY_ID_CHARS.len())] as char)
        .collect()
}

pub fn lobby_path(lobby_id: &str) -> String {
    format!("lobbies/{lobby_id}")
}

/// Registration entry under `players/{key}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub name: String,
    #[serde(default)]
    pub joined_at: u64,
}

/// Local cache of one lobby
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LobbyView {
    /// Whether a status has ever been seen
    pub exists: bool,
    pub status: LobbyStatus,
    /// Registered players in join order
    pub players: Vec<LobbyPlayer>,
    pub bracket: Vec<Match>,
    pub current_round: usize,
    pub total_rounds: usize,
    pub round_complete: bool,
    pub player_names: Vec<String>,
    pub history: Vec<Vec<Match>>,
    pub winner: Option<String>,
}

fn parse_or<T: serde::de::DeserializeOwned + Default>(field: &str, value: Option<&Value>, current: T) -> T {
    let Some(value) = value else {
        return T::default();
    };
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::debug!("Ignoring malformed lobby field {}: {}", field, err);
            current
        }
    }
}

impl LobbyView {
    /// Build from a whole `lobbies/{id}` value
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut view = Self::default();
        for field in LOBBY_FIELDS {
            view.apply_field(field, value.and_then(|v| v.get(field)));
        }
        view
    }

    /// Replace one cached field; `None` means the field was removed
    pub fn apply_field(&mut self, field: &str, value: Option<&Value>) {
        match field {
            "status" => {
                self.exists = value.is_some();
                self.status = parse_or(field, value, self.status);
            }
            "players" => {
                let mut entries: Vec<(String, LobbyPlayer)> = value
                    .and_then(Value::as_object)
                    .map(|map| {
                        map.iter()
                            .filter_map(|(key, v)| {
                                serde_json::from_value(v.clone()).ok().map(|p| (key.clone(), p))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                // Push keys sort chronologically
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                self.players = entries.into_iter().map(|(_, p)| p).collect();
            }
            "bracket" => self.bracket = parse_or(field, value, std::mem::take(&mut self.bracket)),
            "currentRound" => self.current_round = parse_or(field, value, self.current_round),
            "totalRounds" => self.total_rounds = parse_or(field, value, self.total_rounds),
            "roundComplete" => self.round_complete = parse_or(field, value, self.round_complete),
            "playerNames" => {
                self.player_names = parse_or(field, value, std::mem::take(&mut self.player_names))
            }
            "history" => self.history = parse_or(field, value, std::mem::take(&mut self.history)),
            "winner" => self.winner = value.and_then(Value::as_str).map(str::to_string),
            other => log::trace!("Unwatched lobby field {}", other),
        }
    }

    pub fn phase(&self) -> TournamentPhase {
        TournamentPhase::from_status(self.status, self.round_complete)
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.players.iter().map(|p| p.name.clone()).collect()
    }

    /// Cached state as a bracket machine
    ///
    /// A round whose results are all in counts as complete even before the
    /// flag has been written.
    pub fn bracket_state(&self) -> BracketState {
        let mut phase = self.phase();
        if phase == TournamentPhase::InRound && round_is_complete(&self.bracket) {
            phase = TournamentPhase::RoundComplete;
        }
        BracketState {
            player_names: self.player_names.clone(),
            current_round: self.current_round,
            total_rounds: self.total_rounds,
            matches: self.bracket.clone(),
            history: self.history.clone(),
            phase,
        }
    }

    pub fn standings(&self) -> Vec<Standing> {
        self.bracket_state().standings()
    }
}

/// What the local participant should be doing right now
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Play `entry` on `side` with the given sync role
    Play { entry: Match, side: Side, role: SyncRole },
    /// Own match done (or none); watch this one meanwhile
    Spectate(Match),
    /// Nothing to play or watch yet
    Waiting,
    /// Tournament complete
    Finished,
}

/// One participant's handle on an online lobby
pub struct Tournament {
    store: Arc<dyn Store>,
    lobby_id: String,
    player_name: String,
    is_host: bool,
    player_key: Option<String>,
    subscriptions: Vec<(&'static str, Subscription)>,
    view: LobbyView,
    /// Highest round in which this participant's match is known finished
    completed_round: Option<usize>,
}

impl Tournament {
    /// Open a new lobby as its host
    pub fn create(store: Arc<dyn Store>, lobby_id: &str, player_name: &str) -> Result<Self, TournamentError> {
        let lobby_id = validate_lobby_id(lobby_id)?;
        let player_name = validate_player_name(player_name)?;
        let root = lobby_path(&lobby_id);

        // Claim the id atomically; a live lobby is never reset
        let mut claimed = false;
        store.transaction(&join_path(&root, "status"), &mut |current| {
            claimed = current.is_none();
            claimed.then(|| json!(LobbyStatus::Lobby))
        })?;
        if !claimed {
            return Err(TournamentError::LobbyExists(lobby_id));
        }
        // An abrupt host loss tears the whole lobby down
        store.on_disconnect_remove(&root)?;
        log::info!("Lobby {} created by {}", lobby_id, player_name);

        Self::enter(store, lobby_id, player_name, true)
    }

    /// Join an existing lobby
    pub fn join(store: Arc<dyn Store>, lobby_id: &str, player_name: &str) -> Result<Self, TournamentError> {
        let lobby_id = validate_lobby_id(lobby_id)?;
        let player_name = validate_player_name(player_name)?;
        let status_path = join_path(&lobby_path(&lobby_id), "status");
        if store.get(&status_path)?.is_none() {
            return Err(TournamentError::LobbyNotFound(lobby_id));
        }
        Self::enter(store, lobby_id, player_name, false)
    }

    fn enter(
        store: Arc<dyn Store>,
        lobby_id: String,
        player_name: String,
        is_host: bool,
    ) -> Result<Self, TournamentError> {
        let root = lobby_path(&lobby_id);
        let entry = LobbyPlayer {
            name: player_name.clone(),
            joined_at: now_epoch_ms(),
        };
        let players = join_path(&root, "players");
        let key = store.push(&players, json!(entry))?;
        store.on_disconnect_remove(&join_path(&players, &key))?;

        let subscriptions = LOBBY_FIELDS
            .iter()
            .map(|field| (*field, store.subscribe(&join_path(&root, field))))
            .collect();

        let mut tournament = Self {
            store,
            lobby_id,
            player_name,
            is_host,
            player_key: Some(key),
            subscriptions,
            view: LobbyView::default(),
            completed_round: None,
        };
        tournament.poll();
        log::info!("{} joined lobby {}", tournament.player_name, tournament.lobby_id);
        Ok(tournament)
    }

    pub fn lobby_id(&self) -> &str {
        &self.lobby_id
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn view(&self) -> &LobbyView {
        &self.view
    }

    pub fn phase(&self) -> TournamentPhase {
        self.view.phase()
    }

    fn root(&self) -> String {
        lobby_path(&self.lobby_id)
    }

    /// Drain lobby changes into the cache
    ///
    /// The host also flags the round complete once every result is in.
    /// Returns true if anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        for (field, subscription) in &self.subscriptions {
            if let Some(value) = subscription.latest() {
                self.view.apply_field(field, value.as_ref());
                changed = true;
            }
        }
        if self.is_host {
            self.flag_round_complete();
        }
        changed
    }

    fn flag_round_complete(&mut self) {
        if self.view.phase() != TournamentPhase::InRound || !round_is_complete(&self.view.bracket) {
            return;
        }
        if transition(self.view.phase(), TournamentEvent::AllResultsIn).is_err() {
            return;
        }
        match self.store.set(&join_path(&self.root(), "roundComplete"), Value::Bool(true)) {
            Ok(()) => {
                log::info!("Round {} complete in lobby {}", self.view.current_round + 1, self.lobby_id);
                self.view.round_complete = true;
            }
            Err(err) => log::warn!("Could not flag round complete: {}", err),
        }
    }

    /// Host: freeze the player list and publish round 0
    pub fn start(&mut self) -> Result<(), TournamentError> {
        if !self.is_host {
            return Err(TournamentError::NotHost {
                action: "start the tournament",
            });
        }
        self.poll();
        let names = self.view.registered_names();
        if let Some(dup) = names.iter().enumerate().find_map(|(i, n)| names[..i].contains(n).then_some(n)) {
            return Err(TournamentError::DuplicatePlayerName(dup.clone()));
        }

        let mut state = BracketState::new();
        state.phase = self.view.phase();
        state.start(names)?;

        let mut fields = Map::new();
        fields.insert("bracket".into(), json!(state.matches));
        fields.insert("currentRound".into(), json!(state.current_round));
        fields.insert("totalRounds".into(), json!(state.total_rounds));
        fields.insert("playerNames".into(), json!(state.player_names));
        fields.insert("roundComplete".into(), json!(false));
        fields.insert("history".into(), Value::Null);
        fields.insert("status".into(), json!(LobbyStatus::Started));
        self.store.update(&self.root(), fields)?;

        self.absorb(&state);
        self.completed_round = None;
        Ok(())
    }

    fn absorb(&mut self, state: &BracketState) {
        self.view.status = state.phase.status();
        self.view.round_complete = state.phase.round_complete();
        self.view.bracket = state.matches.clone();
        self.view.current_round = state.current_round;
        self.view.total_rounds = state.total_rounds;
        self.view.player_names = state.player_names.clone();
        self.view.history = state.history.clone();
    }

    /// What to do now, derived from the cache and the completed-round watermark
    pub fn my_assignment(&self) -> Assignment {
        match self.view.phase() {
            TournamentPhase::Complete => return Assignment::Finished,
            TournamentPhase::Lobby => return Assignment::Waiting,
            TournamentPhase::InRound | TournamentPhase::RoundComplete => {}
        }

        let round_done = self.completed_round.is_some_and(|r| r >= self.view.current_round);
        if !round_done {
            let mine = self
                .view
                .bracket
                .iter()
                .find(|m| !m.is_finished() && m.involves(&self.player_name));
            if let Some(entry) = mine {
                if let Some(side) = entry.side_of(&self.player_name) {
                    let role = match side {
                        Side::Left => SyncRole::Host {
                            mirror_right_paddle: entry.vs_bot,
                        },
                        Side::Right => SyncRole::Guest,
                    };
                    return Assignment::Play {
                        entry: entry.clone(),
                        side,
                        role,
                    };
                }
            }
        }

        self.view
            .bracket
            .iter()
            .find(|m| !m.is_finished() && !m.involves(&self.player_name))
            .cloned()
            .map_or(Assignment::Waiting, Assignment::Spectate)
    }

    /// Engine for a match this participant plays
    pub fn create_engine(&self, entry: &Match, side: Side, config: GameConfig) -> MatchEngine {
        let mut engine = MatchEngine::new(config);
        match side {
            Side::Left if entry.vs_bot => engine.enable_ai(Side::Right),
            Side::Left => {}
            Side::Right => engine.set_ball_authority(false),
        }
        engine
    }

    /// Sync session for a match this participant plays
    pub fn open_sync(&self, entry: &Match, role: SyncRole, config: SyncConfig) -> MatchSync {
        MatchSync::new(self.store.clone(), &self.lobby_id, &entry.id, role, config)
    }

    /// Read-only view of another match
    pub fn spectate(&self, entry: &Match, config: GameConfig) -> SpectatorView {
        SpectatorView::new(self.store.clone(), &self.lobby_id, &entry.id, config)
    }

    /// Report the end of this participant's match
    ///
    /// Both sides mark the round done locally; only `p1` writes the winner.
    pub fn report_result(&mut self, match_id: &str, winner: Side) -> Result<(), TournamentError> {
        let index = self
            .view
            .bracket
            .iter()
            .position(|m| m.id == match_id)
            .ok_or_else(|| TournamentError::UnknownMatch(match_id.to_string()))?;
        let entry = &self.view.bracket[index];
        let my_side = entry.side_of(&self.player_name).ok_or_else(|| TournamentError::NotInMatch {
            player: self.player_name.clone(),
            match_id: match_id.to_string(),
        })?;
        let winner_name = entry.player(winner).to_string();

        let round = self.view.current_round;
        self.completed_round = Some(self.completed_round.map_or(round, |r| r.max(round)));

        if my_side == Side::Left && !entry.is_finished() {
            let mut fields = Map::new();
            fields.insert(format!("bracket/{index}/winner"), Value::String(winner_name.clone()));
            self.store.update(&self.root(), fields)?;
            self.view.bracket[index].winner = Some(winner_name.clone());
            log::info!("{}: {} wins", match_id, winner_name);
        }

        if self.is_host {
            self.flag_round_complete();
        }
        Ok(())
    }

    /// Host: archive the finished round, then publish the next or finish
    pub fn advance_round(&mut self) -> Result<TournamentPhase, TournamentError> {
        if !self.is_host {
            return Err(TournamentError::NotHost {
                action: "advance the round",
            });
        }
        self.poll();
        let mut state = self.view.bracket_state();
        let phase = state.advance()?;

        let mut fields = Map::new();
        fields.insert("history".into(), json!(state.history));
        fields.insert("roundComplete".into(), json!(false));
        fields.insert("matches".into(), Value::Null);
        if phase == TournamentPhase::Complete {
            let champion = state.champion();
            log::info!("Lobby {} complete, champion {:?}", self.lobby_id, champion);
            fields.insert("bracket".into(), Value::Null);
            fields.insert("status".into(), json!(LobbyStatus::Complete));
            fields.insert("winner".into(), champion.clone().map_or(Value::Null, Value::String));
            self.view.winner = champion;
        } else {
            fields.insert("bracket".into(), json!(state.matches));
            fields.insert("currentRound".into(), json!(state.current_round));
        }
        self.store.update(&self.root(), fields)?;

        self.absorb(&state);
        Ok(phase)
    }

    pub fn standings(&self) -> Vec<Standing> {
        self.view.standings()
    }

    /// Graceful exit: unsubscribe and remove the registration
    pub fn leave(&mut self) -> Result<(), TournamentError> {
        for (_, subscription) in self.subscriptions.drain(..) {
            self.store.unsubscribe(subscription.id());
        }
        if let Some(key) = self.player_key.take() {
            let path = join_path(&join_path(&self.root(), "players"), &key);
            self.store.cancel_on_disconnect(&path)?;
            self.store.remove(&path)?;
            log::info!("{} left lobby {}", self.player_name, self.lobby_id);
        }
        Ok(())
    }
}

impl Drop for Tournament {
    fn drop(&mut self) {
        if let Err(err) = self.leave() {
            log::warn!("Leaving lobby {} failed: {}", self.lobby_id, err);
        }
    }
}
