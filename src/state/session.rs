//! Game session state.
//!
//! One [`Session`] per room: players in turn order, the board, the reveal
//! protocol, pause ownership and the reset vote. Every transition is a
//! method returning `Result<_, SessionError>`; the session is never left
//! half-updated by a rejected call.
//!
//! # Phases
//!
//! ```text
//!   Empty ──add──▶ Lobby ──start──▶ Active ◀──▶ Paused
//!                    ▲                │  ▲
//!                    │         2nd flip  │ finish_resolution
//!                    │                ▼  │
//!                    │             Resolving
//!                    │                │ last pair matched
//!                    │                ▼
//!                    └── start ──── Over ──execute_reset──▶ Active
//! ```

use std::collections::{BTreeSet, HashMap};

use rand::Rng;

use super::board::{self, Cell, CellId, CellValue, Theme};
use super::player::{Player, PlayerId};
use super::reset::{ResetRequest, VoteTally};
use crate::config::{ResetPolicy, SessionConfig};

/// Derived session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No players (fresh shell or everyone left)
    Empty,
    /// Players gathering, board not dealt
    Lobby,
    /// Round in progress, flips accepted from the turn holder
    Active,
    /// Round in progress, flips blocked
    Paused,
    /// Two cells revealed, waiting for resolution to complete
    Resolving,
    /// All pairs matched
    Over,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Lobby => "lobby",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Resolving => "resolving",
            Self::Over => "over",
        }
    }

    /// Check if a round is underway (active, paused or resolving).
    pub fn in_round(&self) -> bool {
        matches!(self, Self::Active | Self::Paused | Self::Resolving)
    }
}

/// Final standing of a finished round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameResult {
    Winner(PlayerId),
    /// Every player sharing the top score, in turn order.
    Tie(Vec<PlayerId>),
}

impl GameResult {
    pub fn is_tie(&self) -> bool {
        matches!(self, Self::Tie(_))
    }

    pub fn winners(&self) -> Vec<PlayerId> {
        match self {
            Self::Winner(id) => vec![id.clone()],
            Self::Tie(ids) => ids.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let winner = match self {
            Self::Winner(id) => Some(id.as_str()),
            Self::Tie(_) => None,
        };
        serde_json::json!({
            "winner": winner,
            "is_tie": self.is_tie(),
            "winners": self.winners()
        })
    }
}

/// Result of adding a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    /// The id was already in the session; only the name was refreshed.
    pub rejoined: bool,
}

/// Result of an accepted flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipOutcome {
    /// Two cells are now face-up; the caller must schedule resolution.
    pub should_resolve: bool,
}

/// Result of resolving the two revealed cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub is_match: bool,
    /// The two cells compared, in reveal order.
    pub cells: [CellId; 2],
    /// Cells to turn face-down again (mismatch only).
    pub cells_to_hide: Option<[CellId; 2]>,
    /// Player credited with the move, if still present.
    pub scorer: Option<PlayerId>,
    /// Set when this resolution matched the last pair.
    pub game_over: Option<GameResult>,
}

/// Result of removing a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player: Player,
    /// The player left while a round was underway.
    pub left_during_game: bool,
    pub turn_passed_to: Option<PlayerId>,
    /// A pending reset vote was cancelled (and the latch set).
    pub reset_cancelled: bool,
    /// No players remain.
    pub session_empty: bool,
}

/// Session errors. `Display` is the reason string shown to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    SessionNotFound,
    PlayerNotFound,
    NoPlayers,
    InvalidName,
    GameStarted,
    GameAlreadyStarted,
    PlayersNotReady,
    InvalidGridSize,
    GamePaused,
    NotYourTurn,
    TwoCellsRevealed,
    ResolutionInProgress,
    InvalidCell,
    CellAlreadyRevealed,
    CellAlreadyMatched,
    NothingToResolve,
    NotPausingPlayer,
    ResetAlreadyUsed,
    ResetAlreadyRequested,
    ResetNotPending,
    NoGameToReset,
    AlreadyVoted,
    ResetNotApproved,
}

/// Broad rejection category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Precondition,
    Authorization,
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SessionNotFound | Self::PlayerNotFound => ErrorCategory::NotFound,
            Self::NotPausingPlayer => ErrorCategory::Authorization,
            _ => ErrorCategory::Precondition,
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionNotFound => write!(f, "Game not found"),
            Self::PlayerNotFound => write!(f, "Player not found"),
            Self::NoPlayers => write!(f, "No players in this game"),
            Self::InvalidName => write!(f, "Invalid player name"),
            Self::GameStarted => write!(f, "Game already started"),
            Self::GameAlreadyStarted => write!(f, "Game already started"),
            Self::PlayersNotReady => write!(f, "Not all players are ready"),
            Self::InvalidGridSize => write!(f, "Grid size not playable with this theme"),
            Self::GamePaused => write!(f, "Game is paused"),
            Self::NotYourTurn => write!(f, "Not your turn"),
            Self::TwoCellsRevealed => write!(f, "Cannot flip more than 2 cells"),
            Self::ResolutionInProgress => write!(f, "Previous pair is still being resolved"),
            Self::InvalidCell => write!(f, "No such cell"),
            Self::CellAlreadyRevealed => write!(f, "Cell already flipped"),
            Self::CellAlreadyMatched => write!(f, "Cell already matched"),
            Self::NothingToResolve => write!(f, "No pair to resolve"),
            Self::NotPausingPlayer => write!(f, "Only the pausing player may resume"),
            Self::ResetAlreadyUsed => write!(f, "Reset already used"),
            Self::ResetAlreadyRequested => write!(f, "Reset already requested"),
            Self::ResetNotPending => write!(f, "No reset pending"),
            Self::NoGameToReset => write!(f, "No game to reset"),
            Self::AlreadyVoted => write!(f, "Already voted"),
            Self::ResetNotApproved => write!(f, "Reset not approved by all players"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Trim a display name and check its length.
pub fn validate_name(name: &str, max_len: usize) -> Result<String, SessionError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > max_len {
        return Err(SessionError::InvalidName);
    }
    Ok(name.to_string())
}

/// Authoritative state of one room.
#[derive(Debug, Clone)]
pub struct Session {
    pub room_id: String,

    /// Captured when the session is created
    pub theme: Theme,

    /// Board side; the board holds `grid_size²` cells
    pub grid_size: usize,

    /// Player ids in join order; the only source of turn order
    order: Vec<PlayerId>,

    /// Player records indexed by id
    players: HashMap<PlayerId, Player>,

    started: bool,
    over: bool,
    paused: bool,
    paused_by: Option<PlayerId>,

    /// Dealt at start/reset, shuffled
    board: Vec<Cell>,

    /// Face-up cells pending resolution, at most two
    revealed: Vec<CellId>,

    matched: BTreeSet<CellId>,

    /// Between the second reveal and `finish_resolution`
    processing: bool,

    /// Player whose second flip is awaiting resolution
    resolving_for: Option<PlayerId>,

    reset_request: Option<ResetRequest>,
    reset_used: bool,

    result: Option<GameResult>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Session {
    pub fn new(room_id: String, theme: Theme, grid_size: usize) -> Self {
        Self {
            room_id,
            theme,
            grid_size,
            order: Vec::new(),
            players: HashMap::new(),
            started: false,
            over: false,
            paused: false,
            paused_by: None,
            board: Vec::new(),
            revealed: Vec::new(),
            matched: BTreeSet::new(),
            processing: false,
            resolving_for: None,
            reset_request: None,
            reset_used: false,
            result: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    // Read access

    pub fn phase(&self) -> SessionPhase {
        if self.over {
            SessionPhase::Over
        } else if !self.started {
            if self.order.is_empty() {
                SessionPhase::Empty
            } else {
                SessionPhase::Lobby
            }
        } else if self.processing {
            SessionPhase::Resolving
        } else if self.paused {
            SessionPhase::Paused
        } else {
            SessionPhase::Active
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn paused_by(&self) -> Option<&str> {
        self.paused_by.as_deref()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn reset_used(&self) -> bool {
        self.reset_used
    }

    pub fn reset_request(&self) -> Option<&ResetRequest> {
        self.reset_request.as_ref()
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    pub fn board(&self) -> &[Cell] {
        &self.board
    }

    pub fn revealed(&self) -> &[CellId] {
        &self.revealed
    }

    pub fn matched(&self) -> &BTreeSet<CellId> {
        &self.matched
    }

    pub fn cell_value(&self, cell_id: CellId) -> Option<CellValue> {
        self.board.iter().find(|c| c.id == cell_id).map(|c| c.value)
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    /// Players in turn order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.order.iter().filter_map(|id| self.players.get(id))
    }

    pub fn player_ids_in_order(&self) -> &[PlayerId] {
        &self.order
    }

    pub fn player_count(&self) -> usize {
        self.order.len()
    }

    pub fn current_player_id(&self) -> Option<&str> {
        self.players().find(|p| p.has_turn).map(|p| p.id.as_str())
    }

    pub fn is_player_turn(&self, player_id: &str) -> bool {
        self.player(player_id).is_some_and(|p| p.has_turn)
    }

    // Turn order

    /// Next player after `player_id` in turn order, wrapping around.
    fn next_in_order(&self, player_id: &str) -> Option<PlayerId> {
        let idx = self.order.iter().position(|id| id == player_id)?;
        let next = (idx + 1) % self.order.len();
        self.order.get(next).cloned()
    }

    fn grant_turn(&mut self, player_id: &str) {
        for p in self.players.values_mut() {
            p.has_turn = p.id == player_id;
        }
    }

    fn clear_turns(&mut self) {
        for p in self.players.values_mut() {
            p.has_turn = false;
        }
    }

    /// Pass the turn from `player_id` to the next player.
    fn advance_turn_from(&mut self, player_id: &str) -> Option<PlayerId> {
        let next = self.next_in_order(player_id)?;
        self.grant_turn(&next);
        Some(next)
    }

    // Lobby

    /// Add a player, or refresh the name of one already present.
    pub fn add_player(
        &mut self,
        player_id: &str,
        name: &str,
        max_name_len: usize,
    ) -> Result<Joined, SessionError> {
        let name = validate_name(name, max_name_len)?;

        if let Some(existing) = self.players.get_mut(player_id) {
            existing.name = name;
            return Ok(Joined { rejoined: true });
        }

        if self.started && !self.over {
            return Err(SessionError::GameStarted);
        }

        self.order.push(player_id.to_string());
        self.players
            .insert(player_id.to_string(), Player::new(player_id.to_string(), name));
        Ok(Joined { rejoined: false })
    }

    pub fn rename(
        &mut self,
        player_id: &str,
        name: &str,
        max_name_len: usize,
    ) -> Result<(), SessionError> {
        let name = validate_name(name, max_name_len)?;
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(SessionError::PlayerNotFound)?;
        player.name = name;
        Ok(())
    }

    /// Flip a player's ready flag, returning the new value.
    pub fn toggle_ready(&mut self, player_id: &str) -> Result<bool, SessionError> {
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(SessionError::PlayerNotFound)?;
        player.ready = !player.ready;
        Ok(player.ready)
    }

    /// Deal a fresh board and hand the turn to the first player.
    fn begin_round<R: Rng + ?Sized>(&mut self, max_icons: usize, rng: &mut R) {
        self.board = board::generate_board(self.grid_size, &self.theme, max_icons, rng);
        self.revealed.clear();
        self.matched.clear();
        self.processing = false;
        self.resolving_for = None;
        self.paused = false;
        self.paused_by = None;
        self.over = false;
        self.result = None;
        self.started = true;
        self.started_at = Some(chrono::Utc::now());
        self.ended_at = None;

        for p in self.players.values_mut() {
            p.clear_stats();
        }
        if let Some(first) = self.order.first().cloned() {
            self.grant_turn(&first);
        }
    }

    /// Start the round. Every guest (everyone but the host at position 0)
    /// must be ready.
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        config: &SessionConfig,
        rng: &mut R,
    ) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::GameAlreadyStarted);
        }
        if self.order.is_empty() {
            return Err(SessionError::NoPlayers);
        }
        let guests_ready = self
            .order
            .iter()
            .skip(1)
            .filter_map(|id| self.players.get(id))
            .all(|p| p.ready);
        if self.order.len() > 1 && !guests_ready {
            return Err(SessionError::PlayersNotReady);
        }
        if !board::is_valid_layout(self.grid_size, &self.theme, &config.board) {
            return Err(SessionError::InvalidGridSize);
        }

        self.begin_round(config.board.max_icons, rng);
        Ok(())
    }

    // Reveal protocol

    /// Turn a cell face-up.
    pub fn flip(&mut self, player_id: &str, cell_id: CellId) -> Result<FlipOutcome, SessionError> {
        let player = self
            .players
            .get(player_id)
            .ok_or(SessionError::PlayerNotFound)?;

        if self.paused {
            return Err(SessionError::GamePaused);
        }
        if !player.has_turn {
            return Err(SessionError::NotYourTurn);
        }
        if self.revealed.len() == 2 {
            return Err(SessionError::TwoCellsRevealed);
        }
        if self.processing {
            return Err(SessionError::ResolutionInProgress);
        }
        if cell_id >= self.board.len() {
            return Err(SessionError::InvalidCell);
        }
        if self.revealed.contains(&cell_id) {
            return Err(SessionError::CellAlreadyRevealed);
        }
        if self.matched.contains(&cell_id) {
            return Err(SessionError::CellAlreadyMatched);
        }

        self.revealed.push(cell_id);

        let should_resolve = self.revealed.len() == 2;
        if should_resolve {
            self.processing = true;
            self.resolving_for = Some(player_id.to_string());
        }
        Ok(FlipOutcome { should_resolve })
    }

    /// Compare the two revealed cells, score, and pass the turn.
    ///
    /// The turn always passes, match or not. `processing` stays set until
    /// [`Session::finish_resolution`].
    pub fn resolve(&mut self, points_per_match: u32) -> Result<Resolution, SessionError> {
        let (a, b) = match self.revealed.as_slice() {
            [a, b] => (*a, *b),
            _ => return Err(SessionError::NothingToResolve),
        };

        let is_match = match (self.cell_value(a), self.cell_value(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        };

        let scorer = self
            .resolving_for
            .take()
            .filter(|id| self.players.contains_key(id));

        if let Some(player) = scorer.as_ref().and_then(|id| self.players.get_mut(id)) {
            player.record_move(is_match, points_per_match);
        }

        if is_match {
            self.matched.insert(a);
            self.matched.insert(b);
        }
        self.revealed.clear();

        // A scorer who left mid-resolution already handed the turn on
        if let Some(id) = &scorer {
            if self.is_player_turn(id) {
                self.advance_turn_from(id);
            }
        }

        let game_over = self.check_game_over();

        Ok(Resolution {
            is_match,
            cells: [a, b],
            cells_to_hide: if is_match { None } else { Some([a, b]) },
            scorer,
            game_over,
        })
    }

    /// Clear the processing flag once the face-down animation has been
    /// communicated. Returns whether it was set.
    pub fn finish_resolution(&mut self) -> bool {
        std::mem::replace(&mut self.processing, false)
    }

    /// End the round if every cell is matched. Idempotent once over.
    pub fn check_game_over(&mut self) -> Option<GameResult> {
        if self.over {
            return self.result.clone();
        }
        if !self.started || self.board.is_empty() || self.matched.len() != self.board.len() {
            return None;
        }

        let top = self.players().map(|p| p.score).max();
        let leaders: Vec<PlayerId> = self
            .players()
            .filter(|p| Some(p.score) == top)
            .map(|p| p.id.clone())
            .collect();

        self.result = match leaders.len() {
            0 => None,
            1 => leaders.into_iter().next().map(GameResult::Winner),
            _ => Some(GameResult::Tie(leaders)),
        };

        self.over = true;
        self.started = false;
        self.ended_at = Some(chrono::Utc::now());
        self.clear_turns();
        for p in self.players.values_mut() {
            p.ready = false;
        }

        self.result.clone()
    }

    // Membership

    /// Remove a player, passing the turn and releasing anything they own.
    pub fn remove_player(&mut self, player_id: &str) -> Result<Departure, SessionError> {
        let pos = self
            .order
            .iter()
            .position(|id| id == player_id)
            .ok_or(SessionError::PlayerNotFound)?;

        let left_during_game = self.started && !self.over;
        let held_turn = self.is_player_turn(player_id);

        let mut turn_passed_to = None;
        if held_turn && self.order.len() > 1 {
            turn_passed_to = self.advance_turn_from(player_id);
            // A lone unresolved reveal belongs to the departing turn
            if !self.processing {
                self.revealed.clear();
            }
        }

        if self.paused_by.as_deref() == Some(player_id) {
            self.paused = false;
            self.paused_by = None;
        }

        let reset_cancelled = self.reset_request.take().is_some();
        if reset_cancelled {
            self.reset_used = true;
        }

        self.order.remove(pos);
        let player = self
            .players
            .remove(player_id)
            .ok_or(SessionError::PlayerNotFound)?;

        let session_empty = self.order.is_empty();
        if session_empty && self.started {
            self.started = false;
            self.revealed.clear();
            self.processing = false;
            self.resolving_for = None;
        }

        Ok(Departure {
            player,
            left_during_game,
            turn_passed_to,
            reset_cancelled,
            session_empty,
        })
    }

    // Pause

    /// Pause the game. Any player may pause; the latest pauser owns it.
    pub fn pause(&mut self, player_id: &str) -> Result<(), SessionError> {
        if !self.has_player(player_id) {
            return Err(SessionError::PlayerNotFound);
        }
        self.paused = true;
        self.paused_by = Some(player_id.to_string());
        Ok(())
    }

    /// Resume. Returns whether the game was paused.
    pub fn resume(&mut self, player_id: &str) -> Result<bool, SessionError> {
        if !self.has_player(player_id) {
            return Err(SessionError::PlayerNotFound);
        }
        if let Some(owner) = &self.paused_by {
            if owner != player_id {
                return Err(SessionError::NotPausingPlayer);
            }
        }
        let was_paused = self.paused;
        self.paused = false;
        self.paused_by = None;
        Ok(was_paused)
    }

    // Reset vote

    fn tally_reset(&mut self) -> VoteTally {
        let tally = match &self.reset_request {
            Some(req) => req.tally(&self.order),
            None => {
                return VoteTally {
                    all_voted: false,
                    all_accepted: false,
                    declined_by: None,
                }
            }
        };

        if tally.all_voted {
            self.reset_used = true;
            if !tally.all_accepted {
                self.reset_request = None;
            }
        }
        tally
    }

    /// Open a rematch vote with the requester's acceptance recorded.
    ///
    /// Only a round in progress or a finished one can be replayed.
    pub fn request_reset(&mut self, player_id: &str) -> Result<VoteTally, SessionError> {
        if !self.has_player(player_id) {
            return Err(SessionError::PlayerNotFound);
        }
        if !self.started && !self.over {
            return Err(SessionError::NoGameToReset);
        }
        if self.reset_used {
            return Err(SessionError::ResetAlreadyUsed);
        }
        if self.reset_request.is_some() {
            return Err(SessionError::ResetAlreadyRequested);
        }

        self.reset_request = Some(ResetRequest::new(player_id.to_string()));
        Ok(self.tally_reset())
    }

    pub fn vote_reset(
        &mut self,
        player_id: &str,
        accepted: bool,
    ) -> Result<VoteTally, SessionError> {
        if !self.has_player(player_id) {
            return Err(SessionError::PlayerNotFound);
        }
        let request = self
            .reset_request
            .as_mut()
            .ok_or(SessionError::ResetNotPending)?;
        if !request.record(player_id, accepted) {
            return Err(SessionError::AlreadyVoted);
        }
        Ok(self.tally_reset())
    }

    /// Replay after a unanimous vote: zero every stat and restart the round.
    pub fn execute_reset<R: Rng + ?Sized>(
        &mut self,
        config: &SessionConfig,
        rng: &mut R,
    ) -> Result<(), SessionError> {
        let request = self
            .reset_request
            .as_ref()
            .ok_or(SessionError::ResetNotPending)?;
        let tally = request.tally(&self.order);
        if !tally.all_accepted {
            return Err(SessionError::ResetNotApproved);
        }
        if self.order.is_empty() {
            return Err(SessionError::NoPlayers);
        }
        if !board::is_valid_layout(self.grid_size, &self.theme, &config.board) {
            return Err(SessionError::InvalidGridSize);
        }

        self.reset_request = None;
        for p in self.players.values_mut() {
            p.ready = false;
        }
        self.begin_round(config.board.max_icons, rng);

        if config.rules.reset_policy == ResetPolicy::OncePerRound {
            self.reset_used = false;
        }
        Ok(())
    }

    /// Wipe to an empty shell, keeping room id, theme and grid size.
    pub fn clear(&mut self) {
        *self = Session::new(
            std::mem::take(&mut self.room_id),
            self.theme.clone(),
            self.grid_size,
        );
    }

    // Snapshot

    pub fn to_json(&self) -> serde_json::Value {
        let players: Vec<serde_json::Value> = self.players().map(|p| p.to_json()).collect();
        let board: Vec<serde_json::Value> = self.board.iter().map(|c| c.to_json()).collect();

        serde_json::json!({
            "room_id": self.room_id,
            "theme": self.theme.name(),
            "grid_size": self.grid_size,
            "phase": self.phase().as_str(),
            "started": self.started,
            "over": self.over,
            "paused": self.paused,
            "paused_by": self.paused_by,
            "processing": self.processing,
            "players": players,
            "current_turn": self.current_player_id(),
            "board": board,
            "revealed": self.revealed,
            "matched": self.matched.iter().collect::<Vec<_>>(),
            "reset_request": self.reset_request.as_ref().map(|r| r.to_json()),
            "reset_used": self.reset_used,
            "result": self.result.as_ref().map(|r| r.to_json()),
            "created_at": self.created_at.to_rfc3339(),
            "started_at": self.started_at.map(|t| t.to_rfc3339()),
            "ended_at": self.ended_at.map(|t| t.to_rfc3339())
        })
    }
}
