//! Session store keyed by room id.
//!
//! The manager owns every [`Session`], the configuration and the board RNG.
//! Each method takes a room id, applies one transition and returns either the
//! updated session or a richer per-operation outcome. It holds no locks;
//! callers serialize access per room (see [`crate::coordinator`]).

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::board::{CellId, Theme};
use super::player::PlayerId;
use super::reset::VoteTally;
use super::session::{
    validate_name, Departure, FlipOutcome, GameResult, Joined, Resolution, Session, SessionError,
};
use crate::config::SessionConfig;

/// Room identifier supplied by the transport.
pub type RoomId = String;

/// All live sessions.
#[derive(Debug)]
pub struct SessionManager {
    /// Sessions by room ID
    sessions: HashMap<RoomId, Session>,

    config: SessionConfig,

    /// Board shuffles
    rng: StdRng,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Create a manager with a deterministic board RNG.
    pub fn with_seed(config: SessionConfig, seed: u64) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get a session.
    pub fn get(&self, room_id: &str) -> Option<&Session> {
        self.sessions.get(room_id)
    }

    fn session_mut(&mut self, room_id: &str) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(room_id)
            .ok_or(SessionError::SessionNotFound)
    }

    /// Add a player, creating the session on first use.
    ///
    /// Theme and grid size are only read when the session is created; an
    /// empty theme or zero size falls back to the configured defaults.
    pub fn add_player(
        &mut self,
        room_id: &str,
        player_id: &str,
        name: &str,
        theme: &str,
        grid_size: usize,
    ) -> Result<(&Session, Joined), SessionError> {
        let max_name_len = self.config.rules.max_name_len;
        // Reject bad names before a session is created for them
        validate_name(name, max_name_len)?;

        let board = &self.config.board;
        let session = self.sessions.entry(room_id.to_string()).or_insert_with(|| {
            let theme = if theme.is_empty() {
                Theme::parse(&board.default_theme)
            } else {
                Theme::parse(theme)
            };
            let grid_size = if grid_size == 0 {
                board.default_grid_size
            } else {
                grid_size
            };
            tracing::info!(
                room_id,
                theme = theme.name(),
                grid_size,
                "Session created"
            );
            Session::new(room_id.to_string(), theme, grid_size)
        });

        let joined = session.add_player(player_id, name, max_name_len)?;
        tracing::debug!(room_id, player_id, rejoined = joined.rejoined, "Player joined");
        Ok((&*session, joined))
    }

    pub fn rename(
        &mut self,
        room_id: &str,
        player_id: &str,
        name: &str,
    ) -> Result<&Session, SessionError> {
        let max_name_len = self.config.rules.max_name_len;
        let session = self.session_mut(room_id)?;
        session.rename(player_id, name, max_name_len)?;
        Ok(session)
    }

    pub fn toggle_ready(&mut self, room_id: &str, player_id: &str) -> Result<&Session, SessionError> {
        let session = self.session_mut(room_id)?;
        let ready = session.toggle_ready(player_id)?;
        tracing::debug!(room_id, player_id, ready, "Ready toggled");
        Ok(session)
    }

    pub fn start_game(&mut self, room_id: &str) -> Result<&Session, SessionError> {
        let session = self
            .sessions
            .get_mut(room_id)
            .ok_or(SessionError::SessionNotFound)?;
        session.start(&self.config, &mut self.rng)?;
        tracing::info!(
            room_id,
            players = session.player_count(),
            cells = session.board().len(),
            "Game started"
        );
        Ok(session)
    }

    pub fn flip_cell(
        &mut self,
        room_id: &str,
        player_id: &str,
        cell_id: CellId,
    ) -> Result<FlipOutcome, SessionError> {
        let session = self.session_mut(room_id)?;
        let outcome = session.flip(player_id, cell_id)?;
        tracing::debug!(
            room_id,
            player_id,
            cell_id,
            should_resolve = outcome.should_resolve,
            "Cell flipped"
        );
        Ok(outcome)
    }

    /// Resolve the two revealed cells. Game over is checked as part of it.
    pub fn resolve(&mut self, room_id: &str) -> Result<Resolution, SessionError> {
        let points = self.config.rules.points_per_match;
        let session = self.session_mut(room_id)?;
        let resolution = session.resolve(points)?;
        tracing::debug!(
            room_id,
            is_match = resolution.is_match,
            scorer = resolution.scorer.as_deref(),
            "Pair resolved"
        );
        if let Some(result) = &resolution.game_over {
            tracing::info!(room_id, winners = ?result.winners(), tie = result.is_tie(), "Game over");
        }
        Ok(resolution)
    }

    /// Clear the processing flag after the caller has shown the result.
    pub fn finish_resolution(&mut self, room_id: &str) -> Result<&Session, SessionError> {
        let session = self.session_mut(room_id)?;
        session.finish_resolution();
        Ok(session)
    }

    pub fn check_game_over(&mut self, room_id: &str) -> Result<Option<GameResult>, SessionError> {
        Ok(self.session_mut(room_id)?.check_game_over())
    }

    pub fn remove_player(
        &mut self,
        room_id: &str,
        player_id: &str,
    ) -> Result<Departure, SessionError> {
        let session = self.session_mut(room_id)?;
        let departure = session.remove_player(player_id)?;
        tracing::info!(
            room_id,
            player_id,
            during_game = departure.left_during_game,
            turn_passed_to = departure.turn_passed_to.as_deref(),
            "Player left"
        );
        if departure.reset_cancelled {
            tracing::info!(room_id, "Pending reset vote cancelled by departure");
        }
        Ok(departure)
    }

    pub fn pause(&mut self, room_id: &str, player_id: &str) -> Result<&Session, SessionError> {
        let session = self.session_mut(room_id)?;
        session.pause(player_id)?;
        tracing::debug!(room_id, player_id, "Game paused");
        Ok(session)
    }

    /// Resume; the flag reports whether the game was paused.
    pub fn resume(
        &mut self,
        room_id: &str,
        player_id: &str,
    ) -> Result<(&Session, bool), SessionError> {
        let session = self.session_mut(room_id)?;
        let was_paused = session.resume(player_id)?;
        if was_paused {
            tracing::debug!(room_id, player_id, "Game resumed");
        }
        Ok((&*session, was_paused))
    }

    pub fn request_reset(
        &mut self,
        room_id: &str,
        player_id: &str,
    ) -> Result<VoteTally, SessionError> {
        let session = self.session_mut(room_id)?;
        let tally = session.request_reset(player_id)?;
        tracing::info!(room_id, requested_by = player_id, "Reset requested");
        Ok(tally)
    }

    pub fn vote_reset(
        &mut self,
        room_id: &str,
        player_id: &str,
        accepted: bool,
    ) -> Result<VoteTally, SessionError> {
        let session = self.session_mut(room_id)?;
        let tally = session.vote_reset(player_id, accepted)?;
        tracing::debug!(
            room_id,
            player_id,
            accepted,
            all_voted = tally.all_voted,
            "Reset vote recorded"
        );
        Ok(tally)
    }

    /// Replay the round after a unanimous reset vote.
    pub fn execute_reset(&mut self, room_id: &str) -> Result<&Session, SessionError> {
        let session = self
            .sessions
            .get_mut(room_id)
            .ok_or(SessionError::SessionNotFound)?;
        session.execute_reset(&self.config, &mut self.rng)?;
        tracing::info!(room_id, "Reset executed");
        Ok(session)
    }

    /// Hard reset: wipe the session to an empty shell.
    pub fn reset_game(&mut self, room_id: &str) -> Result<&Session, SessionError> {
        let session = self.session_mut(room_id)?;
        session.clear();
        tracing::info!(room_id, "Session wiped");
        Ok(session)
    }

    /// Remove a session entirely.
    pub fn remove_game(&mut self, room_id: &str) -> Option<Session> {
        let session = self.sessions.remove(room_id)?;
        tracing::info!(room_id, "Session removed");
        Some(session)
    }

    /// JSON snapshot for a (re)joining client.
    pub fn snapshot(&self, room_id: &str) -> Result<serde_json::Value, SessionError> {
        self.get(room_id)
            .map(Session::to_json)
            .ok_or(SessionError::SessionNotFound)
    }

    /// Remove sessions with no players left.
    pub fn cleanup_empty(&mut self) -> Vec<RoomId> {
        let empty: Vec<RoomId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.player_count() == 0)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &empty {
            self.remove_game(id);
        }

        empty
    }

    /// Room id a player currently belongs to, if any.
    pub fn room_for_player(&self, player_id: &str) -> Option<&RoomId> {
        self.sessions
            .iter()
            .find(|(_, s)| s.has_player(player_id))
            .map(|(id, _)| id)
    }

    /// Count sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Get all room IDs.
    pub fn room_ids(&self) -> impl Iterator<Item = &RoomId> {
        self.sessions.keys()
    }

    /// Player ids of a room in turn order.
    pub fn player_ids(&self, room_id: &str) -> Vec<PlayerId> {
        self.get(room_id)
            .map(|s| s.player_ids_in_order().to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::SessionPhase;

    fn manager() -> SessionManager {
        SessionManager::with_seed(SessionConfig::default(), 5)
    }

    fn two_player_game(mgr: &mut SessionManager) {
        mgr.add_player("room", "a", "Alice", "numbers", 4).unwrap();
        mgr.add_player("room", "b", "Bob", "", 0).unwrap();
        mgr.toggle_ready("room", "b").unwrap();
        mgr.start_game("room").unwrap();
    }

    #[test]
    fn test_session_created_lazily() {
        let mut mgr = manager();
        assert_eq!(mgr.count(), 0);

        let (session, joined) = mgr.add_player("room", "a", "Alice", "animals", 2).unwrap();
        assert!(!joined.rejoined);
        assert_eq!(session.theme.name(), "animals");
        assert_eq!(session.grid_size, 2);

        // Later calls do not change the captured layout
        let (session, _) = mgr.add_player("room", "b", "Bob", "numbers", 6).unwrap();
        assert_eq!(session.theme.name(), "animals");
        assert_eq!(session.grid_size, 2);
        assert_eq!(mgr.count(), 1);
    }

    #[test]
    fn test_defaults_applied_on_create() {
        let mut mgr = manager();
        let (session, _) = mgr.add_player("room", "a", "Alice", "", 0).unwrap();
        assert_eq!(session.theme, Theme::Numbers);
        assert_eq!(session.grid_size, 4);
    }

    #[test]
    fn test_invalid_name_creates_nothing() {
        let mut mgr = manager();
        let err = mgr.add_player("room", "a", "  ", "", 0).unwrap_err();
        assert_eq!(err, SessionError::InvalidName);
        assert_eq!(mgr.count(), 0);
    }

    #[test]
    fn test_missing_room() {
        let mut mgr = manager();
        assert_eq!(
            mgr.start_game("nowhere").unwrap_err(),
            SessionError::SessionNotFound
        );
        assert_eq!(
            mgr.flip_cell("nowhere", "a", 0).unwrap_err(),
            SessionError::SessionNotFound
        );
        assert_eq!(mgr.resolve("nowhere").unwrap_err(), SessionError::SessionNotFound);
        assert!(mgr.snapshot("nowhere").is_err());
        assert!(mgr.remove_game("nowhere").is_none());
    }

    #[test]
    fn test_full_turn_through_manager() {
        let mut mgr = manager();
        two_player_game(&mut mgr);

        assert_eq!(mgr.get("room").unwrap().phase(), SessionPhase::Active);

        let outcome = mgr.flip_cell("room", "a", 0).unwrap();
        assert!(!outcome.should_resolve);
        let outcome = mgr.flip_cell("room", "a", 1).unwrap();
        assert!(outcome.should_resolve);

        let resolution = mgr.resolve("room").unwrap();
        assert_eq!(resolution.cells, [0, 1]);
        let session = mgr.finish_resolution("room").unwrap();
        assert!(!session.is_processing());
        assert_eq!(session.current_player_id(), Some("b"));
    }

    #[test]
    fn test_points_from_config() {
        let mut config = SessionConfig::default();
        config.rules.points_per_match = 3;
        let mut mgr = SessionManager::with_seed(config, 5);
        mgr.add_player("room", "a", "Alice", "numbers", 2).unwrap();
        mgr.start_game("room").unwrap();

        let board = mgr.get("room").unwrap().board().to_vec();
        let first = &board[0];
        let partner = board
            .iter()
            .find(|c| c.id != first.id && c.value == first.value)
            .unwrap();

        mgr.flip_cell("room", "a", first.id).unwrap();
        mgr.flip_cell("room", "a", partner.id).unwrap();
        mgr.resolve("room").unwrap();

        assert_eq!(mgr.get("room").unwrap().player("a").unwrap().score, 3);
    }

    #[test]
    fn test_same_seed_same_board() {
        let mut one = manager();
        let mut two = manager();
        two_player_game(&mut one);
        two_player_game(&mut two);
        assert_eq!(one.get("room").unwrap().board(), two.get("room").unwrap().board());
    }

    #[test]
    fn test_reset_game_and_remove() {
        let mut mgr = manager();
        two_player_game(&mut mgr);

        let session = mgr.reset_game("room").unwrap();
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert_eq!(mgr.count(), 1);

        assert_eq!(mgr.cleanup_empty(), vec!["room".to_string()]);
        assert_eq!(mgr.count(), 0);
    }

    #[test]
    fn test_room_lookup() {
        let mut mgr = manager();
        mgr.add_player("r1", "a", "Alice", "", 0).unwrap();
        mgr.add_player("r2", "b", "Bob", "", 0).unwrap();

        assert_eq!(mgr.room_for_player("b").map(String::as_str), Some("r2"));
        assert_eq!(mgr.room_for_player("zz"), None);
        assert_eq!(mgr.player_ids("r1"), vec!["a".to_string()]);
        assert_eq!(mgr.room_ids().count(), 2);
    }

    #[test]
    fn test_pause_and_resume_flag() {
        let mut mgr = manager();
        two_player_game(&mut mgr);

        let (_, was_paused) = mgr.resume("room", "a").unwrap();
        assert!(!was_paused);

        mgr.pause("room", "b").unwrap();
        assert_eq!(
            mgr.resume("room", "a").unwrap_err(),
            SessionError::NotPausingPlayer
        );
        let (session, was_paused) = mgr.resume("room", "b").unwrap();
        assert!(was_paused);
        assert!(!session.is_paused());
    }

    #[test]
    fn test_snapshot() {
        let mut mgr = manager();
        two_player_game(&mut mgr);
        let json = mgr.snapshot("room").unwrap();
        assert_eq!(json["room_id"], "room");
        assert_eq!(json["players"].as_array().unwrap().len(), 2);
    }
}
