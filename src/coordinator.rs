//! Async adapter between a transport and the [`SessionManager`].
//!
//! A transport feeds player intents into [`RoomCoordinator::handle`] and
//! forwards every [`Dispatch`] it receives on the outbound channel to either
//! the requesting player or the whole room. All intents for all rooms are
//! applied under one lock, so each room sees a single linear history.
//!
//! The second reveal of a turn schedules a deferred resolution: a task sleeps
//! for `timing.resolve_delay_ms` so every client can see both cells, then
//! resolves the pair. Tearing a room down aborts the pending task.
//!
//! # Locking
//!
//! One `Mutex<SessionManager>` covers every room. The lock is held only while
//! an intent or a resolution is applied in memory; nothing under it does I/O
//! or sleeps, and the resolution delay runs outside it. Rooms therefore wait
//! on each other only for those short critical sections, never for another
//! room's delay. The shared board RNG and lazy session creation live in the
//! manager, which is why the lock is not split per room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::state::board::CellId;
use crate::state::manager::{RoomId, SessionManager};
use crate::state::player::PlayerId;
use crate::state::reset::VoteTally;
use crate::state::session::{Session, SessionError};

/// Session store shared between the coordinator and its deferred tasks.
pub type SharedSessions = Arc<Mutex<SessionManager>>;

/// An intent sent by a player.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Join {
        name: String,
        #[serde(default)]
        theme: String,
        #[serde(default)]
        grid_size: usize,
    },
    Rename {
        name: String,
    },
    ToggleReady,
    Start,
    Flip {
        cell_id: CellId,
    },
    Pause,
    Resume,
    Leave,
    RequestReset,
    VoteReset {
        accepted: bool,
    },
    ResetGame,
    RemoveGame,
    Snapshot,
}

/// Who a dispatch is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Requester(PlayerId),
    Room,
}

/// Event delivered to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    GameState(serde_json::Value),
    GameStarted,
    GamePaused { paused_by: PlayerId },
    GameResumed,
    CellsHidden(Vec<CellId>),
    GameOver(serde_json::Value),
    PlayerLeft {
        player_id: PlayerId,
        name: String,
        during_game: bool,
    },
    ResetRequested { requested_by: PlayerId },
    ResetVoteUpdate {
        votes: serde_json::Value,
        all_voted: bool,
    },
    ResetDeclined { declined_by: Option<PlayerId> },
    ResetAccepted,
    /// A player left while a vote was pending.
    ResetCancelled,
    RoomRemoved,
    Error { reason: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GameState(_) => "game_state",
            Self::GameStarted => "game_started",
            Self::GamePaused { .. } => "game_paused",
            Self::GameResumed => "game_resumed",
            Self::CellsHidden(_) => "cells_hidden",
            Self::GameOver(_) => "game_over",
            Self::PlayerLeft { .. } => "player_left",
            Self::ResetRequested { .. } => "reset_requested",
            Self::ResetVoteUpdate { .. } => "reset_vote_update",
            Self::ResetDeclined { .. } => "reset_declined",
            Self::ResetAccepted => "reset_accepted",
            Self::ResetCancelled => "reset_cancelled",
            Self::RoomRemoved => "room_removed",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let payload = match self {
            Self::GameState(state) => serde_json::json!({ "state": state }),
            Self::GamePaused { paused_by } => serde_json::json!({ "paused_by": paused_by }),
            Self::CellsHidden(cells) => serde_json::json!({ "cells": cells }),
            Self::GameOver(result) => serde_json::json!({ "result": result }),
            Self::PlayerLeft {
                player_id,
                name,
                during_game,
            } => serde_json::json!({
                "player_id": player_id,
                "name": name,
                "during_game": during_game
            }),
            Self::ResetRequested { requested_by } => {
                serde_json::json!({ "requested_by": requested_by })
            }
            Self::ResetVoteUpdate { votes, all_voted } => {
                serde_json::json!({ "votes": votes, "all_voted": all_voted })
            }
            Self::ResetDeclined { declined_by } => {
                serde_json::json!({ "declined_by": declined_by })
            }
            Self::Error { reason } => serde_json::json!({ "reason": reason }),
            Self::GameStarted
            | Self::GameResumed
            | Self::ResetAccepted
            | Self::ResetCancelled
            | Self::RoomRemoved => serde_json::json!({}),
        };

        serde_json::json!({
            "type": self.name(),
            "data": payload
        })
    }
}

/// An event addressed to an audience within a room.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub room_id: RoomId,
    pub audience: Audience,
    pub event: ServerEvent,
}

/// Work left over after an intent is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Followup {
    Nothing,
    ScheduleResolution,
    CancelResolution,
}

/// Collects dispatches for one intent.
struct Outbox<'a> {
    room_id: &'a str,
    dispatches: Vec<Dispatch>,
}

impl<'a> Outbox<'a> {
    fn new(room_id: &'a str) -> Self {
        Self {
            room_id,
            dispatches: Vec::new(),
        }
    }

    fn room(&mut self, event: ServerEvent) {
        self.dispatches.push(Dispatch {
            room_id: self.room_id.to_string(),
            audience: Audience::Room,
            event,
        });
    }

    fn requester(&mut self, player_id: &str, event: ServerEvent) {
        self.dispatches.push(Dispatch {
            room_id: self.room_id.to_string(),
            audience: Audience::Requester(player_id.to_string()),
            event,
        });
    }

    fn state(&mut self, session: &Session) {
        self.room(ServerEvent::GameState(session.to_json()));
    }
}

fn game_over_payload(session: &Session) -> Option<serde_json::Value> {
    let result = session.result()?;
    let players: Vec<serde_json::Value> = session.players().map(|p| p.to_json()).collect();
    Some(serde_json::json!({
        "outcome": result.to_json(),
        "players": players
    }))
}

/// Applies intents and schedules deferred resolutions.
#[derive(Clone)]
pub struct RoomCoordinator {
    sessions: SharedSessions,
    outbound: mpsc::UnboundedSender<Dispatch>,
    /// Deferred resolution per room
    pending: Arc<Mutex<HashMap<RoomId, JoinHandle<()>>>>,
    resolve_delay: Duration,
}

impl RoomCoordinator {
    pub fn new(manager: SessionManager, outbound: mpsc::UnboundedSender<Dispatch>) -> Self {
        let resolve_delay = manager.config().resolve_delay();
        Self {
            sessions: Arc::new(Mutex::new(manager)),
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            resolve_delay,
        }
    }

    /// Shared handle to the session store.
    pub fn sessions(&self) -> SharedSessions {
        Arc::clone(&self.sessions)
    }

    /// Whether a deferred resolution is scheduled for the room.
    pub async fn has_pending_resolution(&self, room_id: &str) -> bool {
        self.pending.lock().await.contains_key(room_id)
    }

    /// Apply one intent from a player and emit the resulting dispatches.
    ///
    /// Rejections go to the requester only.
    pub async fn handle(&self, room_id: &str, player_id: &str, intent: Intent) {
        let mut mgr = self.sessions.lock().await;
        let mut out = Outbox::new(room_id);

        let followup = match Self::apply(&mut mgr, &mut out, room_id, player_id, intent) {
            Ok(followup) => followup,
            Err(e) => {
                tracing::warn!(room_id, player_id, error = %e, "Intent rejected");
                out.requester(
                    player_id,
                    ServerEvent::Error {
                        reason: e.to_string(),
                    },
                );
                Followup::Nothing
            }
        };

        // Under the session lock so a stale task cannot touch a new round
        match followup {
            Followup::Nothing => {}
            Followup::ScheduleResolution => self.schedule_resolution(room_id).await,
            Followup::CancelResolution => self.cancel_resolution(room_id).await,
        }

        for dispatch in out.dispatches {
            self.send(dispatch);
        }
    }

    fn apply(
        mgr: &mut SessionManager,
        out: &mut Outbox<'_>,
        room_id: &str,
        player_id: &str,
        intent: Intent,
    ) -> Result<Followup, SessionError> {
        match intent {
            Intent::Join {
                name,
                theme,
                grid_size,
            } => {
                let (session, _) = mgr.add_player(room_id, player_id, &name, &theme, grid_size)?;
                out.state(session);
            }
            Intent::Rename { name } => {
                let session = mgr.rename(room_id, player_id, &name)?;
                out.state(session);
            }
            Intent::ToggleReady => {
                let session = mgr.toggle_ready(room_id, player_id)?;
                out.state(session);
            }
            Intent::Start => {
                let session = mgr.start_game(room_id)?;
                out.room(ServerEvent::GameStarted);
                out.state(session);
            }
            Intent::Flip { cell_id } => {
                let outcome = mgr.flip_cell(room_id, player_id, cell_id)?;
                if let Some(session) = mgr.get(room_id) {
                    out.state(session);
                }
                if outcome.should_resolve {
                    return Ok(Followup::ScheduleResolution);
                }
            }
            Intent::Pause => {
                let session = mgr.pause(room_id, player_id)?;
                out.room(ServerEvent::GamePaused {
                    paused_by: player_id.to_string(),
                });
                out.state(session);
            }
            Intent::Resume => {
                let (session, was_paused) = mgr.resume(room_id, player_id)?;
                if was_paused {
                    out.room(ServerEvent::GameResumed);
                }
                out.state(session);
            }
            Intent::Leave => {
                let departure = mgr.remove_player(room_id, player_id)?;
                out.room(ServerEvent::PlayerLeft {
                    player_id: departure.player.id.clone(),
                    name: departure.player.name.clone(),
                    during_game: departure.left_during_game,
                });
                if departure.reset_cancelled {
                    out.room(ServerEvent::ResetCancelled);
                }
                if let Some(session) = mgr.get(room_id) {
                    out.state(session);
                }
                if departure.session_empty {
                    return Ok(Followup::CancelResolution);
                }
            }
            Intent::RequestReset => {
                let tally = mgr.request_reset(room_id, player_id)?;
                out.room(ServerEvent::ResetRequested {
                    requested_by: player_id.to_string(),
                });
                return Self::after_vote(mgr, out, room_id, &tally);
            }
            Intent::VoteReset { accepted } => {
                let tally = mgr.vote_reset(room_id, player_id, accepted)?;
                return Self::after_vote(mgr, out, room_id, &tally);
            }
            Intent::ResetGame => {
                let session = mgr.reset_game(room_id)?;
                out.state(session);
                return Ok(Followup::CancelResolution);
            }
            Intent::RemoveGame => {
                mgr.remove_game(room_id)
                    .ok_or(SessionError::SessionNotFound)?;
                out.room(ServerEvent::RoomRemoved);
                return Ok(Followup::CancelResolution);
            }
            Intent::Snapshot => {
                let state = mgr.snapshot(room_id)?;
                out.requester(player_id, ServerEvent::GameState(state));
            }
        }
        Ok(Followup::Nothing)
    }

    /// Report vote progress; replay the round on unanimous acceptance.
    fn after_vote(
        mgr: &mut SessionManager,
        out: &mut Outbox<'_>,
        room_id: &str,
        tally: &VoteTally,
    ) -> Result<Followup, SessionError> {
        let votes = mgr
            .get(room_id)
            .and_then(Session::reset_request)
            .map(|r| r.to_json()["votes"].clone())
            .unwrap_or(serde_json::Value::Null);
        out.room(ServerEvent::ResetVoteUpdate {
            votes,
            all_voted: tally.all_voted,
        });

        if tally.all_accepted {
            let session = mgr.execute_reset(room_id)?;
            out.room(ServerEvent::ResetAccepted);
            out.room(ServerEvent::GameStarted);
            out.state(session);
            return Ok(Followup::CancelResolution);
        }
        if tally.all_voted {
            out.room(ServerEvent::ResetDeclined {
                declined_by: tally.declined_by.clone(),
            });
        }
        if let Some(session) = mgr.get(room_id) {
            out.state(session);
        }
        Ok(Followup::Nothing)
    }

    async fn schedule_resolution(&self, room_id: &str) {
        let this = self.clone();
        let room = room_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(this.resolve_delay).await;
            this.run_resolution(&room).await;
        });

        if let Some(stale) = self.pending.lock().await.insert(room_id.to_string(), handle) {
            stale.abort();
        }
        tracing::debug!(room_id, delay_ms = self.resolve_delay.as_millis() as u64, "Resolution scheduled");
    }

    async fn cancel_resolution(&self, room_id: &str) {
        if let Some(handle) = self.pending.lock().await.remove(room_id) {
            handle.abort();
            tracing::debug!(room_id, "Pending resolution cancelled");
        }
    }

    /// Deferred half of a turn: resolve, hide, clear processing, report.
    async fn run_resolution(&self, room_id: &str) {
        let mut mgr = self.sessions.lock().await;
        self.pending.lock().await.remove(room_id);

        let resolution = match mgr.resolve(room_id) {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(room_id, error = %e, "Deferred resolution skipped");
                return;
            }
        };

        let mut out = Outbox::new(room_id);
        if let Some(cells) = resolution.cells_to_hide {
            out.room(ServerEvent::CellsHidden(cells.to_vec()));
        }
        match mgr.finish_resolution(room_id) {
            Ok(session) => {
                out.state(session);
                if resolution.game_over.is_some() {
                    if let Some(payload) = game_over_payload(session) {
                        out.room(ServerEvent::GameOver(payload));
                    }
                }
            }
            Err(e) => tracing::warn!(room_id, error = %e, "Room vanished during resolution"),
        }

        for dispatch in out.dispatches {
            self.send(dispatch);
        }
    }

    fn send(&self, dispatch: Dispatch) {
        let event = dispatch.event.name();
        if let Err(e) = self.outbound.send(dispatch) {
            tracing::debug!(event, error = %e, "Outbound channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::state::board::Cell;
    use crate::state::session::SessionPhase;
    use pretty_assertions::assert_eq;

    fn coordinator() -> (RoomCoordinator, mpsc::UnboundedReceiver<Dispatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = SessionManager::with_seed(SessionConfig::default(), 17);
        (RoomCoordinator::new(manager, tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Dispatch>) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();
        while let Ok(dispatch) = rx.try_recv() {
            dispatches.push(dispatch);
        }
        dispatches
    }

    fn event_names(dispatches: &[Dispatch]) -> Vec<&'static str> {
        dispatches.iter().map(|d| d.event.name()).collect()
    }

    fn join(name: &str) -> Intent {
        Intent::Join {
            name: name.to_string(),
            theme: "numbers".to_string(),
            grid_size: 4,
        }
    }

    async fn started_room(coord: &RoomCoordinator) {
        coord.handle("room", "a", join("Alice")).await;
        coord.handle("room", "b", join("Bob")).await;
        coord.handle("room", "b", Intent::ToggleReady).await;
        coord.handle("room", "a", Intent::Start).await;
    }

    async fn board(coord: &RoomCoordinator) -> Vec<Cell> {
        let sessions = coord.sessions();
        let mgr = sessions.lock().await;
        let cells = mgr.get("room").map(|s| s.board().to_vec()).unwrap_or_default();
        cells
    }

    fn mismatch(board: &[Cell]) -> (CellId, CellId) {
        let first = &board[0];
        let other = board.iter().find(|c| c.value != first.value).unwrap();
        (first.id, other.id)
    }

    #[test]
    fn test_intent_from_json() {
        let intent: Intent =
            serde_json::from_value(serde_json::json!({ "type": "flip", "cell_id": 3 })).unwrap();
        assert_eq!(intent, Intent::Flip { cell_id: 3 });

        let intent: Intent =
            serde_json::from_value(serde_json::json!({ "type": "join", "name": "Alice" })).unwrap();
        assert_eq!(
            intent,
            Intent::Join {
                name: "Alice".to_string(),
                theme: String::new(),
                grid_size: 0
            }
        );
    }

    #[test]
    fn test_event_json() {
        let json = ServerEvent::CellsHidden(vec![2, 5]).to_json();
        assert_eq!(json["type"], "cells_hidden");
        assert_eq!(json["data"]["cells"], serde_json::json!([2, 5]));
        assert_eq!(ServerEvent::ResetAccepted.to_json()["type"], "reset_accepted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_broadcasts_to_room() {
        let (coord, mut rx) = coordinator();
        started_room(&coord).await;

        let dispatches = drain(&mut rx);
        assert_eq!(
            event_names(&dispatches),
            vec!["game_state", "game_state", "game_state", "game_started", "game_state"]
        );
        assert!(dispatches.iter().all(|d| d.audience == Audience::Room));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_goes_to_requester_only() {
        let (coord, mut rx) = coordinator();
        started_room(&coord).await;
        drain(&mut rx);

        coord.handle("room", "b", Intent::Flip { cell_id: 0 }).await;

        let dispatches = drain(&mut rx);
        assert_eq!(
            dispatches,
            vec![Dispatch {
                room_id: "room".to_string(),
                audience: Audience::Requester("b".to_string()),
                event: ServerEvent::Error {
                    reason: "Not your turn".to_string()
                },
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_flip_resolves_after_delay() {
        let (coord, mut rx) = coordinator();
        started_room(&coord).await;
        let (x, y) = mismatch(&board(&coord).await);
        drain(&mut rx);

        coord.handle("room", "a", Intent::Flip { cell_id: x }).await;
        coord.handle("room", "a", Intent::Flip { cell_id: y }).await;
        assert!(coord.has_pending_resolution("room").await);
        assert_eq!(event_names(&drain(&mut rx)), vec!["game_state", "game_state"]);

        // A third flip while processing is refused
        coord.handle("room", "a", Intent::Flip { cell_id: 2 }).await;
        assert_eq!(event_names(&drain(&mut rx)), vec!["error"]);

        // Time auto-advances past the delay while we wait
        let hidden = rx.recv().await.unwrap();
        assert_eq!(hidden.event, ServerEvent::CellsHidden(vec![x, y]));
        let state = rx.recv().await.unwrap();
        assert_eq!(state.event.name(), "game_state");

        assert!(!coord.has_pending_resolution("room").await);
        let sessions = coord.sessions();
        let mgr = sessions.lock().await;
        let session = mgr.get("room").unwrap();
        assert!(!session.is_processing());
        assert_eq!(session.current_player_id(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_game_cancels_resolution() {
        let (coord, mut rx) = coordinator();
        started_room(&coord).await;
        let (x, y) = mismatch(&board(&coord).await);

        coord.handle("room", "a", Intent::Flip { cell_id: x }).await;
        coord.handle("room", "a", Intent::Flip { cell_id: y }).await;
        coord.handle("room", "a", Intent::RemoveGame).await;
        assert!(!coord.has_pending_resolution("room").await);

        tokio::time::sleep(Duration::from_secs(10)).await;

        let names = event_names(&drain(&mut rx));
        assert_eq!(names.last(), Some(&"room_removed"));
        assert!(!names.contains(&"cells_hidden"));
        let sessions = coord.sessions();
        assert_eq!(sessions.lock().await.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanimous_vote_replays_round() {
        let (coord, mut rx) = coordinator();
        started_room(&coord).await;
        drain(&mut rx);

        coord.handle("room", "a", Intent::RequestReset).await;
        assert_eq!(
            event_names(&drain(&mut rx)),
            vec!["reset_requested", "reset_vote_update", "game_state"]
        );

        coord
            .handle("room", "b", Intent::VoteReset { accepted: true })
            .await;
        assert_eq!(
            event_names(&drain(&mut rx)),
            vec!["reset_vote_update", "reset_accepted", "game_started", "game_state"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_vote() {
        let (coord, mut rx) = coordinator();
        started_room(&coord).await;

        coord.handle("room", "a", Intent::RequestReset).await;
        coord
            .handle("room", "b", Intent::VoteReset { accepted: false })
            .await;
        let dispatches = drain(&mut rx);
        assert_eq!(
            event_names(&dispatches),
            vec![
                "reset_requested",
                "reset_vote_update",
                "game_state",
                "reset_vote_update",
                "reset_declined",
                "game_state"
            ]
        );
        assert_eq!(
            dispatches[4].event,
            ServerEvent::ResetDeclined {
                declined_by: Some("b".to_string())
            }
        );
        match &dispatches[5].event {
            ServerEvent::GameState(state) => {
                assert_eq!(state["reset_used"], true);
                assert_eq!(state["reset_request"], serde_json::Value::Null);
            }
            other => panic!("Expected GameState, got: {other:?}"),
        }

        coord.handle("room", "a", Intent::RequestReset).await;
        let dispatches = drain(&mut rx);
        assert_eq!(
            dispatches[0].event,
            ServerEvent::Error {
                reason: "Reset already used".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_request_in_lobby_is_private_rejection() {
        let (coord, mut rx) = coordinator();
        coord
            .handle(
                "room",
                "a",
                Intent::Join {
                    name: "Alice".to_string(),
                    theme: "numbers".to_string(),
                    grid_size: 3,
                },
            )
            .await;
        coord.handle("room", "b", join("Bob")).await;
        drain(&mut rx);

        coord.handle("room", "a", Intent::RequestReset).await;

        assert_eq!(
            drain(&mut rx),
            vec![Dispatch {
                room_id: "room".to_string(),
                audience: Audience::Requester("a".to_string()),
                event: ServerEvent::Error {
                    reason: "No game to reset".to_string()
                },
            }]
        );
        let sessions = coord.sessions();
        let mgr = sessions.lock().await;
        let session = mgr.get("room").unwrap();
        assert!(!session.reset_used());
        assert!(session.reset_request().is_none());
        assert_eq!(session.phase(), SessionPhase::Lobby);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_only_announced_when_paused() {
        let (coord, mut rx) = coordinator();
        started_room(&coord).await;
        drain(&mut rx);

        coord.handle("room", "a", Intent::Resume).await;
        assert_eq!(event_names(&drain(&mut rx)), vec!["game_state"]);

        coord.handle("room", "b", Intent::Pause).await;
        coord.handle("room", "b", Intent::Resume).await;
        assert_eq!(
            event_names(&drain(&mut rx)),
            vec!["game_paused", "game_state", "game_resumed", "game_state"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_for_vanished_room_is_skipped() {
        let (coord, mut rx) = coordinator();
        started_room(&coord).await;
        let (x, y) = mismatch(&board(&coord).await);

        coord.handle("room", "a", Intent::Flip { cell_id: x }).await;
        coord.handle("room", "a", Intent::Flip { cell_id: y }).await;
        drain(&mut rx);

        // Removed behind the coordinator's back, so nothing is aborted
        let sessions = coord.sessions();
        assert!(sessions.lock().await.remove_game("room").is_some());
        assert!(coord.has_pending_resolution("room").await);

        tokio::time::sleep(Duration::from_secs(2)).await;

        // The task ran, cleared its entry and emitted nothing
        assert!(!coord.has_pending_resolution("room").await);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(sessions.lock().await.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rooms_resolve_on_their_own_delay() {
        let (coord, mut rx) = coordinator();
        for room in ["r1", "r2"] {
            coord.handle(room, "a", join("Alice")).await;
            coord.handle(room, "a", Intent::Start).await;
        }

        for room in ["r1", "r2"] {
            let cells = {
                let sessions = coord.sessions();
                let mgr = sessions.lock().await;
                let cells = mgr.get(room).unwrap().board().to_vec();
                cells
            };
            let (x, y) = mismatch(&cells);
            coord.handle(room, "a", Intent::Flip { cell_id: x }).await;
            coord.handle(room, "a", Intent::Flip { cell_id: y }).await;
        }
        drain(&mut rx);

        // One delay resolves both rooms
        tokio::time::sleep(Duration::from_millis(601)).await;

        let hidden: Vec<RoomId> = drain(&mut rx)
            .into_iter()
            .filter(|d| d.event.name() == "cells_hidden")
            .map(|d| d.room_id)
            .collect();
        assert_eq!(hidden.len(), 2);
        assert!(hidden.contains(&"r1".to_string()));
        assert!(hidden.contains(&"r2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_and_snapshot() {
        let (coord, mut rx) = coordinator();
        started_room(&coord).await;
        drain(&mut rx);

        coord.handle("room", "a", Intent::Leave).await;
        let dispatches = drain(&mut rx);
        assert_eq!(
            dispatches[0].event,
            ServerEvent::PlayerLeft {
                player_id: "a".to_string(),
                name: "Alice".to_string(),
                during_game: true
            }
        );

        coord.handle("room", "b", Intent::Snapshot).await;
        let dispatches = drain(&mut rx);
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].audience, Audience::Requester("b".to_string()));
        match &dispatches[0].event {
            ServerEvent::GameState(state) => assert_eq!(state["current_turn"], "b"),
            other => panic!("Expected GameState, got: {other:?}"),
        }
    }
}
