//! Memory Match State Library
//!
//! This crate provides the authoritative game state for turn-based
//! memory-matching rooms.
//!
//! # Overview
//!
//! - **Sessions** - One per room: players in join order, a shuffled board of
//!   paired cells, strict turn order, two-cell reveals, scoring and game over.
//!
//! - **Pause and reset vote** - Any player may pause, only the pauser may
//!   resume. A unanimous vote replays the round with stats zeroed.
//!
//! - **Session store** - `SessionManager` owns every session keyed by room id.
//!   It is an explicit value, not a global.
//!
//! - **Coordinator** - `RoomCoordinator` turns player intents into events for
//!   the requester or the whole room, and runs the delayed pair resolution.
//!
//! # Design Principles
//!
//! 1. **Rejections are values** - Every operation returns
//!    `Result<_, SessionError>`; a rejected intent leaves the session untouched.
//!
//! 2. **Turn order is a list of ids** - Stats live in a separate map, so a
//!    departure only touches one ordering.
//!
//! 3. **No networking** - This crate is pure state plus a channel adapter.
//!
//! 4. **Serialization-ready** - Snapshots are JSON for clients.
//!
//! # Example
//!
//! ```rust
//! use memorymatch_state::config::SessionConfig;
//! use memorymatch_state::{SessionManager, SessionPhase};
//!
//! let mut sessions = SessionManager::with_seed(SessionConfig::default(), 7);
//!
//! sessions.add_player("room-1", "p1", "Alice", "numbers", 4).unwrap();
//! sessions.add_player("room-1", "p2", "Bob", "numbers", 4).unwrap();
//! sessions.toggle_ready("room-1", "p2").unwrap();
//!
//! let session = sessions.start_game("room-1").unwrap();
//! assert_eq!(session.phase(), SessionPhase::Active);
//! assert_eq!(session.board().len(), 16);
//! assert_eq!(session.current_player_id(), Some("p1"));
//!
//! sessions.flip_cell("room-1", "p1", 0).unwrap();
//! let outcome = sessions.flip_cell("room-1", "p1", 1).unwrap();
//! assert!(outcome.should_resolve);
//!
//! let resolution = sessions.resolve("room-1").unwrap();
//! sessions.finish_resolution("room-1").unwrap();
//! assert_eq!(resolution.cells, [0, 1]);
//! ```

pub mod config;
pub mod coordinator;
pub mod state;

// Re-export everything from state module at crate root
pub use state::*;
