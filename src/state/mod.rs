//! State management module for memory-match rooms.
//!
//! This module provides the core state types and the session store:
//!
//! - `board` - Themes, cell values, board generation and shuffle
//! - `player` - Per-player stats record
//! - `reset` - Rematch vote sub-protocol
//! - `session` - One room's authoritative game state and its transitions
//! - `manager` - Sessions keyed by room id
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         SessionManager                           │
//! │                                                                  │
//! │   room_id → Session          config          rng (StdRng)        │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                         Session                            │  │
//! │  │                                                            │  │
//! │  │  order: [p1, p2, p3]      players: p_id → Player           │  │
//! │  │  board: [Cell; n²]        revealed (≤ 2)   matched         │  │
//! │  │  paused_by                reset_request    reset_used      │  │
//! │  │                                                            │  │
//! │  │  Empty ─▶ Lobby ─▶ Active ⇄ Paused                         │  │
//! │  │                      │ ▲                                   │  │
//! │  │                      ▼ │                                   │  │
//! │  │                   Resolving ─▶ Over ─▶ (reset) Active      │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use memorymatch_state::config::SessionConfig;
//! use memorymatch_state::state::SessionManager;
//!
//! let mut sessions = SessionManager::with_seed(SessionConfig::default(), 1);
//! sessions.add_player("room-1", "p1", "Alice", "numbers", 4).unwrap();
//! sessions.start_game("room-1").unwrap();
//!
//! let outcome = sessions.flip_cell("room-1", "p1", 0).unwrap();
//! assert!(!outcome.should_resolve);
//! ```

pub mod board;
pub mod manager;
pub mod player;
pub mod reset;
pub mod session;

// Re-export commonly used types
pub use board::{Cell, CellId, CellValue, Theme, NUMBERS_THEME};
pub use manager::{RoomId, SessionManager};
pub use player::{Player, PlayerId};
pub use reset::{ResetRequest, VoteTally};
pub use session::{
    Departure, ErrorCategory, FlipOutcome, GameResult, Joined, Resolution, Session, SessionError,
    SessionPhase,
};
