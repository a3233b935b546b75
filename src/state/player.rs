//! Per-player record within a session.

/// Stable player identity, supplied by the transport and kept across
/// reconnects.
pub type PlayerId = String;

/// A player's stats and flags within one session.
///
/// Turn order is not stored here; the session keeps it as an ordered list
/// of ids. `has_turn` mirrors that order for clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,

    /// Display name
    pub name: String,

    /// Whether player is ready to start (never checked for the host)
    pub ready: bool,

    /// Whether this player may flip now
    pub has_turn: bool,

    pub score: u32,

    pub pairs_found: u32,

    /// Resolved reveal pairs, matched or not
    pub moves: u32,

    /// When player joined this session
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            ready: false,
            has_turn: false,
            score: 0,
            pairs_found: 0,
            moves: 0,
            joined_at: chrono::Utc::now(),
        }
    }

    /// Zero the round history. Readiness is left alone.
    pub fn clear_stats(&mut self) {
        self.score = 0;
        self.pairs_found = 0;
        self.moves = 0;
        self.has_turn = false;
    }

    /// Record one resolved pair attempt.
    pub fn record_move(&mut self, matched: bool, points: u32) {
        self.moves += 1;
        if matched {
            self.score = self.score.saturating_add(points);
            self.pairs_found += 1;
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "ready": self.ready,
            "has_turn": self.has_turn,
            "score": self.score,
            "pairs_found": self.pairs_found,
            "moves": self.moves
        })
    }
}
