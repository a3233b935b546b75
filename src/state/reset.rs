//! Rematch vote sub-protocol.
//!
//! A reset request is live until every current player has voted. Unanimous
//! acceptance lets the caller execute the reset; any decline discards the
//! request.

use super::player::PlayerId;

/// A live reset request.
#[derive(Debug, Clone)]
pub struct ResetRequest {
    pub requested_by: PlayerId,

    /// Votes in the order they were cast
    votes: Vec<(PlayerId, bool)>,

    pub requested_at: chrono::DateTime<chrono::Utc>,
}

/// Progress of a reset vote against the current player list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTally {
    pub all_voted: bool,
    pub all_accepted: bool,
    /// First player (in vote order) who declined.
    pub declined_by: Option<PlayerId>,
}

impl ResetRequest {
    /// Start a request. The requester's acceptance is recorded.
    pub fn new(requested_by: PlayerId) -> Self {
        Self {
            votes: vec![(requested_by.clone(), true)],
            requested_by,
            requested_at: chrono::Utc::now(),
        }
    }

    pub fn has_voted(&self, player_id: &str) -> bool {
        self.votes.iter().any(|(id, _)| id == player_id)
    }

    /// Record a vote. Returns false if the player already voted.
    pub fn record(&mut self, player_id: &str, accepted: bool) -> bool {
        if self.has_voted(player_id) {
            return false;
        }
        self.votes.push((player_id.to_string(), accepted));
        true
    }

    pub fn votes(&self) -> &[(PlayerId, bool)] {
        &self.votes
    }

    /// Tally votes cast by `players`. Votes from anyone else are ignored.
    pub fn tally(&self, players: &[PlayerId]) -> VoteTally {
        let all_voted = players.iter().all(|p| self.has_voted(p));
        let declined_by = self
            .votes
            .iter()
            .find(|(id, accepted)| !*accepted && players.contains(id))
            .map(|(id, _)| id.clone());

        VoteTally {
            all_voted,
            all_accepted: all_voted && declined_by.is_none(),
            declined_by,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let votes: serde_json::Map<String, serde_json::Value> = self
            .votes
            .iter()
            .map(|(id, accepted)| (id.clone(), serde_json::Value::Bool(*accepted)))
            .collect();

        serde_json::json!({
            "requested_by": self.requested_by,
            "votes": votes,
            "requested_at": self.requested_at.to_rfc3339()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(names: &[&str]) -> Vec<PlayerId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_requester_vote_seeded() {
        let req = ResetRequest::new("a".to_string());
        assert!(req.has_voted("a"));
        assert_eq!(req.votes(), &[("a".to_string(), true)]);
    }

    #[test]
    fn test_double_vote_rejected() {
        let mut req = ResetRequest::new("a".to_string());
        assert!(!req.record("a", false));
        assert!(req.record("b", true));
        assert!(!req.record("b", false));
    }

    #[test]
    fn test_tally_pending_then_accepted() {
        let players = ids(&["a", "b", "c"]);
        let mut req = ResetRequest::new("a".to_string());

        req.record("b", true);
        assert_eq!(
            req.tally(&players),
            VoteTally {
                all_voted: false,
                all_accepted: false,
                declined_by: None
            }
        );

        req.record("c", true);
        assert_eq!(
            req.tally(&players),
            VoteTally {
                all_voted: true,
                all_accepted: true,
                declined_by: None
            }
        );
    }

    #[test]
    fn test_tally_reports_first_decliner() {
        let players = ids(&["a", "b", "c"]);
        let mut req = ResetRequest::new("a".to_string());
        req.record("c", false);
        req.record("b", false);

        let tally = req.tally(&players);
        assert!(tally.all_voted);
        assert!(!tally.all_accepted);
        assert_eq!(tally.declined_by.as_deref(), Some("c"));
    }

    #[test]
    fn test_single_player_completes_immediately() {
        let req = ResetRequest::new("solo".to_string());
        let tally = req.tally(&ids(&["solo"]));
        assert!(tally.all_voted);
        assert!(tally.all_accepted);
    }

    #[test]
    fn test_to_json() {
        let mut req = ResetRequest::new("a".to_string());
        req.record("b", false);
        let json = req.to_json();
        assert_eq!(json["requested_by"], "a");
        assert_eq!(json["votes"]["a"], true);
        assert_eq!(json["votes"]["b"], false);
    }
}
