use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::bracket::Match;
use crate::ids::UserId;
use crate::movie::Movie;
use crate::room::{RoomStatus, Winner};
use crate::snapshot::UserProgress;

/// Real-time event set (spec §4.2). Every variant carries the
/// `state_version` of the snapshot committed by the same mutation, so
/// clients can discard stale or out-of-order deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    UserJoined {
        state_version: i64,
        user_id: UserId,
        user_name: String,
        participant_count: i32,
        room_status: RoomStatus,
    },
    UserLeft {
        state_version: i64,
        user_id: UserId,
        participant_count: i32,
        room_status: RoomStatus,
    },
    TournamentStarted {
        state_version: i64,
        tournament_id: String,
        total_rounds: i32,
        total_movies: i32,
        matchups: Vec<Match>,
    },
    PickMade {
        state_version: i64,
        user_id: UserId,
        match_id: String,
        round_number: i32,
        progress: UserProgress,
    },
    RoundCompleted {
        state_version: i64,
        round_number: i32,
        next_round_matchups: Vec<Match>,
    },
    FinalRoundStarted {
        state_version: i64,
        round_number: i32,
        final_movies: [Movie; 2],
        next_round_matchups: Vec<Match>,
    },
    TournamentCompleted {
        state_version: i64,
        winner: Winner,
        completed_at: OffsetDateTime,
        added_to_watchlists: bool,
    },
    RoomStatusChanged {
        state_version: i64,
        old_status: RoomStatus,
        new_status: RoomStatus,
        metadata: serde_json::Value,
    },
}

impl RoomEvent {
    pub fn state_version(&self) -> i64 {
        match self {
            Self::UserJoined { state_version, .. }
            | Self::UserLeft { state_version, .. }
            | Self::TournamentStarted { state_version, .. }
            | Self::PickMade { state_version, .. }
            | Self::RoundCompleted { state_version, .. }
            | Self::FinalRoundStarted { state_version, .. }
            | Self::TournamentCompleted { state_version, .. }
            | Self::RoomStatusChanged { state_version, .. } => *state_version,
        }
    }
}
