use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{MovieId, RoomId, UserId};

/// A single participant's selection within a match. Unique on
/// `(room_id, user_id, match_id)` at the store layer — that uniqueness is
/// the primary idempotency guard (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketPick {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub round_number: i32,
    pub match_id: String,
    pub movie_a_id: MovieId,
    pub movie_b_id: MovieId,
    pub selected_movie_id: MovieId,
    pub response_time_ms: Option<i32>,
    pub created_at: OffsetDateTime,
}

/// Signals that both active participants have a pick for `match_id`.
/// Unique on `(room_id, match_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCompletion {
    pub room_id: RoomId,
    pub match_id: String,
    pub round_number: i32,
    pub completed_at: OffsetDateTime,
    pub next_match_id: Option<String>,
}
