use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{MovieId, RoomId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddedFrom {
    Survey,
    Search,
    Manual,
    /// Enriched automatically when a decide-together room completes.
    /// Later schema revisions than the original source reused this variant
    /// name; accepted here as an ordinary case, per spec §9.
    DecidedTogether,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchListEntry {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub title: String,
    pub movie_data: Option<serde_json::Value>,
    pub added_from: AddedFrom,
    pub decided_together_room_id: Option<RoomId>,
    pub pending_rating: bool,
    pub is_watched: bool,
    pub watched_at: Option<OffsetDateTime>,
    pub rating: Option<f32>,
}

impl WatchListEntry {
    /// Build the winner entry committed at tournament completion (spec I5).
    pub fn decided_together(
        user_id: UserId,
        movie_id: MovieId,
        title: String,
        room_id: RoomId,
    ) -> Self {
        Self {
            user_id,
            movie_id,
            title,
            movie_data: None,
            added_from: AddedFrom::DecidedTogether,
            decided_together_room_id: Some(room_id),
            pending_rating: true,
            is_watched: false,
            watched_at: None,
            rating: None,
        }
    }
}
