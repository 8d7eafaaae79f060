use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::bracket::Tournament;
use crate::error::{CoreError, CoreResult};
use crate::ids::{RoomCode, RoomId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Active,
    Completed,
    Abandoned,
}

impl RoomStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Winner {
    pub movie_id: crate::ids::MovieId,
    pub title: String,
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: RoomId,
    pub code: RoomCode,
    pub owner_user_id: UserId,
    pub status: RoomStatus,
    pub created_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub closed_at: Option<OffsetDateTime>,
    pub tournament: Option<Tournament>,
    pub winner: Option<Winner>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub display_name: String,
    pub joined_at: OffsetDateTime,
    pub left_at: Option<OffsetDateTime>,
    pub is_active: bool,
    pub current_match_index: i32,
    pub completed_match_ids: std::collections::BTreeSet<String>,
}

/// Pure state-machine guards (spec §4.7). These never touch storage; the
/// action processor calls them before computing any delta.
impl Room {
    pub fn require_waiting(&self) -> CoreResult<()> {
        if self.status != RoomStatus::Waiting {
            return Err(CoreError::RoomNotWaiting);
        }
        Ok(())
    }

    pub fn require_active(&self) -> CoreResult<()> {
        if self.status != RoomStatus::Active {
            return Err(CoreError::RoomNotActive);
        }
        Ok(())
    }

    pub fn require_owner(&self, user_id: UserId) -> CoreResult<()> {
        if self.owner_user_id != user_id {
            return Err(CoreError::Forbidden);
        }
        Ok(())
    }
}

pub fn validate_join(room: &Room, active_participants: usize) -> CoreResult<()> {
    room.require_waiting()?;
    if active_participants >= 2 {
        return Err(CoreError::RoomFull);
    }
    Ok(())
}

pub fn validate_start(room: &Room, user_id: UserId, active_participants: usize) -> CoreResult<()> {
    room.require_waiting()?;
    room.require_owner(user_id)?;
    if active_participants < 2 {
        return Err(CoreError::NeedTwoParticipants);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(status: RoomStatus, owner: UserId) -> Room {
        Room {
            room_id: RoomId::new(),
            code: RoomCode::parse("ABCDEF").unwrap(),
            owner_user_id: owner,
            status,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            completed_at: None,
            closed_at: None,
            tournament: None,
            winner: None,
        }
    }

    #[test]
    fn join_rejects_non_waiting_room() {
        let owner = UserId::new();
        let r = room(RoomStatus::Active, owner);
        assert_eq!(validate_join(&r, 1), Err(CoreError::RoomNotWaiting));
    }

    #[test]
    fn join_rejects_full_room() {
        let owner = UserId::new();
        let r = room(RoomStatus::Waiting, owner);
        assert_eq!(validate_join(&r, 2), Err(CoreError::RoomFull));
    }

    #[test]
    fn join_allows_single_participant_room() {
        let owner = UserId::new();
        let r = room(RoomStatus::Waiting, owner);
        assert_eq!(validate_join(&r, 1), Ok(()));
    }

    #[test]
    fn start_rejects_non_owner() {
        let owner = UserId::new();
        let other = UserId::new();
        let r = room(RoomStatus::Waiting, owner);
        assert_eq!(validate_start(&r, other, 2), Err(CoreError::Forbidden));
    }

    #[test]
    fn start_rejects_fewer_than_two_participants() {
        let owner = UserId::new();
        let r = room(RoomStatus::Waiting, owner);
        assert_eq!(validate_start(&r, owner, 1), Err(CoreError::NeedTwoParticipants));
    }

    #[test]
    fn start_allows_owner_with_two_participants() {
        let owner = UserId::new();
        let r = room(RoomStatus::Waiting, owner);
        assert_eq!(validate_start(&r, owner, 2), Ok(()));
    }
}
