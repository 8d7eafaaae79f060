use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::bracket::{Match, Tournament};
use crate::ids::{MovieId, RoomCode, RoomId, UserId};
use crate::room::{RoomStatus, Winner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Lobby,
    Bracket,
    Final,
    Completed,
    Abandoned,
}

impl Screen {
    pub fn for_room(status: RoomStatus, is_final_round: bool) -> Self {
        match status {
            RoomStatus::Waiting => Self::Lobby,
            RoomStatus::Active if is_final_round => Self::Final,
            RoomStatus::Active => Self::Bracket,
            RoomStatus::Completed => Self::Completed,
            RoomStatus::Abandoned => Self::Abandoned,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomParticipantView {
    pub user_id: UserId,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub code: RoomCode,
    pub status: RoomStatus,
    pub participants: Vec<RoomParticipantView>,
    pub owner_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_picks: i32,
    pub total_picks: i32,
}

/// Viewer-personalized slice of the snapshot (spec §4.6): recomputed
/// deterministically as the first match in `current_round` the viewer has
/// not yet picked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub current_match: Option<Match>,
    pub completed_match_ids: std::collections::BTreeSet<String>,
    pub progress: UserProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub version: i64,
    pub screen: Screen,
    pub room: RoomSummary,
    pub tournament: Option<Tournament>,
    pub winner: Option<Winner>,
    pub user_view: Option<UserView>,
    pub available_actions: Vec<String>,
}

/// The authoritative per-room document and monotonic version counter
/// (spec §3, §4.6). `current_state` holds an already-rendered `RoomView`
/// snapshot (not personalized — personalization happens per viewer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStateSnapshot {
    pub room_id: RoomId,
    pub state_version: i64,
    pub current_state: RoomView,
    pub updated_at: OffsetDateTime,
    pub updated_by_user_id: Option<UserId>,
}

impl RoomStateSnapshot {
    /// Personalizes a snapshot's room view for one viewer (spec §4.6).
    pub fn personalize(&self, viewer: UserId, picked_match_ids: &std::collections::BTreeSet<String>) -> RoomView {
        let mut view = self.current_state.clone();
        if let Some(tournament) = &view.tournament {
            let current_match = tournament
                .matches_in_round(tournament.current_round)
                .find(|m| !picked_match_ids.contains(&m.match_id) && !m.is_bye())
                .cloned();
            let total_picks = tournament.matches_in_round(tournament.current_round).filter(|m| !m.is_bye()).count() as i32;
            let user_picks = picked_match_ids
                .iter()
                .filter(|id| {
                    tournament
                        .matches_in_round(tournament.current_round)
                        .any(|m| &m.match_id == *id)
                })
                .count() as i32;
            view.user_view = Some(UserView {
                current_match,
                completed_match_ids: picked_match_ids.clone(),
                progress: UserProgress { user_picks, total_picks },
            });
        }
        let _ = viewer;
        view
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomHistoryEvent {
    pub room_id: RoomId,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub created_at: OffsetDateTime,
}

pub fn final_movie_pair_ids(final_movies: &(crate::movie::Movie, crate::movie::Movie)) -> (MovieId, MovieId) {
    (final_movies.0.id.clone(), final_movies.1.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::generate_bracket;
    use crate::movie::Movie;

    #[test]
    fn screen_for_room_maps_active_round_to_final_or_bracket() {
        assert_eq!(Screen::for_room(RoomStatus::Waiting, false), Screen::Lobby);
        assert_eq!(Screen::for_room(RoomStatus::Active, false), Screen::Bracket);
        assert_eq!(Screen::for_room(RoomStatus::Active, true), Screen::Final);
        assert_eq!(Screen::for_room(RoomStatus::Completed, false), Screen::Completed);
        assert_eq!(Screen::for_room(RoomStatus::Abandoned, false), Screen::Abandoned);
    }

    fn movie(id: &str, user: UserId) -> Movie {
        Movie { id: MovieId(id.to_owned()), title: id.to_owned(), poster_path: None, source_user_ids: [user].into_iter().collect(), popularity: None }
    }

    fn snapshot_with_tournament(tournament: Tournament) -> RoomStateSnapshot {
        RoomStateSnapshot {
            room_id: RoomId::new(),
            state_version: 1,
            current_state: RoomView {
                version: 1,
                screen: Screen::Bracket,
                room: RoomSummary { code: RoomCode::parse("ABCDEF").unwrap(), status: RoomStatus::Active, participants: vec![], owner_id: UserId::new() },
                tournament: Some(tournament),
                winner: None,
                user_view: None,
                available_actions: vec![],
            },
            updated_at: OffsetDateTime::now_utc(),
            updated_by_user_id: None,
        }
    }

    #[test]
    fn personalize_picks_first_unpicked_non_bye_match() {
        let u1 = UserId::new();
        let u2 = UserId::new();
        let a = vec![movie("m1", u1), movie("m2", u1)];
        let b = vec![movie("m3", u2), movie("m4", u2)];
        let tournament = generate_bracket("t".into(), a, b).unwrap();
        let first_match = tournament.matches_in_round(1).next().unwrap().match_id.clone();
        let snapshot = snapshot_with_tournament(tournament);

        let view = snapshot.personalize(u1, &std::collections::BTreeSet::new());
        let uv = view.user_view.unwrap();
        assert_eq!(uv.current_match.unwrap().match_id, first_match);
        assert_eq!(uv.progress.user_picks, 0);
        assert_eq!(uv.progress.total_picks, 2);
    }

    #[test]
    fn personalize_advances_past_already_picked_matches() {
        let u1 = UserId::new();
        let u2 = UserId::new();
        let a = vec![movie("m1", u1), movie("m2", u1)];
        let b = vec![movie("m3", u2), movie("m4", u2)];
        let tournament = generate_bracket("t".into(), a, b).unwrap();
        let matches: Vec<_> = tournament.matches_in_round(1).map(|m| m.match_id.clone()).collect();
        let snapshot = snapshot_with_tournament(tournament);

        let picked: std::collections::BTreeSet<_> = [matches[0].clone()].into_iter().collect();
        let view = snapshot.personalize(u1, &picked);
        let uv = view.user_view.unwrap();
        assert_eq!(uv.current_match.unwrap().match_id, matches[1]);
        assert_eq!(uv.progress.user_picks, 1);
    }

    #[test]
    fn personalize_leaves_no_current_match_once_round_fully_picked() {
        let u1 = UserId::new();
        let u2 = UserId::new();
        let a = vec![movie("m1", u1), movie("m2", u1)];
        let b = vec![movie("m3", u2), movie("m4", u2)];
        let tournament = generate_bracket("t".into(), a, b).unwrap();
        let matches: Vec<_> = tournament.matches_in_round(1).map(|m| m.match_id.clone()).collect();
        let snapshot = snapshot_with_tournament(tournament);

        let picked: std::collections::BTreeSet<_> = matches.into_iter().collect();
        let view = snapshot.personalize(u1, &picked);
        assert!(view.user_view.unwrap().current_match.is_none());
    }
}
