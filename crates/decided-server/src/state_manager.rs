use std::sync::{Mutex, OnceLock};

use decided_core::ids::{RoomId, UserId};
use decided_core::room::RoomStatus;
use decided_core::snapshot::{RoomParticipantView, RoomStateSnapshot, RoomSummary, RoomView, Screen};
use diesel::PgConnection;
use lru_cache::LruCache;
use time::OffsetDateTime;

use crate::AppResult;

/// Canonical per-room state cache (spec §4.6): a read-through LRU,
/// invalidated on every `save`, matching the teacher's use of the
/// `lru-cache` crate for its own PDU cache (its analogous config key is
/// `pdu_cache_capacity`; here it's `snapshot_cache_size`).
pub struct StateManager {
    cache: Mutex<LruCache<RoomId, RoomStateSnapshot>>,
}

impl StateManager {
    fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity.max(1))),
        }
    }

    pub fn get(&self, room_id: RoomId) -> Option<RoomStateSnapshot> {
        self.cache.lock().expect("state cache poisoned").get_mut(&room_id).cloned()
    }

    /// Optimistic cache write: a snapshot only replaces the cached one if
    /// its version is newer, so a write from a superseded mutation can
    /// never regress what readers see.
    pub fn save(&self, snapshot: RoomStateSnapshot) {
        let mut cache = self.cache.lock().expect("state cache poisoned");
        let is_newer = cache
            .get_mut(&snapshot.room_id)
            .map(|existing| snapshot.state_version > existing.state_version)
            .unwrap_or(true);
        if is_newer {
            cache.insert(snapshot.room_id, snapshot);
        }
    }

    pub fn clear_cache(&self, room_id: RoomId) {
        self.cache.lock().expect("state cache poisoned").remove(&room_id);
    }
}

static STATE_MANAGER: OnceLock<StateManager> = OnceLock::new();

pub fn get() -> &'static StateManager {
    STATE_MANAGER.get_or_init(|| StateManager::new(crate::config::get().snapshot_cache_size))
}

fn available_actions(status: RoomStatus) -> Vec<String> {
    match status {
        RoomStatus::Waiting => vec!["join".into(), "leave".into(), "start".into()],
        RoomStatus::Active => vec!["pick".into(), "leave".into()],
        RoomStatus::Completed | RoomStatus::Abandoned => Vec::new(),
    }
}

/// Authoritative rebuild from the store (spec §4.6): used on cold start or
/// cache miss. The returned snapshot is not personalized; callers call
/// [`RoomStateSnapshot::personalize`] per viewer.
pub fn rebuild_from_store(conn: &mut PgConnection, room_id: RoomId) -> AppResult<RoomStateSnapshot> {
    let room = decided_data::room::get_room(conn, room_id)?;
    let participants = decided_data::room::list_participants(conn, room_id, false)?;
    let state_version = decided_data::room::get_state_version(conn, room_id)?;

    let is_final_round = room.tournament.as_ref().is_some_and(|t| t.is_final_round);
    let view = RoomView {
        version: state_version,
        screen: Screen::for_room(room.status, is_final_round),
        room: RoomSummary {
            code: room.code,
            status: room.status,
            participants: participants
                .iter()
                .map(|p| RoomParticipantView {
                    user_id: p.user_id,
                    is_active: p.is_active,
                })
                .collect(),
            owner_id: room.owner_user_id,
        },
        tournament: room.tournament,
        winner: room.winner,
        user_view: None,
        available_actions: available_actions(room.status),
    };

    Ok(RoomStateSnapshot {
        room_id,
        state_version,
        current_state: view,
        updated_at: OffsetDateTime::now_utc(),
        updated_by_user_id: None,
    })
}

/// Read-through fetch: serves the cache on a hit, otherwise rebuilds and
/// populates it. Mutations always call `rebuild_from_store` directly after
/// a commit rather than trusting a stale cache entry.
pub fn load(conn: &mut PgConnection, room_id: RoomId) -> AppResult<RoomStateSnapshot> {
    if let Some(cached) = get().get(room_id) {
        return Ok(cached);
    }
    let snapshot = rebuild_from_store(conn, room_id)?;
    get().save(snapshot.clone());
    Ok(snapshot)
}

/// Computes which match ids in the tournament's current round `user_id`
/// has already picked, used to drive [`RoomStateSnapshot::personalize`].
pub fn picked_match_ids(
    conn: &mut PgConnection,
    room_id: RoomId,
    user_id: UserId,
) -> AppResult<std::collections::BTreeSet<String>> {
    let picks = decided_data::room::list_picks(conn, room_id, None)?;
    Ok(picks
        .into_iter()
        .filter(|pick| pick.user_id == user_id)
        .map(|pick| pick.match_id)
        .collect())
}
