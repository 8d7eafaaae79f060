//! Per-room mutation serialization (spec §4.7): every action that mutates
//! a room's state runs under that room's lock so two concurrent picks (or
//! a pick racing a leave) can't interleave their read-modify-write.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use decided_core::ids::RoomId;
use time::OffsetDateTime;
use tokio::sync::Mutex;

pub struct Coordinator {
    locks: DashMap<RoomId, Arc<Mutex<()>>>,
    last_activity: DashMap<RoomId, AtomicI64>,
}

impl Coordinator {
    fn new() -> Self {
        Self {
            locks: DashMap::new(),
            last_activity: DashMap::new(),
        }
    }

    fn lock_for(&self, room_id: RoomId) -> Arc<Mutex<()>> {
        self.locks.entry(room_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Runs `f` with exclusive access to `room_id`, marking the room active
    /// just before running it so idle sweeps never race an in-flight commit.
    pub async fn mutate<F, Fut, T>(&self, room_id: RoomId, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(room_id);
        let _guard = lock.lock().await;
        self.touch(room_id);
        f().await
    }

    pub fn touch(&self, room_id: RoomId) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.last_activity
            .entry(room_id)
            .and_modify(|v| v.store(now, Ordering::Relaxed))
            .or_insert_with(|| AtomicI64::new(now));
    }

    /// How long it's been since `room_id` last saw a mutation, if it's been
    /// touched since process start. A room the sweeper hasn't seen yet
    /// returns `None`, which the caller treats as "not idle" rather than
    /// "infinitely idle".
    pub fn idle_for(&self, room_id: RoomId) -> Option<Duration> {
        self.last_activity.get(&room_id).map(|v| {
            let last = v.load(Ordering::Relaxed);
            let now = OffsetDateTime::now_utc().unix_timestamp();
            Duration::from_secs(now.saturating_sub(last).max(0) as u64)
        })
    }

    pub fn forget(&self, room_id: RoomId) {
        self.locks.remove(&room_id);
        self.last_activity.remove(&room_id);
    }
}

static COORDINATOR: OnceLock<Coordinator> = OnceLock::new();

pub fn get() -> &'static Coordinator {
    COORDINATOR.get_or_init(Coordinator::new)
}
