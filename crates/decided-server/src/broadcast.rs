//! Per-room pub/sub for the live event stream (spec §4.2), grounded on the
//! teacher's `TYPING_UPDATE_SENDER` pattern: one `broadcast::Sender` per
//! room, created lazily on first subscribe or publish.

use std::sync::OnceLock;

use dashmap::{DashMap, DashSet};
use decided_core::event::RoomEvent;
use decided_core::ids::{RoomId, UserId};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

pub struct Broadcast {
    channels: DashMap<RoomId, broadcast::Sender<RoomEvent>>,
    presence: DashMap<RoomId, DashSet<UserId>>,
}

impl Broadcast {
    fn new() -> Self {
        Self {
            channels: DashMap::new(),
            presence: DashMap::new(),
        }
    }

    fn sender(&self, room_id: RoomId) -> broadcast::Sender<RoomEvent> {
        self.channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publishes an event to every subscriber of `room_id`. A `SendError`
    /// just means nobody is currently listening; that's not a failure.
    pub fn publish(&self, room_id: RoomId, event: RoomEvent) {
        let _ = self.sender(room_id).send(event);
    }

    pub fn subscribe(&self, room_id: RoomId) -> broadcast::Receiver<RoomEvent> {
        self.sender(room_id).subscribe()
    }

    /// Records that `user_id` has an open stream connection to `room_id`,
    /// used by the coordinator to decide whether a room is still watched
    /// when deciding on inactivity timeouts.
    pub fn track(&self, room_id: RoomId, user_id: UserId) {
        self.presence.entry(room_id).or_default().insert(user_id);
    }

    pub fn untrack(&self, room_id: RoomId, user_id: UserId) {
        if let Some(users) = self.presence.get(&room_id) {
            users.remove(&user_id);
        }
    }

    pub fn presence(&self, room_id: RoomId) -> Vec<UserId> {
        self.presence.get(&room_id).map(|users| users.iter().map(|u| *u).collect()).unwrap_or_default()
    }

    /// Drops a room's channel and presence set once it's terminal and no
    /// stream is holding a receiver, freeing the entry.
    pub fn forget(&self, room_id: RoomId) {
        self.channels.remove(&room_id);
        self.presence.remove(&room_id);
    }
}

static BROADCAST: OnceLock<Broadcast> = OnceLock::new();

pub fn get() -> &'static Broadcast {
    BROADCAST.get_or_init(Broadcast::new)
}
