//! Pure domain types and algorithms for the decided-together room
//! coordinator: the bracket generator, Elo update function, state machine
//! guards, and the documents exchanged between the store, the coordinator,
//! and connected clients. Nothing in this crate performs I/O.

pub mod bracket;
pub mod elo;
pub mod error;
pub mod event;
pub mod ids;
pub mod movie;
pub mod pick;
pub mod room;
pub mod snapshot;
pub mod watchlist;

pub use error::{CoreError, CoreResult};
pub use ids::{MovieId, RoomCode, RoomId, UserId};
