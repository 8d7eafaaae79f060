use thiserror::Error;

/// Domain-level error taxonomy (spec §7). Transport concerns (HTTP status,
/// DB/IO wrapping) live one layer up, in the server crate's `AppError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("missing or invalid identity")]
    Unauthorized,
    #[error("not the room owner or not a participant")]
    Forbidden,
    #[error("room or code not found")]
    NotFound,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("room already has two active participants")]
    RoomFull,
    #[error("room is not waiting for participants")]
    RoomNotWaiting,
    #[error("room is not active")]
    RoomNotActive,
    #[error("starting a tournament needs two participants")]
    NeedTwoParticipants,
    #[error("cannot form a legitimate bracket from the given watchlists")]
    InsufficientCatalog,
    #[error("user is not an active participant of this room")]
    NotParticipant,
    #[error("match is not in the current round")]
    MatchNotInCurrentRound,
    #[error("movie is not one of the match's two movies")]
    MovieNotInMatch,
    #[error("pick already recorded for this match")]
    DuplicatePick,
    #[error("snapshot write lost an optimistic concurrency race")]
    VersionConflict,
    #[error("transient storage error, safe to retry")]
    Transient,
}

impl CoreError {
    /// Stable machine-readable kind, echoed in every surfaced error per spec §7.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::InvalidInput(_) => "InvalidInput",
            Self::RoomFull => "RoomFull",
            Self::RoomNotWaiting => "RoomNotWaiting",
            Self::RoomNotActive => "RoomNotActive",
            Self::NeedTwoParticipants => "NeedTwoParticipants",
            Self::InsufficientCatalog => "InsufficientCatalog",
            Self::NotParticipant => "NotParticipant",
            Self::MatchNotInCurrentRound => "MatchNotInCurrentRound",
            Self::MovieNotInMatch => "MovieNotInMatch",
            Self::DuplicatePick => "DuplicatePick",
            Self::VersionConflict => "VersionConflict",
            Self::Transient => "Transient",
        }
    }

    /// Whether the action processor should transparently retry rather than
    /// surface the error to the caller (spec §7 propagation policy).
    pub fn is_internally_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::VersionConflict)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
