use thiserror::Error;

/// Persistence-layer error (spec §6.7 data tier). Transport concerns
/// (HTTP status mapping) are handled by `decided-server`'s `AppError`,
/// which wraps this type.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("not found")]
    NotFound,
    #[error("optimistic concurrency conflict")]
    VersionConflict,
    #[error("duplicate pick")]
    DuplicatePick,
    #[error("diesel: `{0}`")]
    Diesel(#[from] diesel::result::Error),
    #[error("pool: `{0}`")]
    Pool(#[from] crate::PoolError),
    #[error("serde json: `{0}`")]
    SerdeJson(#[from] serde_json::Error),
    #[error("internal: `{0}`")]
    Internal(String),
    #[error("core: `{0}`")]
    Core(#[from] decided_core::CoreError),
}

impl DataError {
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors the caller may retry without surfacing them to the
    /// user (serialization failures, deadlocks, pool exhaustion).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Diesel(diesel::result::Error::DatabaseError(kind, _)) => matches!(
                kind,
                diesel::result::DatabaseErrorKind::SerializationFailure
                    | diesel::result::DatabaseErrorKind::ReadOnlyTransaction
            ),
            Self::Pool(_) => true,
            _ => false,
        }
    }
}

impl From<DataError> for decided_core::CoreError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NotFound => decided_core::CoreError::NotFound,
            DataError::VersionConflict => decided_core::CoreError::VersionConflict,
            DataError::DuplicatePick => decided_core::CoreError::DuplicatePick,
            DataError::Core(inner) => inner,
            other if other.is_transient() => decided_core::CoreError::Transient,
            other => decided_core::CoreError::InvalidInput(other.to_string()),
        }
    }
}
