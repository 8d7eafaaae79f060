use async_trait::async_trait;
use decided_core::CoreError;
use salvo::http::StatusCode;
use salvo::oapi::{self, EndpointOutRegister, ToSchema};
use salvo::prelude::{Depot, Json, Request, Response, Writer};
use thiserror::Error;

/// HTTP-facing error superset (spec §6.7): wraps the pure-domain
/// [`CoreError`] taxonomy plus the I/O-adjacent failures that can only
/// happen at this layer. `CoreError::kind()` drives the HTTP status table
/// in spec §7.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("serde json: `{0}`")]
    SerdeJson(#[from] serde_json::Error),
    #[error("io: `{0}`")]
    Io(#[from] std::io::Error),
    #[error("salvo: `{0}`")]
    Salvo(#[from] salvo::Error),
}

impl From<decided_data::DataError> for AppError {
    fn from(err: decided_data::DataError) -> Self {
        Self::Core(CoreError::from(err))
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Core(e) => status_for_kind(e.kind()),
            Self::SerdeJson(_) => StatusCode::BAD_REQUEST,
            Self::Io(_) | Self::Salvo(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Core(e) => e.kind(),
            Self::SerdeJson(_) => "InvalidInput",
            Self::Io(_) | Self::Salvo(_) => "Internal",
        }
    }
}

fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "Unauthorized" => StatusCode::UNAUTHORIZED,
        "Forbidden" | "NotParticipant" => StatusCode::FORBIDDEN,
        "NotFound" => StatusCode::NOT_FOUND,
        "VersionConflict" | "DuplicatePick" => StatusCode::CONFLICT,
        "Transient" => StatusCode::SERVICE_UNAVAILABLE,
        "InvalidInput" | "RoomFull" | "RoomNotWaiting" | "RoomNotActive" | "NeedTwoParticipants"
        | "InsufficientCatalog" | "MatchNotInCurrentRound" | "MovieNotInMatch" => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[async_trait]
impl Writer for AppError {
    async fn write(self, _req: &mut Request, _depot: &mut Depot, res: &mut Response) {
        if let Self::Core(e) = &self {
            tracing::warn!(kind = e.kind(), error = %e, "request failed");
        } else {
            tracing::error!(error = %self, "request failed");
        }
        res.status_code(self.status());
        res.render(Json(serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        })));
    }
}

impl EndpointOutRegister for AppError {
    fn register(components: &mut oapi::Components, operation: &mut oapi::Operation) {
        operation.responses.insert(
            StatusCode::BAD_REQUEST.as_str(),
            oapi::Response::new("Bad request").add_content("application/json", String::to_schema(components)),
        );
        operation.responses.insert(
            StatusCode::NOT_FOUND.as_str(),
            oapi::Response::new("Not found").add_content("application/json", String::to_schema(components)),
        );
        operation.responses.insert(
            StatusCode::INTERNAL_SERVER_ERROR.as_str(),
            oapi::Response::new("Internal server error")
                .add_content("application/json", String::to_schema(components)),
        );
    }
}
