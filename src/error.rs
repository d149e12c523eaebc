use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Errors raised while talking to the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("graph api error: {status} {message}")]
    Api { status: u16, message: String },
}

/// Service-level error taxonomy
///
/// Running out of candidate slots is intentionally absent: exhaustion is a
/// normal business outcome that drives the `failed` transition, not an error
/// surfaced to callers. Per-attendee delivery failures are also not
/// represented here; they are logged and reported as `DeliveryResult`s.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("no meeting time is available for all attendees")]
    NoAvailability,
    #[error("negotiation {0} not found")]
    NegotiationNotFound(Uuid),
    #[error("no attendee matches tenant id {0}")]
    AttendeeNotFound(String),
    #[error("attendee {0} is missing from the response set")]
    UnknownAttendee(String),
    #[error("negotiation was modified concurrently")]
    VersionConflict,
    #[error("storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl SchedulerError {
    fn status_code(&self) -> StatusCode {
        match self {
            SchedulerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SchedulerError::NoAvailability => StatusCode::UNPROCESSABLE_ENTITY,
            SchedulerError::NegotiationNotFound(_) => StatusCode::NOT_FOUND,
            SchedulerError::AttendeeNotFound(_) => StatusCode::BAD_REQUEST,
            // An unknown attendee inside an existing negotiation means the
            // response-set invariant was broken somewhere; report it as ours.
            SchedulerError::UnknownAttendee(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SchedulerError::VersionConflict => StatusCode::CONFLICT,
            SchedulerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SchedulerError::Graph(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
