use axum::{
    extract::{Path, Query, State},
    response::Html,
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::common::{
    AttendeeStatusEntry, MeetingStatusResponse, ScheduleMeetingRequest, ScheduleMeetingResponse,
    WebhookParams,
};
use crate::models::negotiation::{MeetingNegotiation, ResponseStatus};
use crate::services::ingestor::ResponseIngestor;
use crate::services::state_machine::NegotiationEngine;
use crate::services::store::NegotiationStore;
use crate::services::supervisor::PollSupervisor;

/// Shared application state
pub struct AppState {
    pub engine: Arc<NegotiationEngine>,
    pub store: Arc<NegotiationStore>,
    pub ingestor: ResponseIngestor,
    pub supervisor: Arc<PollSupervisor>,
}

/// Handler for POST /meetings/schedule
///
/// Creates the negotiation, sends the first proposal round and starts a
/// background poller that drives the rest of the lifecycle.
pub async fn schedule_meeting(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleMeetingRequest>,
) -> Result<Json<ScheduleMeetingResponse>, SchedulerError> {
    info!(
        "Schedule request: '{}' with {} attendees",
        request.title,
        request.attendees.len()
    );

    let negotiation = state.engine.start_negotiation(request).await?;
    state.supervisor.spawn_poller(negotiation.id);

    Ok(Json(ScheduleMeetingResponse {
        negotiation_id: negotiation.id,
        status: negotiation.status,
        candidate_count: negotiation.candidate_slots.len(),
    }))
}

/// Handler for the GET /webhook/response callback
///
/// Attendees land here from the Accept/Tentative/Decline buttons of a
/// proposal card, so the response is a small confirmation page rather than
/// JSON.
pub async fn meeting_response(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WebhookParams>,
) -> Result<Html<String>, SchedulerError> {
    let negotiation_id = Uuid::parse_str(&params.uuid)
        .map_err(|_| SchedulerError::InvalidRequest(format!("invalid uuid: {}", params.uuid)))?;

    let response = ResponseStatus::parse(&params.response).ok_or_else(|| {
        SchedulerError::InvalidRequest(format!("invalid response value: {}", params.response))
    })?;

    let outcome = state
        .ingestor
        .ingest(negotiation_id, &params.tenant_id, response)?;

    debug!(
        "Webhook recorded {:?} from {} for negotiation {}",
        outcome.status, outcome.email, negotiation_id
    );

    let label = match outcome.status {
        ResponseStatus::Accepted => "accepted",
        ResponseStatus::Declined => "declined",
        ResponseStatus::Tentative => "marked tentative",
        ResponseStatus::Pending => "recorded",
    };

    Ok(Html(format!(
        "<html><body>\
         <h2>Response recorded</h2>\
         <p>You have {} the proposed meeting time. You can close this page.</p>\
         </body></html>",
        label
    )))
}

/// Handler for GET /meeting-status/:uuid
///
/// Evaluates the negotiation once before reporting, so a status poll never
/// returns staler state than the responses already collected.
pub async fn meeting_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MeetingStatusResponse>, SchedulerError> {
    let negotiation = state.engine.evaluate(&id).await?;

    let attendees = negotiation
        .responses
        .iter()
        .map(|(email, record)| AttendeeStatusEntry {
            email: email.clone(),
            status: record.status,
            response_time: record.response_time,
        })
        .collect();

    Ok(Json(MeetingStatusResponse {
        status: negotiation.status,
        status_message: negotiation.status.status_message().to_string(),
        attendees,
        selected_time: negotiation.selected_time,
    }))
}

/// Handler for GET /negotiations/:uuid, only exposed in development
pub async fn get_negotiation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MeetingNegotiation>, SchedulerError> {
    let negotiation = state
        .store
        .get(&id)
        .ok_or(SchedulerError::NegotiationNotFound(id))?;

    Ok(Json(negotiation))
}
