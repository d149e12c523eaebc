use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::negotiation::{CandidateSlot, NegotiationStatus, ResponseStatus};

/// Body of POST /meetings/schedule
#[derive(Debug, Deserialize, Serialize)]
pub struct ScheduleMeetingRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub duration_minutes: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    pub attendees: Vec<String>,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// Response of POST /meetings/schedule
#[derive(Debug, Serialize)]
pub struct ScheduleMeetingResponse {
    pub negotiation_id: Uuid,
    pub status: NegotiationStatus,
    pub candidate_count: usize,
}

/// Query parameters of the GET /webhook/response callback
///
/// The proposal card encodes these in its action URLs so the callback can be
/// fully stateless.
#[derive(Debug, Deserialize)]
pub struct WebhookParams {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub uuid: String,
    pub response: String,
}

/// One attendee row in the status response
#[derive(Debug, Serialize)]
pub struct AttendeeStatusEntry {
    pub email: String,
    pub status: ResponseStatus,
    pub response_time: Option<DateTime<Utc>>,
}

/// Response of GET /meeting-status/:uuid
#[derive(Debug, Serialize)]
pub struct MeetingStatusResponse {
    pub status: NegotiationStatus,
    pub status_message: String,
    pub attendees: Vec<AttendeeStatusEntry>,
    pub selected_time: Option<CandidateSlot>,
}
