use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::SchedulerError;

/// Lifecycle status of a meeting negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    Pending,
    Waiting,
    Done,
    Failed,
}

impl NegotiationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationStatus::Done | NegotiationStatus::Failed)
    }

    /// Human-readable message for the status endpoint
    pub fn status_message(&self) -> &'static str {
        match self {
            NegotiationStatus::Pending => "Initializing...",
            NegotiationStatus::Waiting => "Waiting for attendee responses...",
            NegotiationStatus::Done => "Meeting scheduled successfully",
            NegotiationStatus::Failed => "Meeting scheduling failed",
        }
    }
}

/// An attendee's answer to a proposed meeting time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Pending,
    Accepted,
    Declined,
    Tentative,
}

impl ResponseStatus {
    /// Parse the `response` query parameter of the webhook callback
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accepted" => Some(ResponseStatus::Accepted),
            "declined" => Some(ResponseStatus::Declined),
            "tentative" => Some(ResponseStatus::Tentative),
            _ => None,
        }
    }
}

/// Routing identifiers resolved for one attendee at negotiation creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendeeRouting {
    pub email: String,
    pub tenant_id: String,
    /// One-on-one chat with the attendee; None is a delivery gap
    pub chat_id: Option<String>,
}

/// One attendee's response record, owned by the parent negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendeeResponse {
    pub status: ResponseStatus,
    pub response_time: Option<DateTime<Utc>>,
    pub tenant_id: String,
    pub chat_id: Option<String>,
}

/// Per-attendee availability attached to a candidate slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub email: String,
    pub availability: String,
}

/// One proposed meeting time, immutable once attached
///
/// Candidate slots keep the order returned by the availability ranking
/// (best confidence first); that order is the retry priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub confidence: f64,
    pub attendee_availability: Vec<SlotAvailability>,
}

/// Counts per response status for one negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResponseSummary {
    pub pending: usize,
    pub accepted: usize,
    pub declined: usize,
    pub tentative: usize,
}

impl ResponseSummary {
    pub fn total(&self) -> usize {
        self.pending + self.accepted + self.declined + self.tentative
    }
}

/// The aggregate root for one meeting-scheduling attempt
///
/// Cycles through candidate slots until every attendee answers without a
/// decline, or the candidate list is exhausted. Mutated only by the
/// negotiation engine and response ingestion; terminal negotiations are
/// retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingNegotiation {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub duration_minutes: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub time_zone: String,
    pub host_email: String,
    pub candidate_slots: Vec<CandidateSlot>,
    pub current_try: usize,
    pub status: NegotiationStatus,
    pub responses: BTreeMap<String, AttendeeResponse>,
    pub selected_time: Option<CandidateSlot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped on every committed mutation
    pub version: u64,
}

impl MeetingNegotiation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: String,
        description: String,
        duration_minutes: i64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        time_zone: String,
        host_email: String,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            title,
            description,
            duration_minutes,
            window_start,
            window_end,
            time_zone,
            host_email,
            candidate_slots: Vec::new(),
            current_try: 0,
            status: NegotiationStatus::Pending,
            responses: BTreeMap::new(),
            selected_time: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Attach the ordered candidate slots found for this negotiation
    pub fn attach_candidates(&mut self, slots: Vec<CandidateSlot>) {
        self.candidate_slots = slots;
        self.current_try = 0;
    }

    /// Create one pending response record per attendee, overwriting any
    /// prior set
    pub fn initialize_responses(&mut self, routing: &[AttendeeRouting]) {
        self.responses = routing
            .iter()
            .map(|r| {
                (
                    r.email.clone(),
                    AttendeeResponse {
                        status: ResponseStatus::Pending,
                        response_time: None,
                        tenant_id: r.tenant_id.clone(),
                        chat_id: r.chat_id.clone(),
                    },
                )
            })
            .collect();
    }

    /// Record an attendee's answer
    ///
    /// Idempotent beyond the timestamp refresh: re-applying the same status
    /// only updates `response_time`.
    pub fn update_response(
        &mut self,
        email: &str,
        status: ResponseStatus,
        at: DateTime<Utc>,
    ) -> Result<&AttendeeResponse, SchedulerError> {
        let record = self
            .responses
            .get_mut(email)
            .ok_or_else(|| SchedulerError::UnknownAttendee(email.to_string()))?;

        record.status = status;
        record.response_time = Some(at);
        Ok(record)
    }

    /// Reset every attendee to pending, used when retrying the next
    /// candidate. Always resets the whole set, never a subset.
    pub fn reset_responses(&mut self) {
        for record in self.responses.values_mut() {
            record.status = ResponseStatus::Pending;
            record.response_time = None;
        }
    }

    pub fn response_summary(&self) -> ResponseSummary {
        let mut summary = ResponseSummary {
            pending: 0,
            accepted: 0,
            declined: 0,
            tentative: 0,
        };

        for record in self.responses.values() {
            match record.status {
                ResponseStatus::Pending => summary.pending += 1,
                ResponseStatus::Accepted => summary.accepted += 1,
                ResponseStatus::Declined => summary.declined += 1,
                ResponseStatus::Tentative => summary.tentative += 1,
            }
        }

        summary
    }

    /// The candidate slot currently proposed to attendees
    pub fn current_slot(&self) -> Option<&CandidateSlot> {
        self.candidate_slots.get(self.current_try)
    }

    /// Advance to the next candidate slot
    ///
    /// Returns the new index, or None when the candidate list is exhausted
    /// (the only path to the `failed` state).
    pub fn advance(&mut self) -> Option<usize> {
        if self.current_try + 1 >= self.candidate_slots.len() {
            return None;
        }
        self.current_try += 1;
        Some(self.current_try)
    }

    /// Resolve a webhook tenant id to the attendee it belongs to
    pub fn attendee_by_tenant(&self, tenant_id: &str) -> Option<&str> {
        self.responses
            .iter()
            .find(|(_, record)| record.tenant_id == tenant_id)
            .map(|(email, _)| email.as_str())
    }

    pub fn attendee_emails(&self) -> Vec<String> {
        self.responses.keys().cloned().collect()
    }
}
