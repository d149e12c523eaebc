use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{info, warn};

use crate::client::{GraphApi, MeetingTimeSuggestion};
use crate::error::SchedulerError;
use crate::models::negotiation::{CandidateSlot, SlotAvailability};

/// Find ordered candidate slots for a meeting
///
/// The host is always included in the availability query alongside the
/// attendees. Suggestions come back ranked by confidence and that order is
/// preserved; it becomes the retry priority of the negotiation.
pub async fn find_slots(
    graph: &dyn GraphApi,
    host_email: &str,
    attendees: &[String],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    duration_minutes: i64,
    time_zone: &str,
) -> Result<Vec<CandidateSlot>, SchedulerError> {
    if attendees.is_empty() {
        return Err(SchedulerError::InvalidRequest(
            "at least one attendee is required".to_string(),
        ));
    }
    if duration_minutes <= 0 {
        return Err(SchedulerError::InvalidRequest(
            "duration_minutes must be positive".to_string(),
        ));
    }
    if window_end <= window_start {
        return Err(SchedulerError::InvalidRequest(
            "window_end must be after window_start".to_string(),
        ));
    }

    let mut emails: Vec<String> = attendees.to_vec();
    if !emails.iter().any(|e| e.eq_ignore_ascii_case(host_email)) {
        emails.push(host_email.to_string());
    }

    let suggestions = graph
        .find_meeting_times(
            &emails,
            window_start,
            window_end,
            duration_minutes,
            time_zone,
        )
        .await
        .map_err(SchedulerError::Graph)?;

    let slots: Vec<CandidateSlot> = suggestions
        .iter()
        .filter_map(convert_suggestion)
        .collect();

    if slots.is_empty() {
        info!(
            "No usable meeting times in window {} - {}",
            window_start, window_end
        );
        return Err(SchedulerError::NoAvailability);
    }

    info!("Found {} candidate slots", slots.len());
    Ok(slots)
}

fn convert_suggestion(suggestion: &MeetingTimeSuggestion) -> Option<CandidateSlot> {
    let start = parse_graph_time(&suggestion.meeting_time_slot.start.date_time)?;
    let end = parse_graph_time(&suggestion.meeting_time_slot.end.date_time)?;

    let attendee_availability = suggestion
        .attendee_availability
        .iter()
        .map(|a| SlotAvailability {
            email: a.attendee.email_address.address.clone(),
            availability: a.availability.clone(),
        })
        .collect();

    Some(CandidateSlot {
        start,
        end,
        confidence: suggestion.confidence,
        attendee_availability,
    })
}

/// Parse a Graph dateTime string, which arrives without an offset when the
/// Prefer header pins the timezone to UTC
fn parse_graph_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    match NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            warn!("Skipping suggestion with unparseable time {}: {}", value, e);
            None
        }
    }
}
