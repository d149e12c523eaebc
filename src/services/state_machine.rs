use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::GraphApi;
use crate::error::SchedulerError;
use crate::models::common::ScheduleMeetingRequest;
use crate::models::negotiation::{
    AttendeeRouting, MeetingNegotiation, NegotiationStatus,
};
use crate::services::notifier::NotificationDispatcher;
use crate::services::slot_finder;
use crate::services::store::NegotiationStore;

/// Drives negotiations through their lifecycle
///
/// Every transition follows the same shape: read one snapshot, decide on it,
/// commit with the snapshot's version, and only then perform side effects.
/// When two evaluations race, the version check lets exactly one of them
/// win; the loser re-reads and reports the state the winner produced.
pub struct NegotiationEngine {
    graph: Arc<dyn GraphApi>,
    store: Arc<NegotiationStore>,
    notifier: NotificationDispatcher,
}

impl NegotiationEngine {
    pub fn new(
        graph: Arc<dyn GraphApi>,
        store: Arc<NegotiationStore>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            graph,
            store,
            notifier,
        }
    }

    /// Create a negotiation and send the first proposal round
    pub async fn start_negotiation(
        &self,
        request: ScheduleMeetingRequest,
    ) -> Result<MeetingNegotiation, SchedulerError> {
        if request.attendees.is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "at least one attendee is required".to_string(),
            ));
        }
        if request.title.trim().is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "title must not be empty".to_string(),
            ));
        }

        let host = self.graph.get_user().await?;
        let host_email = host.email().to_string();

        // Resolve each attendee's directory id and one-on-one chat up front;
        // the directory id becomes the tenant id embedded in proposal cards.
        let mut routing = Vec::with_capacity(request.attendees.len());
        for email in &request.attendees {
            let user = self.graph.find_user(email).await?;

            let chat_id = match self.graph.resolve_channel(&user.id).await {
                Ok(chat_id) => chat_id,
                Err(e) => {
                    warn!("Chat resolution failed for {}: {}", email, e);
                    None
                }
            };

            routing.push(AttendeeRouting {
                email: email.clone(),
                tenant_id: user.id,
                chat_id,
            });
        }

        let slots = slot_finder::find_slots(
            self.graph.as_ref(),
            &host_email,
            &request.attendees,
            request.window_start,
            request.window_end,
            request.duration_minutes,
            &request.time_zone,
        )
        .await?;

        let mut negotiation = MeetingNegotiation::new(
            request.title,
            request.description,
            request.duration_minutes,
            request.window_start,
            request.window_end,
            request.time_zone,
            host_email,
        );
        negotiation.attach_candidates(slots);
        negotiation.initialize_responses(&routing);

        let expected_version = negotiation.version;
        self.store.insert(negotiation.clone())?;

        info!(
            "Started negotiation {} with {} attendees and {} candidates",
            negotiation.id,
            negotiation.responses.len(),
            negotiation.candidate_slots.len()
        );

        // Commit the waiting transition before any card goes out: a webhook
        // answer can arrive the moment a card is delivered, and a commit
        // after dispatch would race it.
        negotiation.status = NegotiationStatus::Waiting;
        let committed = self.store.commit(negotiation, expected_version)?;

        if let Some(slot) = committed.current_slot().cloned() {
            self.notifier
                .dispatch(self.graph.as_ref(), &committed, &slot)
                .await;
        }

        Ok(committed)
    }

    /// Evaluate one negotiation against the collected responses
    ///
    /// Performs at most one state transition per call. Terminal negotiations
    /// are returned unchanged, whatever responses arrived since.
    pub async fn evaluate(&self, id: &Uuid) -> Result<MeetingNegotiation, SchedulerError> {
        let snapshot = self
            .store
            .get(id)
            .ok_or(SchedulerError::NegotiationNotFound(*id))?;

        if snapshot.status != NegotiationStatus::Waiting {
            return Ok(snapshot);
        }

        let summary = snapshot.response_summary();

        if summary.declined > 0 {
            return self.apply_decline(snapshot).await;
        }

        if summary.pending == 0 && summary.total() > 0 {
            return self.finalize(snapshot).await;
        }

        Ok(snapshot)
    }

    /// A decline invalidates the current round: move to the next candidate
    /// and reset every response, or fail when no candidates remain
    pub(crate) async fn apply_decline(
        &self,
        snapshot: MeetingNegotiation,
    ) -> Result<MeetingNegotiation, SchedulerError> {
        let expected_version = snapshot.version;
        let mut updated = snapshot;

        let retrying = match updated.advance() {
            Some(next_try) => {
                info!(
                    "Negotiation {} retrying with candidate {} of {}",
                    updated.id,
                    next_try + 1,
                    updated.candidate_slots.len()
                );
                updated.reset_responses();
                true
            }
            None => {
                info!(
                    "Negotiation {} exhausted all {} candidates, failing",
                    updated.id,
                    updated.candidate_slots.len()
                );
                updated.status = NegotiationStatus::Failed;
                false
            }
        };

        let id = updated.id;
        let committed = match self.store.commit(updated, expected_version) {
            Ok(committed) => committed,
            Err(SchedulerError::VersionConflict) => return self.reread_after_conflict(&id),
            Err(e) => return Err(e),
        };

        // Side effects only after the transition is durable
        if retrying {
            if let Some(slot) = committed.current_slot().cloned() {
                self.notifier
                    .dispatch(self.graph.as_ref(), &committed, &slot)
                    .await;
            }
        }

        Ok(committed)
    }

    /// Everyone answered without declining: select the slot and create the
    /// real calendar event
    async fn finalize(
        &self,
        snapshot: MeetingNegotiation,
    ) -> Result<MeetingNegotiation, SchedulerError> {
        let expected_version = snapshot.version;
        let mut updated = snapshot;

        let slot = match updated.current_slot().cloned() {
            Some(slot) => slot,
            None => {
                // A waiting negotiation always has a current slot; treat a
                // missing one as exhaustion rather than panic.
                error!(
                    "Negotiation {} waiting with no current slot",
                    updated.id
                );
                updated.status = NegotiationStatus::Failed;
                let id = updated.id;
                return match self.store.commit(updated, expected_version) {
                    Ok(committed) => Ok(committed),
                    Err(SchedulerError::VersionConflict) => self.reread_after_conflict(&id),
                    Err(e) => Err(e),
                };
            }
        };

        updated.status = NegotiationStatus::Done;
        updated.selected_time = Some(slot.clone());

        let id = updated.id;
        let committed = match self.store.commit(updated, expected_version) {
            Ok(committed) => committed,
            Err(SchedulerError::VersionConflict) => return self.reread_after_conflict(&id),
            Err(e) => return Err(e),
        };

        info!(
            "Negotiation {} done, scheduling event at {}",
            committed.id, slot.start
        );

        let mut event_attendees = committed.attendee_emails();
        event_attendees.push(committed.host_email.clone());

        // The negotiation is already terminal; an event creation failure is
        // reported but does not roll the state back.
        if let Err(e) = self
            .graph
            .create_event(
                &committed.title,
                slot.start,
                slot.end,
                &event_attendees,
                &committed.description,
                &committed.time_zone,
            )
            .await
        {
            error!(
                "Failed to create calendar event for negotiation {}: {}",
                committed.id, e
            );
        }

        Ok(committed)
    }

    /// The losing side of an evaluation race performs no side effects and
    /// reports whatever state the winner committed
    fn reread_after_conflict(&self, id: &Uuid) -> Result<MeetingNegotiation, SchedulerError> {
        debug!("Lost evaluation race on negotiation {}, re-reading", id);
        self.store
            .get(id)
            .ok_or(SchedulerError::NegotiationNotFound(*id))
    }
}
