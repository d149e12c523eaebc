use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::negotiation::ResponseStatus;
use crate::services::store::NegotiationStore;

/// The recorded result of one webhook callback
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub email: String,
    pub status: ResponseStatus,
}

/// Records attendee responses arriving over the webhook
///
/// Ingestion only writes the response record; it never evaluates the
/// negotiation. The poll loop picks the change up on its next tick, which
/// keeps webhook handling fast and the transition logic in one place.
pub struct ResponseIngestor {
    store: Arc<NegotiationStore>,
}

impl ResponseIngestor {
    pub fn new(store: Arc<NegotiationStore>) -> Self {
        Self { store }
    }

    pub fn ingest(
        &self,
        negotiation_id: Uuid,
        tenant_id: &str,
        response: ResponseStatus,
    ) -> Result<IngestOutcome, SchedulerError> {
        let (email, record) =
            self.store
                .update_response(&negotiation_id, tenant_id, response, Utc::now())?;

        debug!(
            "Ingested {:?} from {} for negotiation {}",
            record.status, email, negotiation_id
        );

        Ok(IngestOutcome {
            email,
            status: record.status,
        })
    }
}
