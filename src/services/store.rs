use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::negotiation::{
    AttendeeResponse, MeetingNegotiation, NegotiationStatus, ResponseStatus,
};

/// Durable store for meeting negotiations
///
/// Negotiations live in an in-memory map guarded by a mutex; every mutation
/// rewrites a JSON snapshot on disk so poll-driven evaluation survives
/// process restarts. Writers commit with an optimistic version check, which
/// is what keeps concurrent polls from performing the same retry twice.
pub struct NegotiationStore {
    path: PathBuf,
    inner: Mutex<HashMap<Uuid, MeetingNegotiation>>,
}

impl NegotiationStore {
    pub fn new(path: &str) -> Self {
        let negotiations = Self::load(Path::new(path));

        if !negotiations.is_empty() {
            info!(
                "Loaded {} negotiations from {}",
                negotiations.len(),
                path
            );
        }

        Self {
            path: PathBuf::from(path),
            inner: Mutex::new(negotiations),
        }
    }

    fn load(path: &Path) -> HashMap<Uuid, MeetingNegotiation> {
        if !path.exists() {
            return HashMap::new();
        }

        match File::open(path) {
            Ok(file) => match serde_json::from_reader(file) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Failed to parse negotiation snapshot, starting empty: {}", e);
                    HashMap::new()
                }
            },
            Err(e) => {
                warn!("Failed to open negotiation snapshot, starting empty: {}", e);
                HashMap::new()
            }
        }
    }

    // Caller must hold the inner lock so the snapshot matches the map.
    fn persist(&self, negotiations: &HashMap<Uuid, MeetingNegotiation>) -> Result<(), SchedulerError> {
        let file = File::create(&self.path)
            .map_err(|e| SchedulerError::Storage(format!("failed to create snapshot file: {}", e)))?;

        serde_json::to_writer_pretty(file, negotiations)
            .map_err(|e| SchedulerError::Storage(format!("failed to write snapshot: {}", e)))?;

        Ok(())
    }

    /// Insert a newly created negotiation
    pub fn insert(&self, negotiation: MeetingNegotiation) -> Result<(), SchedulerError> {
        let mut negotiations = self
            .inner
            .lock()
            .map_err(|e| SchedulerError::Storage(format!("lock poisoned: {}", e)))?;

        info!(
            "Storing negotiation {} with {} candidate slots",
            negotiation.id,
            negotiation.candidate_slots.len()
        );

        negotiations.insert(negotiation.id, negotiation);
        self.persist(&negotiations)
    }

    /// Read a consistent snapshot of one negotiation
    pub fn get(&self, id: &Uuid) -> Option<MeetingNegotiation> {
        let negotiations = self.inner.lock().ok()?;
        negotiations.get(id).cloned()
    }

    /// Commit a mutated negotiation, guarded by an optimistic version check
    ///
    /// Fails with `VersionConflict` when the stored version no longer matches
    /// the snapshot the caller based its decision on; the caller must then
    /// re-read and treat the evaluation as already performed elsewhere.
    pub fn commit(
        &self,
        mut negotiation: MeetingNegotiation,
        expected_version: u64,
    ) -> Result<MeetingNegotiation, SchedulerError> {
        let mut negotiations = self
            .inner
            .lock()
            .map_err(|e| SchedulerError::Storage(format!("lock poisoned: {}", e)))?;

        let stored = negotiations
            .get(&negotiation.id)
            .ok_or(SchedulerError::NegotiationNotFound(negotiation.id))?;

        if stored.version != expected_version {
            debug!(
                "Version conflict on negotiation {}: expected {}, found {}",
                negotiation.id, expected_version, stored.version
            );
            return Err(SchedulerError::VersionConflict);
        }

        negotiation.version = expected_version + 1;
        negotiation.updated_at = Utc::now();

        let committed = negotiation.clone();
        negotiations.insert(negotiation.id, negotiation);
        self.persist(&negotiations)?;

        Ok(committed)
    }

    /// Apply a webhook response, correlated by negotiation id and tenant id
    ///
    /// The lookup and the write happen under one lock acquisition, so the
    /// single-record update is atomic with respect to concurrent polls.
    /// Late responses against a terminal negotiation are still recorded for
    /// audit; the state machine will never act on them.
    pub fn update_response(
        &self,
        id: &Uuid,
        tenant_id: &str,
        status: ResponseStatus,
        at: DateTime<Utc>,
    ) -> Result<(String, AttendeeResponse), SchedulerError> {
        let mut negotiations = self
            .inner
            .lock()
            .map_err(|e| SchedulerError::Storage(format!("lock poisoned: {}", e)))?;

        let negotiation = negotiations
            .get_mut(id)
            .ok_or(SchedulerError::NegotiationNotFound(*id))?;

        let email = negotiation
            .attendee_by_tenant(tenant_id)
            .ok_or_else(|| SchedulerError::AttendeeNotFound(tenant_id.to_string()))?
            .to_string();

        let record = negotiation.update_response(&email, status, at)?.clone();
        negotiation.version += 1;
        negotiation.updated_at = at;

        info!(
            "Recorded response {:?} from {} for negotiation {}",
            status, email, id
        );

        self.persist(&negotiations)?;
        Ok((email, record))
    }

    /// Ids of all negotiations still waiting on responses
    ///
    /// Used at startup to resume pollers for negotiations that were in
    /// flight when the process last stopped.
    pub fn waiting_ids(&self) -> Vec<Uuid> {
        match self.inner.lock() {
            Ok(negotiations) => negotiations
                .values()
                .filter(|n| n.status == NegotiationStatus::Waiting)
                .map(|n| n.id)
                .collect(),
            Err(e) => {
                error!("Failed to list waiting negotiations: {}", e);
                Vec::new()
            }
        }
    }
}

/// Create a singleton negotiation store
pub fn create_negotiation_store() -> Arc<NegotiationStore> {
    // Default path with environment variable override
    let default_path = "/app/data/negotiations.json";
    let json_path =
        std::env::var("NEGOTIATION_DATABASE_PATH").unwrap_or_else(|_| default_path.to_string());

    // Create the data directory if it doesn't exist and we're using the default path
    if json_path == default_path {
        let dir = Path::new(default_path).parent().unwrap();
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("Failed to create data directory: {}", e);
            panic!("Failed to create data directory: {}", e);
        }
    }

    Arc::new(NegotiationStore::new(&json_path))
}
