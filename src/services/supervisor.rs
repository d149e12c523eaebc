use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::services::state_machine::NegotiationEngine;

struct Poller {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns one background poll task per active negotiation
///
/// Each poller ticks on a fixed interval, asks the engine to evaluate its
/// negotiation, and stops itself once the negotiation reaches a terminal
/// state or disappears from the store. The supervisor tracks the tasks so
/// shutdown can cancel them all.
pub struct PollSupervisor {
    engine: Arc<NegotiationEngine>,
    interval: Duration,
    pollers: Mutex<HashMap<Uuid, Poller>>,
}

impl PollSupervisor {
    pub fn new(engine: Arc<NegotiationEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            pollers: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling a negotiation; a second call for the same id while its
    /// poller is still alive is a no-op
    pub fn spawn_poller(&self, id: Uuid) {
        let mut pollers = match self.pollers.lock() {
            Ok(pollers) => pollers,
            Err(e) => {
                warn!("Poller registry lock poisoned: {}", e);
                return;
            }
        };

        if let Some(existing) = pollers.get(&id) {
            if !existing.handle.is_finished() {
                debug!("Poller for negotiation {} already running", id);
                return;
            }
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let engine = Arc::clone(&self.engine);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh
            // negotiation gets a full interval to collect responses.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("Poller for negotiation {} cancelled", id);
                        break;
                    }
                    _ = ticker.tick() => {
                        match engine.evaluate(&id).await {
                            Ok(negotiation) => {
                                if negotiation.status.is_terminal() {
                                    info!(
                                        "Negotiation {} reached {:?}, stopping poller",
                                        id, negotiation.status
                                    );
                                    break;
                                }
                            }
                            Err(SchedulerError::NegotiationNotFound(_)) => {
                                warn!("Negotiation {} vanished, stopping poller", id);
                                break;
                            }
                            Err(e) => {
                                warn!("Evaluation of negotiation {} failed: {}", id, e);
                            }
                        }
                    }
                }
            }
        });

        info!("Spawned poller for negotiation {}", id);
        pollers.insert(id, Poller { token, handle });
    }

    /// Cancel the poller for one negotiation, if any
    pub fn stop(&self, id: &Uuid) {
        if let Ok(mut pollers) = self.pollers.lock() {
            if let Some(poller) = pollers.remove(id) {
                poller.token.cancel();
                poller.handle.abort();
                info!("Stopped poller for negotiation {}", id);
            }
        }
    }

    /// Cancel every poller, used during graceful shutdown
    pub fn shutdown(&self) {
        if let Ok(mut pollers) = self.pollers.lock() {
            let count = pollers.len();
            for (_, poller) in pollers.drain() {
                poller.token.cancel();
                poller.handle.abort();
            }
            if count > 0 {
                info!("Stopped {} pollers", count);
            }
        }
    }

    pub fn is_running(&self, id: &Uuid) -> bool {
        self.pollers
            .lock()
            .map(|pollers| {
                pollers
                    .get(id)
                    .map(|p| !p.handle.is_finished())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.pollers
            .lock()
            .map(|pollers| {
                pollers
                    .values()
                    .filter(|p| !p.handle.is_finished())
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Drop for PollSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
