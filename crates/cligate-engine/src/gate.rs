use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use cligate_core::GatewayError;

/// Bounds how many child processes one backend runs at once.
///
/// Permits are owned, so a slot travels with whatever holds it (a running
/// stream included) and is released when that holder is dropped.
#[derive(Clone, Debug)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, GatewayError> {
        if self.permits.available_permits() == 0 {
            debug!(capacity = self.capacity, "all process slots busy, waiting");
        }
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::process_failed(-1, "concurrency gate closed"))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
