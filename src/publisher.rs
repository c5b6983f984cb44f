use crate::{datum::PublishRequest, error::PublishError};
use std::sync::{Arc, Mutex, PoisonError};

/// Default per-request datum limit of the publishing endpoint.
pub const MAX_DATUMS_PER_REQUEST: usize = 20;

/// The metrics publishing endpoint.
///
/// A publisher accepts one namespace and a bounded list of datums per call and reports success or
/// failure for that call. Accepting a request is all it promises; it owes no delivery guarantee
/// beyond that, and it does not enforce the endpoint's rate limit.
pub trait Publisher {
    /// Largest number of datums a single [`publish`](Self::publish) call may carry.
    fn max_batch_size(&self) -> usize {
        MAX_DATUMS_PER_REQUEST
    }

    /// Sends one request to the endpoint.
    ///
    /// # Errors
    /// Returns a [`PublishError`] when the endpoint rejects the request or cannot be reached.
    fn publish(&self, request: &PublishRequest) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for &P {
    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }

    fn publish(&self, request: &PublishRequest) -> Result<(), PublishError> {
        (**self).publish(request)
    }
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }

    fn publish(&self, request: &PublishRequest) -> Result<(), PublishError> {
        (**self).publish(request)
    }
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }

    fn publish(&self, request: &PublishRequest) -> Result<(), PublishError> {
        (**self).publish(request)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    requests: Vec<PublishRequest>,
    fail_after: Option<usize>,
}

/// An endpoint that keeps every accepted request in memory.
///
/// Clones share the same record, so a caller can hand one clone to a buffer and inspect the
/// other. Useful for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    state: Arc<Mutex<MemoryState>>,
    batch_size: usize,
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            batch_size: MAX_DATUMS_PER_REQUEST,
        }
    }
}

impl MemoryPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-request datum limit this endpoint advertises.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Rejects every request once `accepted` requests have been accepted.
    #[must_use]
    pub fn fail_after(self, accepted: usize) -> Self {
        self.lock().fail_after = Some(accepted);
        self
    }

    /// Stops rejecting requests.
    pub fn recover(&self) {
        self.lock().fail_after = None;
    }

    /// Every request accepted so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<PublishRequest> {
        self.lock().requests.clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Publisher for MemoryPublisher {
    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn publish(&self, request: &PublishRequest) -> Result<(), PublishError> {
        let mut state = self.lock();
        if state
            .fail_after
            .is_some_and(|limit| state.requests.len() >= limit)
        {
            return Err(PublishError::Rejected(format!(
                "{} datums for {} refused",
                request.metric_data.len(),
                request.namespace
            )));
        }
        state.requests.push(request.clone());
        Ok(())
    }
}
