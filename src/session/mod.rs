//! Per-request state: tool-call buffers, the XML content buffer, sent-call
//! signatures, and the background sweep that expires idle buffers.

pub mod buffer;
pub mod dedup;
mod lifecycle;
pub mod registry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

pub use self::buffer::{RequestState, ToolCallBuffer, SHARED_BUFFER_KEY};
pub use self::dedup::{DuplicateDetector, Sighting};
pub use self::registry::{RegistryStats, SessionRegistry};

use self::lifecycle::ExpirySweep;
use self::registry::Registration;
use crate::error::ProxyError;

/// How a proxied stream ended, recorded before the session is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    BackendDisconnected,
    /// The response body was dropped before the stream ran to its end.
    ClientDisconnected,
}

/// Owner of one request's [`RequestState`].
///
/// Created when a request arrives and dropped when its response body is done
/// or abandoned. Dropping releases the expiry sweep and the registry entry.
pub struct RequestSession {
    request_id: Arc<str>,
    state: Arc<Mutex<RequestState>>,
    span: tracing::Span,
    started_at: Instant,
    outcome: Option<SessionOutcome>,
    status: Option<u16>,
    sweep: Option<ExpirySweep>,
    registration: Option<Registration>,
}

impl RequestSession {
    #[must_use]
    pub fn new(request_id: impl Into<Arc<str>>) -> Self {
        let request_id = request_id.into();
        let span = tracing::info_span!("request", request_id = %request_id);
        Self {
            request_id,
            state: Arc::new(Mutex::new(RequestState::new())),
            span,
            started_at: Instant::now(),
            outcome: None,
            status: None,
            sweep: None,
            registration: None,
        }
    }

    /// Expire buffers idle for longer than `timeout`. No-op outside a runtime.
    #[must_use]
    pub fn with_expiry(mut self, timeout: Duration) -> Self {
        self.sweep = ExpirySweep::spawn(Arc::downgrade(&self.state), timeout, self.span.clone());
        self
    }

    #[must_use]
    pub fn registered(mut self, registry: &Arc<SessionRegistry>) -> Self {
        self.registration = Some(registry.register(&self.state));
        self
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn lock(&self) -> MutexGuard<'_, RequestState> {
        self.state.lock()
    }

    pub fn finish(&mut self, outcome: SessionOutcome) {
        self.outcome = Some(outcome);
    }

    /// Upstream status code, reported when the session closes.
    pub fn record_status(&mut self, status: http::StatusCode) {
        self.status = Some(status.as_u16());
    }

    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }
}

impl Drop for RequestSession {
    fn drop(&mut self) {
        self.sweep.take();
        let leftover = self.state.lock().buffer_count();
        let elapsed_ms = self.started_at.elapsed().as_millis();
        match self.outcome.unwrap_or(SessionOutcome::ClientDisconnected) {
            SessionOutcome::Completed => {
                tracing::info!(
                    parent: &self.span,
                    status = self.status,
                    elapsed_ms,
                    "request finished"
                );
            }
            SessionOutcome::BackendDisconnected => {
                tracing::warn!(
                    parent: &self.span,
                    elapsed_ms,
                    discarded_buffers = leftover,
                    error = %ProxyError::BackendDisconnected,
                    "request ended early"
                );
            }
            SessionOutcome::ClientDisconnected => {
                tracing::info!(
                    parent: &self.span,
                    status = self.status,
                    elapsed_ms,
                    discarded_buffers = leftover,
                    error = %ProxyError::ClientDisconnected,
                    "request ended early"
                );
            }
        }
    }
}
