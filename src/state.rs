mod request_id;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::fixes::FixConfigStore;
use crate::session::{RequestSession, SessionRegistry};
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub fixes: Arc<FixConfigStore>,
    pub sessions: Arc<SessionRegistry>,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport, fixes: FixConfigStore) -> Self {
        Self {
            config,
            transport,
            fixes: Arc::new(fixes),
            sessions: Arc::new(SessionRegistry::new()),
            request_ids: RequestIdGenerator::new(),
        }
    }

    pub fn next_request_seq(&self) -> u64 {
        self.request_ids.next_seq()
    }

    #[must_use]
    pub fn correlation_token(&self, request_seq: u64) -> String {
        self.request_ids.correlation_token(request_seq)
    }

    /// Open the per-request session: registered for health reporting and
    /// swept with the buffer timeout active right now.
    #[must_use]
    pub fn open_session(&self, request_seq: u64) -> RequestSession {
        let timeout = self.fixes.snapshot().settings.buffer_timeout();
        RequestSession::new(self.correlation_token(request_seq))
            .with_expiry(timeout)
            .registered(&self.sessions)
    }
}
