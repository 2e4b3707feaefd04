use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::buffer::RequestState;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Background sweep that drops stale buffers of one request.
///
/// The task only holds a weak handle, so it ends on its own once the request
/// is gone; dropping the guard aborts it immediately.
#[derive(Debug)]
pub(crate) struct ExpirySweep {
    handle: JoinHandle<()>,
}

impl ExpirySweep {
    /// Returns `None` outside a Tokio runtime.
    pub(crate) fn spawn(
        state: Weak<Mutex<RequestState>>,
        timeout: Duration,
        span: tracing::Span,
    ) -> Option<Self> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let interval = sweep_interval(timeout);
        let handle = runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(state) = state.upgrade() else {
                    break;
                };
                let expired = state.lock().expire_buffers(Instant::now(), timeout);
                for key in expired {
                    tracing::warn!(parent: &span, buffer = %key, "dropped stale tool-call buffer");
                }
            }
        });
        Some(Self { handle })
    }
}

impl Drop for ExpirySweep {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) fn sweep_interval(timeout: Duration) -> Duration {
    (timeout / 3).max(MIN_SWEEP_INTERVAL)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn interval_is_a_third_of_timeout_with_floor() {
        assert_eq!(sweep_interval(Duration::from_secs(30)), Duration::from_secs(10));
        assert_eq!(sweep_interval(Duration::from_millis(60)), MIN_SWEEP_INTERVAL);
    }

    #[test]
    fn no_sweep_without_runtime() {
        let state = Arc::new(Mutex::new(RequestState::new()));
        let sweep = ExpirySweep::spawn(
            Arc::downgrade(&state),
            Duration::from_secs(1),
            tracing::Span::none(),
        );
        assert!(sweep.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_idle_buffers() {
        let state = Arc::new(Mutex::new(RequestState::new()));
        state.lock().shared_buffer().append("{\"a\"");
        let _sweep = ExpirySweep::spawn(
            Arc::downgrade(&state),
            Duration::from_secs(3),
            tracing::Span::none(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(state.lock().buffer_count(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(state.lock().buffer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_stops_when_state_is_gone() {
        let state = Arc::new(Mutex::new(RequestState::new()));
        let sweep = ExpirySweep::spawn(
            Arc::downgrade(&state),
            Duration::from_secs(3),
            tracing::Span::none(),
        )
        .unwrap();
        drop(state);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(sweep.handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sweep_no_longer_expires() {
        let state = Arc::new(Mutex::new(RequestState::new()));
        state.lock().shared_buffer().append("{\"a\"");
        let sweep = ExpirySweep::spawn(
            Arc::downgrade(&state),
            Duration::from_secs(3),
            tracing::Span::none(),
        )
        .unwrap();
        drop(sweep);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(state.lock().buffer_count(), 1);
    }
}
