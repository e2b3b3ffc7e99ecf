//! Adapter readiness loop.
//!
//! Scanning cannot start until the Bluetooth adapter is powered on. The
//! loop waits for readiness, retrying forever on a fixed interval, and then
//! starts discovery. There is no backoff and no attempt limit: an adapter
//! that never comes up keeps the loop waiting until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::traits::{AdapterReadiness, DiscoveryStream, LockTransport};

/// Delay between readiness attempts.
pub const ADAPTER_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Phase of the readiness loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessPhase {
    /// Waiting for the adapter (initially or after a failed attempt).
    WaitingForAdapter,
    /// Adapter is usable, scan not yet started.
    Ready,
    /// Discovery is running.
    Scanning,
}

/// Waits for the adapter and then starts scanning.
pub struct AdapterReadinessLoop<T: ?Sized> {
    transport: Arc<T>,
    retry_interval: Duration,
    phase: watch::Sender<ReadinessPhase>,
}

impl<T: ?Sized> std::fmt::Debug for AdapterReadinessLoop<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterReadinessLoop")
            .field("retry_interval", &self.retry_interval)
            .field("phase", &*self.phase.borrow())
            .finish()
    }
}

impl<T: ?Sized> AdapterReadinessLoop<T> {
    /// Create a loop with the default 60 second retry interval.
    pub fn new(transport: Arc<T>) -> Self {
        let (phase, _) = watch::channel(ReadinessPhase::WaitingForAdapter);
        Self {
            transport,
            retry_interval: ADAPTER_RETRY_INTERVAL,
            phase,
        }
    }

    /// Override the retry interval.
    #[must_use]
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> ReadinessPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes.
    pub fn subscribe(&self) -> watch::Receiver<ReadinessPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: ReadinessPhase) {
        self.phase.send_replace(phase);
    }
}

impl<T: AdapterReadiness + ?Sized> AdapterReadinessLoop<T> {
    /// Wait until the adapter reports ready.
    ///
    /// Each failed attempt is logged and followed by exactly one retry
    /// interval. Returns as soon as an attempt succeeds.
    pub async fn wait_until_ready(&self) {
        loop {
            self.set_phase(ReadinessPhase::WaitingForAdapter);
            match self.transport.wait_for_adapter().await {
                Ok(()) => {
                    self.set_phase(ReadinessPhase::Ready);
                    info!("Bluetooth adapter is ready");
                    return;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Bluetooth adapter isn't ready. Trying again in {} seconds",
                        self.retry_interval.as_secs()
                    );
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }
}

impl<T: LockTransport + ?Sized> AdapterReadinessLoop<T> {
    /// Wait for the adapter, then start discovery.
    ///
    /// A failure to start discovery sends the loop back to waiting for the
    /// adapter.
    pub async fn start(&self) -> DiscoveryStream {
        loop {
            self.wait_until_ready().await;
            match self.transport.discover().await {
                Ok(stream) => {
                    self.set_phase(ReadinessPhase::Scanning);
                    info!("Scanning for Smart Locks");
                    return stream;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Failed to start scanning. Trying again in {} seconds",
                        self.retry_interval.as_secs()
                    );
                    self.set_phase(ReadinessPhase::WaitingForAdapter);
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[tokio::test(start_paused = true)]
    async fn test_ready_immediately() {
        let transport = Arc::new(MockTransport::new());
        let readiness = AdapterReadinessLoop::new(Arc::clone(&transport));
        assert_eq!(readiness.phase(), ReadinessPhase::WaitingForAdapter);

        let _stream = readiness.start().await;

        assert_eq!(readiness.phase(), ReadinessPhase::Scanning);
        let attempts = transport.readiness_attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(transport.scan_started(), Some(attempts[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_sixty_seconds() {
        let transport = Arc::new(MockTransport::new());
        transport.set_readiness_failures(1);
        let readiness = AdapterReadinessLoop::new(Arc::clone(&transport));

        let _stream = readiness.start().await;

        let attempts = transport.readiness_attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1] - attempts[0], Duration::from_secs(60));
        // Scanning begins with no further delay.
        assert_eq!(transport.scan_started(), Some(attempts[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_does_not_grow() {
        let transport = Arc::new(MockTransport::new());
        transport.set_readiness_failures(4);
        let readiness = AdapterReadinessLoop::new(Arc::clone(&transport))
            .with_retry_interval(Duration::from_secs(5));

        readiness.wait_until_ready().await;

        let attempts = transport.readiness_attempts();
        assert_eq!(attempts.len(), 5);
        for pair in attempts.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(5));
        }
        assert_eq!(readiness.phase(), ReadinessPhase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_failure_goes_back_to_waiting() {
        let transport = Arc::new(MockTransport::new());
        transport.set_discover_failures(1);
        let readiness = AdapterReadinessLoop::new(Arc::clone(&transport));

        let _stream = readiness.start().await;

        let attempts = transport.readiness_attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1] - attempts[0], Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_watch() {
        let transport = Arc::new(MockTransport::new());
        let readiness = AdapterReadinessLoop::new(transport);
        let rx = readiness.subscribe();
        let _stream = readiness.start().await;
        assert_eq!(*rx.borrow(), ReadinessPhase::Scanning);
    }
}
