//! btleplug-backed lock transport.
//!
//! [`BleTransport`] turns the adapter's advertisement events into
//! [`SmartLock`] handles and lock events:
//!
//! - the first key-turner beacon from a peripheral yields a new handle,
//! - every beacon refreshes the [`StaleWatchdog`],
//! - a rising edge of the beacon's activity flag raises
//!   [`LockEvent::ActivityLogChanged`].
//!
//! A handle nobody is subscribed to (its last attach failed) is yielded
//! again on its next activity or recovery, so the engine gets another
//! attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, ScanFilter};
use btleplug::platform::{Adapter, PeripheralId};
use futures::StreamExt;
use futures::channel::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use nubli_types::uuid::APPLE_COMPANY_ID;

use crate::advertisement::{ActivityTracker, parse_beacon};
use crate::device::{BleSmartLock, ConnectionConfig, KeyturnerProtocol};
use crate::error::{Error, Result};
use crate::events::LockEvent;
use crate::scan::{DEFAULT_READINESS_TIMEOUT, peripheral_identifier, wait_for_adapter};
use crate::traits::{AdapterReadiness, DiscoveryStream, LockTransport, SharedLock, SmartLock};
use crate::watchdog::{DEFAULT_STALE_TIMEOUT, StaleWatchdog};

struct Tracked<P: ?Sized> {
    lock: Arc<BleSmartLock<P>>,
    activity: ActivityTracker,
}

/// Discovers Nuki locks over Bluetooth Low Energy.
pub struct BleTransport<P: ?Sized> {
    protocol: Arc<P>,
    connection: ConnectionConfig,
    readiness_timeout: Duration,
    watchdog: Arc<StaleWatchdog>,
    adapter: Mutex<Option<Adapter>>,
    started: AtomicBool,
    cancel_token: CancellationToken,
}

impl<P: ?Sized> std::fmt::Debug for BleTransport<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("connection", &self.connection)
            .field("readiness_timeout", &self.readiness_timeout)
            .field("stale_timeout", &self.watchdog.window())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

impl<P: KeyturnerProtocol + ?Sized> BleTransport<P> {
    /// Create a transport using `protocol` for the encrypted exchange.
    ///
    /// Background tasks stop when `cancel_token` is cancelled.
    pub fn new(protocol: Arc<P>, cancel_token: CancellationToken) -> Self {
        Self {
            protocol,
            connection: ConnectionConfig::default(),
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            watchdog: Arc::new(StaleWatchdog::new(DEFAULT_STALE_TIMEOUT)),
            adapter: Mutex::new(None),
            started: AtomicBool::new(false),
            cancel_token,
        }
    }

    /// Set connection timeouts for every handle.
    #[must_use]
    pub fn with_connection_config(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Set how long a single readiness check may take.
    #[must_use]
    pub fn with_readiness_timeout(mut self, readiness_timeout: Duration) -> Self {
        self.readiness_timeout = readiness_timeout;
        self
    }

    /// Set the advertisement silence window before a lock is stale.
    #[must_use]
    pub fn with_stale_timeout(mut self, stale_timeout: Duration) -> Self {
        self.watchdog = Arc::new(StaleWatchdog::new(stale_timeout));
        self
    }

    /// The stale watchdog shared with the scan task.
    pub fn watchdog(&self) -> &Arc<StaleWatchdog> {
        &self.watchdog
    }
}

#[async_trait]
impl<P: KeyturnerProtocol + ?Sized> AdapterReadiness for BleTransport<P> {
    async fn wait_for_adapter(&self) -> Result<()> {
        let adapter = wait_for_adapter(self.readiness_timeout).await?;
        *self.adapter.lock().await = Some(adapter);
        Ok(())
    }
}

#[async_trait]
impl<P: KeyturnerProtocol + ?Sized> LockTransport for BleTransport<P> {
    async fn discover(&self) -> Result<DiscoveryStream> {
        if self.started.load(Ordering::SeqCst) {
            return Err(Error::InvalidData("discovery already started".into()));
        }
        let adapter = self
            .adapter
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::adapter_not_ready("adapter not initialized"))?;

        let mut events = adapter.events().await?;
        adapter.start_scan(ScanFilter::default()).await?;
        self.started.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded::<SharedLock>();
        let watchdog = Arc::clone(&self.watchdog);
        watchdog.start(self.cancel_token.child_token());

        let protocol = Arc::clone(&self.protocol);
        let connection = self.connection;
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            let mut known: HashMap<PeripheralId, Tracked<P>> = HashMap::new();
            loop {
                let event = tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Lock discovery cancelled, shutting down");
                        break;
                    }
                    event = events.next() => match event {
                        Some(event) => event,
                        None => {
                            warn!("Adapter event stream ended");
                            break;
                        }
                    },
                };

                let CentralEvent::ManufacturerDataAdvertisement {
                    id,
                    manufacturer_data,
                } = event
                else {
                    continue;
                };
                let Some(beacon) = manufacturer_data
                    .get(&APPLE_COMPANY_ID)
                    .and_then(|data| parse_beacon(data).ok())
                    .filter(|beacon| beacon.is_keyturner())
                else {
                    continue;
                };
                let flag = beacon.activity_flag();

                if let Some(tracked) = known.get_mut(&id) {
                    let lock = &tracked.lock;
                    let recovered = watchdog.observe(lock.id());
                    let activity = tracked.activity.update(flag);
                    if activity {
                        debug!(lock = %lock.id(), "Activity flag changed");
                        lock.events().send(LockEvent::ActivityLogChanged);
                    }
                    if (recovered || activity) && lock.events().receiver_count() == 0 {
                        debug!(lock = %lock.id(), "Offering unattached Smart Lock again");
                        if tx.unbounded_send(Arc::clone(lock) as SharedLock).is_err() {
                            break;
                        }
                    }
                    continue;
                }

                let peripheral = match adapter.peripheral(&id).await {
                    Ok(peripheral) => peripheral,
                    Err(e) => {
                        debug!("Peripheral vanished before it could be tracked: {}", e);
                        continue;
                    }
                };
                let lock_id = peripheral_identifier(&peripheral).await;
                debug!(lock = %lock_id, "New key-turner advertising");

                let lock = Arc::new(BleSmartLock::new(
                    lock_id,
                    peripheral,
                    Arc::clone(&protocol),
                    connection,
                ));
                watchdog.register(lock.id(), lock.events().clone());
                let mut activity = ActivityTracker::default();
                activity.update(flag);
                known.insert(
                    id,
                    Tracked {
                        lock: Arc::clone(&lock),
                        activity,
                    },
                );

                if tx.unbounded_send(lock as SharedLock).is_err() {
                    break;
                }
            }

            if let Err(e) = adapter.stop_scan().await {
                debug!("Failed to stop scan: {}", e);
            }
        });

        Ok(rx.boxed())
    }
}
