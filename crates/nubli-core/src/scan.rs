//! Adapter access and key-turner discovery.
//!
//! This module finds the Bluetooth adapter, checks that it can scan, and
//! lists nearby Nuki locks by their iBeacon advertisement.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use nubli_types::uuid::APPLE_COMPANY_ID;

use crate::advertisement::{BeaconAdvertisement, parse_beacon};
use crate::error::{Error, Result};
use crate::util::{format_peripheral_id, lock_identifier};

/// How long the adapter has to accept a scan before it counts as not ready.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// A key-turner seen during a scan.
#[derive(Debug, Clone)]
pub struct DiscoveredLock {
    /// Lock identifier, as used in configuration and credential files.
    pub id: String,
    /// The peripheral ID for connecting.
    pub peripheral_id: PeripheralId,
    /// Advertised local name.
    pub name: Option<String>,
    /// RSSI signal strength.
    pub rssi: Option<i16>,
    /// The lock's beacon.
    pub beacon: BeaconAdvertisement,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan.
    pub duration: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(self, secs: u64) -> Self {
        self.duration(Duration::from_secs(secs))
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or_else(|| Error::adapter_not_ready("no Bluetooth adapter found"))
}

/// Wait once for an adapter that accepts a scan.
///
/// A powered-off adapter refuses to scan, so a scan that starts within
/// `readiness_timeout` is taken as proof the adapter is on. The scan is
/// stopped again before returning.
pub async fn wait_for_adapter(readiness_timeout: Duration) -> Result<Adapter> {
    let attempt = async {
        let adapter = get_adapter().await?;
        adapter.start_scan(ScanFilter::default()).await?;
        if let Err(e) = adapter.stop_scan().await {
            debug!("Failed to stop readiness scan: {}", e);
        }
        Ok::<_, Error>(adapter)
    };

    match timeout(readiness_timeout, attempt).await {
        Ok(Ok(adapter)) => Ok(adapter),
        Ok(Err(Error::AdapterNotReady(reason))) => Err(Error::AdapterNotReady(reason)),
        Ok(Err(e)) => Err(Error::adapter_not_ready(e.to_string())),
        Err(_) => Err(Error::adapter_not_ready(format!(
            "no response within {}s",
            readiness_timeout.as_secs()
        ))),
    }
}

/// Extract a key-turner beacon from a peripheral's advertisement, if any.
pub async fn keyturner_beacon(peripheral: &Peripheral) -> Option<BeaconAdvertisement> {
    let properties = peripheral.properties().await.ok()??;
    let data = properties.manufacturer_data.get(&APPLE_COMPANY_ID)?;
    parse_beacon(data).ok().filter(BeaconAdvertisement::is_keyturner)
}

/// Identifier of a peripheral, falling back to its platform ID.
pub async fn peripheral_identifier(peripheral: &Peripheral) -> String {
    match peripheral.properties().await {
        Ok(Some(props)) => lock_identifier(&props.address.to_string(), &peripheral.id()),
        _ => format_peripheral_id(&peripheral.id()).to_ascii_lowercase(),
    }
}

/// Scan for key-turners in range.
///
/// An empty list means nothing was found, not an error.
pub async fn scan_for_locks(options: ScanOptions) -> Result<Vec<DiscoveredLock>> {
    let adapter = get_adapter().await?;
    scan_with_adapter(&adapter, options).await
}

/// Scan for key-turners using a specific adapter.
pub async fn scan_with_adapter(
    adapter: &Adapter,
    options: ScanOptions,
) -> Result<Vec<DiscoveredLock>> {
    info!("Scanning for Smart Locks for {:?}", options.duration);

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    if let Err(e) = adapter.stop_scan().await {
        warn!("Failed to stop scan: {}", e);
    }

    let mut locks = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let Some(beacon) = keyturner_beacon(&peripheral).await else {
            continue;
        };
        let properties = peripheral.properties().await.ok().flatten();
        let lock = DiscoveredLock {
            id: peripheral_identifier(&peripheral).await,
            peripheral_id: peripheral.id(),
            name: properties.as_ref().and_then(|p| p.local_name.clone()),
            rssi: properties.as_ref().and_then(|p| p.rssi),
            beacon,
        };
        debug!(lock = %lock.id, rssi = ?lock.rssi, "Found Smart Lock");
        locks.push(lock);
    }

    info!("Found {} Smart Lock(s)", locks.len());
    Ok(locks)
}
