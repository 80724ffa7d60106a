//! Connection manager: connect/disconnect lifecycle for the single
//! active peripheral, plus its resolved GATT endpoint list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::directory::DeviceDirectory;
use crate::error::BleError;
use crate::scanner::AdapterSelection;
use crate::transport::BleTransport;
use crate::types::{AdapterInfo, DeviceState, GattEndpoint, GattService};

/// State of the one live link. Keyed by the peripheral's canonical
/// address, never by a position in the growable directory, so later
/// discoveries cannot invalidate it.
pub(crate) struct ActiveConnection {
    pub address: String,
    pub identifier: String,
    pub adapter: AdapterInfo,
    pub services: Vec<GattService>,
    pub endpoints: Vec<GattEndpoint>,
    /// Cancellation token per subscribed endpoint handle.
    pub notify_tasks: HashMap<usize, CancellationToken>,
}

pub(crate) type SharedActive = Arc<Mutex<Option<ActiveConnection>>>;

/// Single-connection lifecycle: `Discovered -> Connected -> Disconnected`
/// per peripheral, at most one peripheral connected at a time.
pub struct ConnectionManager {
    transport: Arc<dyn BleTransport>,
    directory: Arc<Mutex<DeviceDirectory>>,
    active: SharedActive,
}

impl ConnectionManager {
    pub(crate) fn new(
        transport: Arc<dyn BleTransport>,
        directory: Arc<Mutex<DeviceDirectory>>,
        active: SharedActive,
    ) -> Self {
        Self {
            transport,
            directory,
            active,
        }
    }

    /// Connects to the directory device at `device_index` over the
    /// selected adapter, then walks its GATT tree and rebuilds the
    /// endpoint list from scratch (handles from any prior connection are
    /// void). If the tree walk fails partway the link is torn back down
    /// and the device stays `Discovered`.
    pub async fn connect(
        &mut self,
        selection: &AdapterSelection,
        device_index: usize,
    ) -> Result<(), BleError> {
        let (identifier, address) = {
            let directory = self.directory.lock().expect("directory lock poisoned");
            let record = directory
                .get(device_index)
                .ok_or(BleError::InvalidIndex(device_index))?;
            (record.identifier.clone(), record.address.clone())
        };

        {
            let active = self.active.lock().expect("active lock poisoned");
            if active.is_some() {
                // Single-connection model: covers both "target already
                // connected" and "another device holds the link".
                return Err(BleError::AlreadyConnected);
            }
        }

        info!("Connecting to {:?} at {}", identifier, address);
        self.transport
            .peripheral_connect(&selection.adapter, &address)
            .await?;

        let services = match self.transport.peripheral_services(&address).await {
            Ok(services) => services,
            Err(err) => {
                error!("GATT tree walk failed for {}: {}", address, err);
                // Roll back: never leave a half-initialized connection.
                if let Err(teardown) = self
                    .transport
                    .peripheral_disconnect(&selection.adapter, &address)
                    .await
                {
                    warn!("Rollback disconnect failed for {}: {}", address, teardown);
                }
                return Err(err);
            }
        };

        let endpoints = flatten_endpoints(&services);
        info!(
            "Connected to {}: {} service(s), {} endpoint(s)",
            address,
            services.len(),
            endpoints.len()
        );

        self.directory
            .lock()
            .expect("directory lock poisoned")
            .set_state_by_address(&address, DeviceState::Connected);

        let mut active = self.active.lock().expect("active lock poisoned");
        *active = Some(ActiveConnection {
            address,
            identifier,
            adapter: selection.adapter.clone(),
            services,
            endpoints,
            notify_tasks: HashMap::new(),
        });
        Ok(())
    }

    /// Tears down the active link: stops every notification task, clears
    /// the active reference and endpoint list, then releases the radio
    /// link. Fails with `NoActiveConnection` when nothing is connected
    /// or the directory no longer reports the device as connected.
    pub async fn disconnect(&mut self) -> Result<(), BleError> {
        let (address, adapter, reported_connected) = {
            let mut active = self.active.lock().expect("active lock poisoned");
            let conn = active.as_mut().ok_or(BleError::NoActiveConnection)?;

            let directory = self.directory.lock().expect("directory lock poisoned");
            let reported_connected = directory
                .find_index_by_address(&conn.address)
                .and_then(|i| directory.get(i))
                .map(|r| r.state == DeviceState::Connected)
                // A rescan may have dropped the record; the link itself
                // is still ours to release.
                .unwrap_or(true);
            drop(directory);

            for (handle, token) in conn.notify_tasks.drain() {
                info!("Stopping notification task for endpoint {}", handle);
                token.cancel();
            }

            let address = conn.address.clone();
            let adapter = conn.adapter.clone();
            *active = None;
            (address, adapter, reported_connected)
        };

        self.directory
            .lock()
            .expect("directory lock poisoned")
            .set_state_by_address(&address, DeviceState::Disconnected);

        // The radio link is released no matter what the directory says;
        // a rescan may have re-added the device as freshly discovered,
        // but the link is still ours and must not leak.
        info!("Disconnecting from {}", address);
        self.transport
            .peripheral_disconnect(&adapter, &address)
            .await?;

        if !reported_connected {
            warn!(
                "Device {} no longer reported connected; stale state dropped, link released",
                address
            );
            return Err(BleError::NoActiveConnection);
        }
        info!("Disconnected from {}", address);
        Ok(())
    }

    /// Directory index of the connected device, re-resolved by address
    /// on every call; `None` when nothing is connected or a rescan has
    /// dropped the record.
    pub fn current_device_index(&self) -> Option<usize> {
        let active = self.active.lock().expect("active lock poisoned");
        let conn = active.as_ref()?;
        self.directory
            .lock()
            .expect("directory lock poisoned")
            .find_index_by_address(&conn.address)
    }

    /// Canonical address of the connected device, if any.
    pub fn connected_address(&self) -> Option<String> {
        self.active
            .lock()
            .expect("active lock poisoned")
            .as_ref()
            .map(|c| c.address.clone())
    }

    /// Display identifier the connected device advertised at discovery
    /// time; may be empty.
    pub fn connected_identifier(&self) -> Option<String> {
        self.active
            .lock()
            .expect("active lock poisoned")
            .as_ref()
            .map(|c| c.identifier.clone())
    }

    /// GATT services of the connected device. Fails with `NotConnected`
    /// when nothing is connected.
    pub fn list_services(&self) -> Result<Vec<GattService>, BleError> {
        let active = self.active.lock().expect("active lock poisoned");
        active
            .as_ref()
            .map(|c| c.services.clone())
            .ok_or(BleError::NotConnected)
    }

    /// Resolved endpoint list of the connected device. Fails with
    /// `NotConnected` when nothing is connected.
    pub fn endpoints(&self) -> Result<Vec<GattEndpoint>, BleError> {
        let active = self.active.lock().expect("active lock poisoned");
        active
            .as_ref()
            .map(|c| c.endpoints.clone())
            .ok_or(BleError::NotConnected)
    }

    /// Best-effort teardown for session drop: cancels notification
    /// tasks without touching the radio (no awaiting in drop paths).
    pub(crate) fn abort_notification_tasks(&self) {
        let mut active = self.active.lock().expect("active lock poisoned");
        if let Some(conn) = active.as_mut() {
            for (_, token) in conn.notify_tasks.drain() {
                token.cancel();
            }
        }
    }
}

/// Flattens a GATT tree into the position-indexed endpoint list handed
/// out to callers.
fn flatten_endpoints(services: &[GattService]) -> Vec<GattEndpoint> {
    services
        .iter()
        .flat_map(|service| {
            service.characteristics.iter().map(|ch| GattEndpoint {
                service_uuid: service.uuid,
                characteristic_uuid: ch.uuid,
                props: ch.props,
            })
        })
        .collect()
}
