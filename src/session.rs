//! The session object: public facade wiring registry, directory,
//! scanner, connection manager, GATT I/O and the event dispatcher
//! together over one transport handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::adapters::AdapterRegistry;
use crate::connection::{ConnectionManager, SharedActive};
use crate::directory::DeviceDirectory;
use crate::error::BleError;
use crate::events::EventDispatcher;
use crate::gatt::GattIo;
use crate::scanner::ScanSession;
use crate::transport::BleTransport;
use crate::types::{AdapterInfo, GattEndpoint, GattService, PeripheralRecord};

/// One BLE central-role session.
///
/// Owns the transport handle for its whole lifetime; dropping the
/// session cancels its background tasks. Mutating operations take
/// `&mut self`; embedders sharing a session across tasks wrap it in a
/// mutex of their choosing.
pub struct BleSession {
    registry: Arc<AdapterRegistry>,
    directory: Arc<Mutex<DeviceDirectory>>,
    dispatcher: EventDispatcher,
    scanner: ScanSession,
    connection: ConnectionManager,
    gatt: GattIo,
}

impl BleSession {
    /// Initializes a session over `transport`. The one fatal error:
    /// `PlatformUnsupported` when the host has no BLE capability at all,
    /// reported here and never retried.
    pub async fn new(transport: Arc<dyn BleTransport>) -> Result<Self, BleError> {
        let enabled = transport.adapter_enabled().await?;
        if !enabled {
            warn!("Bluetooth radio is powered off");
        }
        info!("BLE session initialized");

        let registry = Arc::new(AdapterRegistry::new(transport.clone()));
        let directory = Arc::new(Mutex::new(DeviceDirectory::new()));
        let dispatcher = EventDispatcher::new();
        let active: SharedActive = Arc::new(Mutex::new(None));

        let scanner = ScanSession::new(
            transport.clone(),
            registry.clone(),
            directory.clone(),
            dispatcher.sender(),
        );
        let connection =
            ConnectionManager::new(transport.clone(), directory.clone(), active.clone());
        let gatt = GattIo::new(transport, active, dispatcher.sender());

        Ok(Self {
            registry,
            directory,
            dispatcher,
            scanner,
            connection,
            gatt,
        })
    }

    // --- adapter registry ---

    /// Enumerates adapters, replacing the cached list (prior indices and
    /// selections become invalid). Empty means no radios present.
    pub async fn list_adapters(&self) -> Result<Vec<AdapterInfo>, BleError> {
        self.registry.refresh().await
    }

    /// Snapshot of the last enumeration, without re-querying.
    pub fn adapters(&self) -> Vec<AdapterInfo> {
        self.registry.adapters()
    }

    /// Whether the platform radio is powered on.
    pub async fn is_bluetooth_enabled(&self) -> Result<bool, BleError> {
        self.registry.is_bluetooth_enabled().await
    }

    /// First adapter with this exact identifier, if any.
    pub fn find_adapter_index_by_identifier(&self, name: &str) -> Option<usize> {
        self.registry.find_index_by_identifier(name)
    }

    // --- scan session ---

    /// Binds scanning to the adapter at `index` in the current list.
    pub fn select_adapter(&mut self, index: usize) -> Result<(), BleError> {
        self.scanner.select_adapter(index)
    }

    /// Index of the selected adapter, `None` when unset.
    pub fn current_adapter_index(&self) -> Option<usize> {
        self.scanner.selected_index()
    }

    /// Starts scanning on the selected adapter. Empties the device
    /// directory first; returns once the request is issued.
    pub async fn start_scan(&mut self) -> Result<(), BleError> {
        self.scanner.start_scan().await
    }

    /// Requests scan termination; `ScanStopped` confirms it.
    pub async fn stop_scan(&mut self) -> Result<(), BleError> {
        self.scanner.stop_scan().await
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    // --- device directory ---

    /// Snapshot of every peripheral discovered in the current scan.
    pub fn devices(&self) -> Vec<PeripheralRecord> {
        self.directory
            .lock()
            .expect("directory lock poisoned")
            .records()
            .to_vec()
    }

    /// First device with this exact identifier, if any.
    pub fn find_device_index_by_identifier(&self, name: &str) -> Option<usize> {
        self.directory
            .lock()
            .expect("directory lock poisoned")
            .find_index_by_identifier(name)
    }

    /// Display-identifier to address map of discovered devices, with
    /// the "Unknown" fallback for unnamed ones.
    pub fn list_all_devices(&self) -> HashMap<String, String> {
        self.directory
            .lock()
            .expect("directory lock poisoned")
            .list_all()
    }

    // --- connection manager ---

    /// Connects to the device at `device_index` and resolves its GATT
    /// endpoint list. Requires a valid adapter selection.
    pub async fn connect(&mut self, device_index: usize) -> Result<(), BleError> {
        let selection = self.scanner.validated_selection()?;
        self.connection.connect(&selection, device_index).await
    }

    /// Tears down the active connection.
    pub async fn disconnect(&mut self) -> Result<(), BleError> {
        self.connection.disconnect().await
    }

    /// Directory index of the connected device, `None` when unset.
    pub fn current_device_index(&self) -> Option<usize> {
        self.connection.current_device_index()
    }

    /// Canonical address of the connected device, if any.
    pub fn connected_address(&self) -> Option<String> {
        self.connection.connected_address()
    }

    /// Display identifier of the connected device, if any; may be empty
    /// for unnamed peripherals.
    pub fn connected_identifier(&self) -> Option<String> {
        self.connection.connected_identifier()
    }

    /// GATT services of the connected device.
    pub fn list_services(&self) -> Result<Vec<GattService>, BleError> {
        self.connection.list_services()
    }

    /// Resolved endpoints of the connected device; positions in this
    /// list are the handles the GATT operations take.
    pub fn endpoints(&self) -> Result<Vec<GattEndpoint>, BleError> {
        self.connection.endpoints()
    }

    // --- GATT I/O ---

    /// Reads the raw bytes of the endpoint at `handle`.
    pub async fn read_characteristic(&self, handle: usize) -> Result<Vec<u8>, BleError> {
        self.gatt.read(handle).await
    }

    /// Writes `data` to the endpoint at `handle`, without-response
    /// preferred when the capability allows.
    pub async fn write_characteristic(&self, handle: usize, data: &[u8]) -> Result<(), BleError> {
        self.gatt.write(handle, data).await
    }

    /// Subscribes to the endpoint's notifications; payloads arrive as
    /// `NotificationReceived` events.
    pub async fn subscribe_notifications(&self, handle: usize) -> Result<(), BleError> {
        self.gatt.subscribe(handle).await
    }

    /// Stops notification delivery for the endpoint.
    pub fn unsubscribe_notifications(&self, handle: usize) -> Result<(), BleError> {
        self.gatt.unsubscribe(handle)
    }

    // --- events ---

    /// The dispatcher the embedding application drains from its own
    /// loop. Events are FIFO across all kinds and never dropped.
    pub fn events(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Explicit teardown: best-effort disconnect and scan stop. `Drop`
    /// covers task cancellation for sessions that skip this.
    pub async fn shutdown(&mut self) {
        if self.connection.connected_address().is_some() {
            if let Err(err) = self.connection.disconnect().await {
                warn!("Shutdown disconnect failed: {}", err);
            }
        }
        if self.scanner.is_scanning() {
            if let Err(err) = self.scanner.stop_scan().await {
                warn!("Shutdown scan stop failed: {}", err);
            }
        }
        info!("BLE session shut down");
    }
}

impl Drop for BleSession {
    fn drop(&mut self) {
        // The scanner cancels its own task in its Drop; notification
        // forwarding tasks are cancelled here.
        self.connection.abort_notification_tasks();
    }
}
