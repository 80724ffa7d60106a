//! In-process fake transport used by the integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use ble_central::{
    AdapterInfo, BleError, BleTransport, GattService, NotificationStream, ScanEvent, ScanSink,
};

/// One recorded characteristic write.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub characteristic: Uuid,
    pub with_response: bool,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct MockState {
    adapters: Vec<AdapterInfo>,
    enabled: bool,
    platform_unsupported: bool,
    peripherals: HashMap<String, MockPeripheral>,
    scan_sink: Option<ScanSink>,
    scan_start_calls: u32,
    scan_stop_calls: u32,
    fail_next_scan_start: bool,
    fail_services_walk: bool,
    connected: Option<String>,
    writes: Vec<WriteRecord>,
    read_values: HashMap<Uuid, Vec<u8>>,
    notify_senders: HashMap<Uuid, mpsc::UnboundedSender<Result<Vec<u8>, BleError>>>,
}

struct MockPeripheral {
    services: Vec<GattService>,
}

/// Scriptable transport double: the test side injects scan events and
/// notification payloads and inspects what the session asked for.
pub struct MockTransport {
    state: Mutex<MockState>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Arc<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        Arc::new(Self {
            state: Mutex::new(MockState {
                enabled: true,
                ..MockState::default()
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock lock poisoned")
    }

    pub fn set_adapters(&self, adapters: Vec<AdapterInfo>) {
        self.lock().adapters = adapters;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.lock().enabled = enabled;
    }

    pub fn set_platform_unsupported(&self, unsupported: bool) {
        self.lock().platform_unsupported = unsupported;
    }

    pub fn add_peripheral(&self, address: &str, services: Vec<GattService>) {
        self.lock()
            .peripherals
            .insert(address.to_string(), MockPeripheral { services });
    }

    pub fn set_read_value(&self, characteristic: Uuid, value: Vec<u8>) {
        self.lock().read_values.insert(characteristic, value);
    }

    pub fn fail_next_scan_start(&self) {
        self.lock().fail_next_scan_start = true;
    }

    pub fn fail_services_walk(&self, fail: bool) {
        self.lock().fail_services_walk = fail;
    }

    pub fn scan_start_calls(&self) -> u32 {
        self.lock().scan_start_calls
    }

    pub fn scan_stop_calls(&self) -> u32 {
        self.lock().scan_stop_calls
    }

    pub fn connected(&self) -> Option<String> {
        self.lock().connected.clone()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Pushes a discovery event as the radio stack would, from whatever
    /// context the test runs on.
    pub fn emit_found(&self, identifier: &str, address: &str) {
        if let Some(sink) = self.lock().scan_sink.as_ref() {
            sink.push(ScanEvent::Found {
                identifier: identifier.to_string(),
                address: address.to_string(),
            });
        }
    }

    pub fn emit_updated(&self, identifier: &str, address: &str) {
        if let Some(sink) = self.lock().scan_sink.as_ref() {
            sink.push(ScanEvent::Updated {
                identifier: identifier.to_string(),
                address: address.to_string(),
            });
        }
    }

    /// Delivers one notification payload for a subscribed characteristic.
    /// Tolerates a dropped stream: an unsubscribed session simply never
    /// sees the payload, as with a real radio.
    pub fn push_notification(&self, characteristic: Uuid, data: Vec<u8>) {
        let state = self.lock();
        let sender = state
            .notify_senders
            .get(&characteristic)
            .expect("characteristic not subscribed");
        let _ = sender.send(Ok(data));
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn enumerate_adapters(&self) -> Result<Vec<AdapterInfo>, BleError> {
        let state = self.lock();
        if state.platform_unsupported {
            return Err(BleError::PlatformUnsupported);
        }
        Ok(state.adapters.clone())
    }

    async fn adapter_enabled(&self) -> Result<bool, BleError> {
        let state = self.lock();
        if state.platform_unsupported {
            return Err(BleError::PlatformUnsupported);
        }
        Ok(state.enabled)
    }

    async fn scan_start(&self, _adapter: &AdapterInfo, sink: ScanSink) -> Result<(), BleError> {
        let mut state = self.lock();
        state.scan_start_calls += 1;
        if state.fail_next_scan_start {
            state.fail_next_scan_start = false;
            return Err(BleError::transport("scan refused"));
        }
        sink.push(ScanEvent::Started);
        state.scan_sink = Some(sink);
        Ok(())
    }

    async fn scan_stop(&self, _adapter: &AdapterInfo) -> Result<(), BleError> {
        let mut state = self.lock();
        state.scan_stop_calls += 1;
        if let Some(sink) = state.scan_sink.take() {
            sink.push(ScanEvent::Stopped);
        }
        Ok(())
    }

    async fn peripheral_connect(
        &self,
        _adapter: &AdapterInfo,
        address: &str,
    ) -> Result<(), BleError> {
        let mut state = self.lock();
        if !state.peripherals.contains_key(address) {
            return Err(BleError::transport(format!("unknown peripheral {address}")));
        }
        state.connected = Some(address.to_string());
        Ok(())
    }

    async fn peripheral_disconnect(
        &self,
        _adapter: &AdapterInfo,
        _address: &str,
    ) -> Result<(), BleError> {
        let mut state = self.lock();
        state.connected = None;
        state.notify_senders.clear();
        Ok(())
    }

    async fn peripheral_services(&self, address: &str) -> Result<Vec<GattService>, BleError> {
        let state = self.lock();
        if state.fail_services_walk {
            return Err(BleError::transport("service walk failed"));
        }
        state
            .peripherals
            .get(address)
            .map(|p| p.services.clone())
            .ok_or_else(|| BleError::transport(format!("unknown peripheral {address}")))
    }

    async fn characteristic_read(
        &self,
        _address: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, BleError> {
        self.lock()
            .read_values
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| BleError::transport("no value staged for read"))
    }

    async fn characteristic_write_command(
        &self,
        _address: &str,
        _service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), BleError> {
        self.lock().writes.push(WriteRecord {
            characteristic,
            with_response: false,
            data: data.to_vec(),
        });
        Ok(())
    }

    async fn characteristic_write_request(
        &self,
        _address: &str,
        _service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), BleError> {
        self.lock().writes.push(WriteRecord {
            characteristic,
            with_response: true,
            data: data.to_vec(),
        });
        Ok(())
    }

    async fn characteristic_subscribe(
        &self,
        _address: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<NotificationStream, BleError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().notify_senders.insert(characteristic, tx);
        Ok(Box::pin(futures_util::stream::unfold(
            rx,
            |mut rx| async move { rx.recv().await.map(|item| (item, rx)) },
        )))
    }
}
