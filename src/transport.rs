//! Abstract capability seam over the platform BLE stack.
//!
//! The session manager never talks to a vendor stack directly; everything
//! goes through [`BleTransport`]. A production build plugs in a backend
//! over the platform radio, tests plug in an in-process fake.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use log::warn;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::BleError;
use crate::types::{AdapterInfo, GattService};

/// A scan-lifecycle or discovery event raised by the transport.
///
/// The transport pushes these from its own callback context; the scan
/// session owns the receiving end and never lets application code run
/// on that context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Scanning actually began on the radio.
    Started,
    /// Scanning terminated, whether requested or stack-initiated.
    Stopped,
    /// A peripheral was seen for the first time in this scan.
    Found { identifier: String, address: String },
    /// New advertisement data for an already-seen peripheral.
    Updated { identifier: String, address: String },
}

/// Handed to the transport at scan start; the transport enqueues events
/// through it from whatever thread its callbacks run on.
#[derive(Debug, Clone)]
pub struct ScanSink {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ScanSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueues one event. Never blocks; a closed receiver means the
    /// scan session is already gone, which only merits a warning.
    pub fn push(&self, event: ScanEvent) {
        if self.tx.send(event).is_err() {
            warn!("Scan sink receiver dropped; discarding scan event");
        }
    }
}

/// Stream of raw notification payloads for one subscribed characteristic.
pub type NotificationStream = BoxStream<'static, Result<Vec<u8>, BleError>>;

/// The primitive operations the session manager needs from a BLE stack.
///
/// Implementations must be safe to call from multiple tasks; all methods
/// are request/response and resolve when the stack responds or times out
/// (timeout policy is the transport's, surfaced as [`BleError::Timeout`]).
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Lists the radio adapters present on the host. An empty list means
    /// no radios, which is not an error; a missing BLE stack is
    /// [`BleError::PlatformUnsupported`].
    async fn enumerate_adapters(&self) -> Result<Vec<AdapterInfo>, BleError>;

    /// Whether the platform radio is powered on. Pure query.
    async fn adapter_enabled(&self) -> Result<bool, BleError>;

    /// Begins scanning on the given adapter, delivering discovery and
    /// lifecycle events through `sink`. Returns once the request is
    /// issued; the `Started` event confirms the radio is scanning.
    async fn scan_start(&self, adapter: &AdapterInfo, sink: ScanSink) -> Result<(), BleError>;

    /// Requests scan termination. Confirmation arrives as a `Stopped`
    /// event on the sink handed to `scan_start`.
    async fn scan_stop(&self, adapter: &AdapterInfo) -> Result<(), BleError>;

    /// Establishes a link to the peripheral at `address`.
    async fn peripheral_connect(
        &self,
        adapter: &AdapterInfo,
        address: &str,
    ) -> Result<(), BleError>;

    /// Tears down the link to the peripheral at `address`.
    async fn peripheral_disconnect(
        &self,
        adapter: &AdapterInfo,
        address: &str,
    ) -> Result<(), BleError>;

    /// Walks the full GATT tree of a connected peripheral.
    async fn peripheral_services(&self, address: &str) -> Result<Vec<GattService>, BleError>;

    /// Reads the current value of a characteristic.
    async fn characteristic_read(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, BleError>;

    /// Write without response (unacknowledged command).
    async fn characteristic_write_command(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), BleError>;

    /// Write with response (acknowledged request).
    async fn characteristic_write_request(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), BleError>;

    /// Subscribes to value notifications, yielding each payload as it
    /// arrives. The stream ends when the link drops or the stack stops
    /// the subscription.
    async fn characteristic_subscribe(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<NotificationStream, BleError>;
}
