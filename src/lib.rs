//! BLE central-role session manager.
//!
//! A standalone, embeddable component for the central side of BLE:
//! adapter discovery, peripheral scanning, connection lifecycle, GATT
//! service/characteristic enumeration, and read/write/notification I/O.
//! The platform radio stack is abstracted behind [`BleTransport`];
//! radio-originated events reach the application through the
//! [`EventDispatcher`] queue, never on the radio callback thread.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ble_central::{BleSession, BleTransport, SessionEvent};
//!
//! async fn run(transport: Arc<dyn BleTransport>) -> Result<(), ble_central::BleError> {
//!     let mut session = BleSession::new(transport).await?;
//!     session.list_adapters().await?;
//!     session.select_adapter(0)?;
//!     session.start_scan().await?;
//!     loop {
//!         match session.events().next_event().await {
//!             SessionEvent::DeviceFound { identifier, address } => {
//!                 println!("found {identifier} at {address}");
//!             }
//!             SessionEvent::ScanStopped => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod adapters;
mod connection;
mod constants;
mod directory;
mod error;
mod events;
mod gatt;
mod scanner;
mod session;
mod transport;
mod types;

pub use adapters::AdapterRegistry;
pub use connection::ConnectionManager;
pub use constants::*;
pub use directory::{DeviceDirectory, UNKNOWN_IDENTIFIER};
pub use error::BleError;
pub use events::{EventDispatcher, SessionEvent};
pub use gatt::GattIo;
pub use scanner::ScanSession;
pub use session::BleSession;
pub use transport::{BleTransport, NotificationStream, ScanEvent, ScanSink};
pub use types::{
    canonical_address, extract_mac_address, AdapterInfo, CharacteristicProps, DeviceState,
    GattCharacteristic, GattEndpoint, GattService, PeripheralRecord,
};
