//! Shared data structures for the session manager.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

/// A local BLE radio adapter, as reported by one registry enumeration.
/// Immutable once discovered; indices into the adapter list are only
/// meaningful until the next enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterInfo {
    /// Display identifier. May be empty on some platforms.
    pub identifier: String,
    /// Opaque platform address string.
    pub address: String,
}

/// Connection state of a discovered peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceState {
    Discovered,
    Connected,
    Disconnected,
}

/// A peripheral known to the device directory.
///
/// Identity is the address string; the identifier is display-only and may
/// be empty or duplicated across devices.
#[derive(Debug, Clone, Serialize)]
pub struct PeripheralRecord {
    /// Display identifier, may be empty. "Unknown" is only a display
    /// fallback applied at listing time, never stored here.
    pub identifier: String,
    /// Canonical address string (primary identity).
    pub address: String,
    /// Current connection state.
    pub state: DeviceState,
}

impl PeripheralRecord {
    pub fn new(identifier: String, address: String) -> Self {
        Self {
            identifier,
            address,
            state: DeviceState::Discovered,
        }
    }
}

/// Capability flags of a single characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CharacteristicProps {
    pub readable: bool,
    pub write_with_response: bool,
    pub write_without_response: bool,
    pub notifiable: bool,
}

/// One characteristic inside a service, as reported by the transport's
/// GATT tree walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub props: CharacteristicProps,
}

/// One service of a peripheral's GATT tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// A resolved (service, characteristic) pair of the currently connected
/// device. Callers address it through its position in the endpoint list;
/// those integer handles are invalidated by every new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GattEndpoint {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub props: CharacteristicProps,
}

static MAC_RE: OnceLock<Regex> = OnceLock::new();

/// Extracts a MAC address embedded in a platform device-id string, if
/// any, normalized to uppercase. Platform ids often wrap the MAC in
/// extra path-like noise; the last match wins.
pub fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = MAC_RE
        .get_or_init(|| Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").unwrap());
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

/// Canonical address used as directory identity: the embedded MAC when
/// one can be extracted, otherwise the raw platform string.
pub fn canonical_address(raw: &str) -> String {
    extract_mac_address(raw).unwrap_or_else(|| raw.to_string())
}
