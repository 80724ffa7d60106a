//! Adapter registry: enumerates the host's BLE radios.

use std::sync::{Arc, Mutex};

use log::info;

use crate::error::BleError;
use crate::transport::BleTransport;
use crate::types::AdapterInfo;

#[derive(Debug, Default)]
struct RegistryState {
    adapters: Vec<AdapterInfo>,
    generation: u64,
}

/// Cached result of the last adapter enumeration.
///
/// Every refresh replaces the whole list and bumps a generation counter;
/// selections made against an older generation are stale and must be
/// re-established, not trusted.
pub struct AdapterRegistry {
    transport: Arc<dyn BleTransport>,
    state: Mutex<RegistryState>,
}

impl AdapterRegistry {
    pub(crate) fn new(transport: Arc<dyn BleTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Re-enumerates adapters, replacing the cached list. Returns the
    /// fresh list; an empty one means no radios are present, which is
    /// distinct from a transport error.
    pub async fn refresh(&self) -> Result<Vec<AdapterInfo>, BleError> {
        let adapters = self.transport.enumerate_adapters().await?;
        if adapters.is_empty() {
            info!("No BLE adapters found");
        } else {
            info!("Found {} BLE adapter(s)", adapters.len());
        }
        let mut state = self.state.lock().expect("registry lock poisoned");
        state.adapters = adapters.clone();
        state.generation += 1;
        Ok(adapters)
    }

    /// Whether the platform radio is powered on. Pure query.
    pub async fn is_bluetooth_enabled(&self) -> Result<bool, BleError> {
        self.transport.adapter_enabled().await
    }

    /// Snapshot of the last enumeration.
    pub fn adapters(&self) -> Vec<AdapterInfo> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .adapters
            .clone()
    }

    /// Generation of the last enumeration; bumped on every refresh.
    pub fn generation(&self) -> u64 {
        self.state.lock().expect("registry lock poisoned").generation
    }

    /// Adapter at `index` together with the generation it belongs to.
    pub(crate) fn get(&self, index: usize) -> Option<(AdapterInfo, u64)> {
        let state = self.state.lock().expect("registry lock poisoned");
        state
            .adapters
            .get(index)
            .map(|adapter| (adapter.clone(), state.generation))
    }

    /// First adapter whose identifier equals `name` exactly
    /// (case-sensitive). Adapters with both identifier and address empty
    /// are unresolvable ghosts and are skipped.
    pub fn find_index_by_identifier(&self, name: &str) -> Option<usize> {
        let state = self.state.lock().expect("registry lock poisoned");
        find_by_identifier(
            state
                .adapters
                .iter()
                .map(|a| (a.identifier.as_str(), a.address.as_str())),
            name,
        )
    }
}

/// Shared lookup rule for adapters and devices: exact identifier match,
/// first (lowest-index) hit wins, ghost entries skipped. The address is
/// deliberately not part of the key.
pub(crate) fn find_by_identifier<'a>(
    entries: impl Iterator<Item = (&'a str, &'a str)>,
    name: &str,
) -> Option<usize> {
    for (index, (identifier, address)) in entries.enumerate() {
        if identifier.is_empty() && address.is_empty() {
            continue;
        }
        if identifier == name {
            return Some(index);
        }
    }
    None
}
