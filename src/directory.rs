//! Device directory: every peripheral seen during the current scan,
//! keyed by canonical address, indexed by discovery order.

use std::collections::HashMap;

use log::debug;

use crate::adapters::find_by_identifier;
use crate::types::{canonical_address, DeviceState, PeripheralRecord};

/// Display key substituted when a peripheral reports no identifier.
pub const UNKNOWN_IDENTIFIER: &str = "Unknown";

/// Indexed collection of discovered peripherals.
///
/// Records survive until the next scan starts; a new scan clears the
/// directory so stale identities from a prior scan can never resolve.
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    records: Vec<PeripheralRecord>,
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every record. Called at the start of each scan.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PeripheralRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[PeripheralRecord] {
        &self.records
    }

    /// Inserts a newly discovered peripheral or refreshes the identifier
    /// of a known one. Identity is the canonical address. Returns the
    /// record's index and whether it already existed.
    pub fn append_or_update(&mut self, identifier: &str, address: &str) -> (usize, bool) {
        let address = canonical_address(address);
        if let Some(index) = self.find_index_by_address(&address) {
            // Keep a previously seen identifier if the update lost it.
            if !identifier.is_empty() {
                self.records[index].identifier = identifier.to_string();
            }
            (index, true)
        } else {
            debug!("Directory add: {:?} at {}", identifier, address);
            self.records
                .push(PeripheralRecord::new(identifier.to_string(), address));
            (self.records.len() - 1, false)
        }
    }

    /// Index of the record with this canonical address, if present.
    pub fn find_index_by_address(&self, address: &str) -> Option<usize> {
        let address = canonical_address(address);
        self.records.iter().position(|r| r.address == address)
    }

    /// First device whose identifier equals `name` exactly
    /// (case-sensitive); same ghost-skip rule as the adapter lookup.
    pub fn find_index_by_identifier(&self, name: &str) -> Option<usize> {
        find_by_identifier(
            self.records
                .iter()
                .map(|r| (r.identifier.as_str(), r.address.as_str())),
            name,
        )
    }

    /// Display-identifier to address mapping of every record. Devices
    /// without an identifier are listed under [`UNKNOWN_IDENTIFIER`];
    /// duplicate display keys collapse to the last writer, which is a
    /// known limitation of this listing shape.
    pub fn list_all(&self) -> HashMap<String, String> {
        self.records
            .iter()
            .map(|r| {
                let key = if r.identifier.is_empty() {
                    UNKNOWN_IDENTIFIER.to_string()
                } else {
                    r.identifier.clone()
                };
                (key, r.address.clone())
            })
            .collect()
    }

    /// Sets the connection state of the record at `address`, if it is
    /// still in the directory (a rescan may have dropped it).
    pub fn set_state_by_address(&mut self, address: &str, state: DeviceState) {
        if let Some(index) = self.find_index_by_address(address) {
            self.records[index].state = state;
        }
    }
}
