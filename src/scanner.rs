//! Scan session: owns the adapter selection and the scan lifecycle.

use std::sync::{Arc, Mutex};

use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::AdapterRegistry;
use crate::directory::DeviceDirectory;
use crate::error::BleError;
use crate::events::{EventSender, SessionEvent};
use crate::transport::{BleTransport, ScanEvent, ScanSink};
use crate::types::AdapterInfo;

/// A bound adapter choice, pinned to the registry generation it was made
/// against. A registry refresh invalidates it.
#[derive(Debug, Clone)]
pub struct AdapterSelection {
    pub index: usize,
    pub generation: u64,
    pub adapter: AdapterInfo,
}

/// One scan session: `Idle -> Scanning -> Idle`, gated on an adapter
/// selection. Discovery events flow from the transport sink into the
/// device directory and out through the event dispatcher.
pub struct ScanSession {
    transport: Arc<dyn BleTransport>,
    registry: Arc<AdapterRegistry>,
    directory: Arc<Mutex<DeviceDirectory>>,
    events: EventSender,
    selection: Option<AdapterSelection>,
    cancel_token: CancellationToken,
    scan_task: Option<JoinHandle<()>>,
    /// Adapter the running scan was started on; the radio scan is
    /// stopped on it before a restart.
    scan_adapter: Option<AdapterInfo>,
}

impl ScanSession {
    pub(crate) fn new(
        transport: Arc<dyn BleTransport>,
        registry: Arc<AdapterRegistry>,
        directory: Arc<Mutex<DeviceDirectory>>,
        events: EventSender,
    ) -> Self {
        Self {
            transport,
            registry,
            directory,
            events,
            selection: None,
            cancel_token: CancellationToken::new(),
            scan_task: None,
            scan_adapter: None,
        }
    }

    /// Binds the session to the adapter at `index` in the registry's
    /// current list. Fails with `InvalidIndex` (leaving any prior
    /// selection in place) when the index is out of bounds.
    pub fn select_adapter(&mut self, index: usize) -> Result<(), BleError> {
        let (adapter, generation) = self
            .registry
            .get(index)
            .ok_or(BleError::InvalidIndex(index))?;
        info!(
            "Selected adapter {} ({:?} at {})",
            index, adapter.identifier, adapter.address
        );
        self.selection = Some(AdapterSelection {
            index,
            generation,
            adapter,
        });
        Ok(())
    }

    /// Index of the currently selected adapter, if any.
    pub fn selected_index(&self) -> Option<usize> {
        self.selection.as_ref().map(|s| s.index)
    }

    pub(crate) fn validated_selection(&self) -> Result<AdapterSelection, BleError> {
        let selection = self.selection.as_ref().ok_or(BleError::NoAdapterSelected)?;
        if selection.generation != self.registry.generation() {
            warn!(
                "Adapter selection {} is stale after registry refresh",
                selection.index
            );
            return Err(BleError::NoAdapterSelected);
        }
        Ok(selection.clone())
    }

    /// Whether a scan forwarding task is currently alive.
    pub fn is_scanning(&self) -> bool {
        self.scan_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Starts an asynchronous scan on the selected adapter. The device
    /// directory is emptied first, unconditionally: identities from a
    /// previous scan must not stay addressable. Returns as soon as the
    /// request is issued; `ScanStarted` confirms the radio is live.
    pub async fn start_scan(&mut self) -> Result<(), BleError> {
        let selection = self.validated_selection()?;

        // A still-running scan is stopped on the radio first; it must
        // not keep scanning into a dropped sink.
        if self.is_scanning() {
            if let Some(adapter) = self.scan_adapter.take() {
                if let Err(err) = self.transport.scan_stop(&adapter).await {
                    warn!("Stopping previous scan failed: {}", err);
                }
            }
        }
        self.cancel_token.cancel();
        if let Some(task) = self.scan_task.take() {
            let _ = task.await;
        }

        self.directory
            .lock()
            .expect("directory lock poisoned")
            .clear();

        let (sink, rx) = ScanSink::channel();
        self.transport.scan_start(&selection.adapter, sink).await?;

        self.cancel_token = CancellationToken::new();
        let cancel = self.cancel_token.clone();
        let directory = self.directory.clone();
        let events = self.events.clone();
        self.scan_task = Some(tokio::spawn(async move {
            forward_scan_events(rx, directory, events, cancel).await;
        }));
        self.scan_adapter = Some(selection.adapter.clone());

        info!("Scan started on adapter {}", selection.index);
        Ok(())
    }

    /// Requests scan termination. Asynchronous: the `ScanStopped` event,
    /// not the return value, confirms the radio actually stopped.
    pub async fn stop_scan(&mut self) -> Result<(), BleError> {
        let selection = self.selection.as_ref().ok_or(BleError::NoAdapterSelected)?;
        info!("Requesting scan stop on adapter {}", selection.index);
        self.transport.scan_stop(&selection.adapter).await
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
    }
}

/// Runs on its own task: moves transport scan events into the directory
/// and re-emits them as session events. The transport side only ever
/// enqueues; all directory mutation happens here, under a lock held for
/// the single append.
async fn forward_scan_events(
    mut rx: mpsc::UnboundedReceiver<ScanEvent>,
    directory: Arc<Mutex<DeviceDirectory>>,
    events: EventSender,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ScanEvent::Started) => {
                    events.emit(SessionEvent::ScanStarted);
                }
                Some(ScanEvent::Stopped) => {
                    events.emit(SessionEvent::ScanStopped);
                    break;
                }
                Some(ScanEvent::Found { identifier, address }) => {
                    let canonical = record(&directory, &identifier, &address);
                    events.emit(SessionEvent::DeviceFound {
                        identifier,
                        address: canonical,
                    });
                }
                Some(ScanEvent::Updated { identifier, address }) => {
                    let canonical = record(&directory, &identifier, &address);
                    events.emit(SessionEvent::DeviceUpdated {
                        identifier,
                        address: canonical,
                    });
                }
                None => {
                    info!("Scan event stream ended");
                    break;
                }
            },
            _ = cancel.cancelled() => break,
        }
    }
}

fn record(directory: &Arc<Mutex<DeviceDirectory>>, identifier: &str, address: &str) -> String {
    let mut directory = directory.lock().expect("directory lock poisoned");
    let (index, _) = directory.append_or_update(identifier, address);
    directory
        .get(index)
        .map(|r| r.address.clone())
        .unwrap_or_else(|| address.to_string())
}
