//! Event dispatcher: the single hand-off point between transport-side
//! tasks and the embedding application.
//!
//! Transport callbacks only ever enqueue immutable event records; the
//! application drains the queue from its own loop, so handlers never run
//! on the radio callback context. The queue is unbounded and never drops
//! (at-least-once delivery even while no listener is attached), and
//! preserves FIFO order across all event kinds.

use log::warn;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// An application-visible event raised by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionEvent {
    /// Scanning actually began on the selected adapter.
    ScanStarted,
    /// Scanning terminated (requested or stack-initiated).
    ScanStopped,
    /// A peripheral entered the device directory.
    DeviceFound { identifier: String, address: String },
    /// Fresh advertisement data for a directory peripheral.
    DeviceUpdated { identifier: String, address: String },
    /// One notification payload from a subscribed characteristic.
    NotificationReceived {
        endpoint_handle: usize,
        data: Vec<u8>,
    },
}

/// Cloneable producer half, handed to scan and notification tasks.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    /// Enqueues one event. A closed queue means the session is being
    /// torn down; the event is dropped with a warning.
    pub(crate) fn emit(&self, event: SessionEvent) {
        if let Err(err) = self.tx.send(event) {
            warn!("Event queue closed; dropping {:?}", err.0);
        }
    }
}

/// Consumer side owned by the session and drained by the application.
#[derive(Debug)]
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub(crate) fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Waits for the next event. Intended for applications with an async
    /// delivery loop.
    pub async fn next_event(&self) -> SessionEvent {
        // The dispatcher also holds a sender, so recv() can only park,
        // never return None.
        loop {
            if let Some(event) = self.rx.lock().await.recv().await {
                return event;
            }
        }
    }

    /// Returns every event queued so far without waiting.
    pub async fn drain(&self) -> Vec<SessionEvent> {
        let mut rx = self.rx.lock().await;
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Drains the queue, invoking `handler` once per event in FIFO
    /// order. Returns the number of events delivered. This is the
    /// "deliver at a safe point" step an embedding loop calls each tick.
    pub async fn dispatch_pending<F>(&self, mut handler: F) -> usize
    where
        F: FnMut(SessionEvent),
    {
        let mut rx = self.rx.lock().await;
        let mut delivered = 0;
        while let Ok(event) = rx.try_recv() {
            handler(event);
            delivered += 1;
        }
        delivered
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
