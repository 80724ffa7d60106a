//! GATT I/O against the endpoints of the connected device.

use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, error, info};
use tokio_util::sync::CancellationToken;

use crate::connection::SharedActive;
use crate::error::BleError;
use crate::events::{EventSender, SessionEvent};
use crate::transport::{BleTransport, NotificationStream};
use crate::types::{CharacteristicProps, GattEndpoint};

/// Which write primitive a characteristic's capabilities call for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// Write without response. Preferred when available: no ack
    /// round-trip, lower latency.
    Command,
    /// Write with response.
    Request,
}

/// Capability dispatch for writes. Without-response wins over
/// with-response when both are present; this priority is part of the
/// contract, it changes latency and ack semantics.
pub(crate) fn preferred_write_mode(props: &CharacteristicProps) -> Option<WriteMode> {
    if props.write_without_response {
        Some(WriteMode::Command)
    } else if props.write_with_response {
        Some(WriteMode::Request)
    } else {
        None
    }
}

/// Read, write and notification subscription over the active link.
/// Endpoint handles are positions in the endpoint list built at connect
/// time; every new connection voids the previous handles.
pub struct GattIo {
    transport: Arc<dyn BleTransport>,
    active: SharedActive,
    events: EventSender,
}

impl GattIo {
    pub(crate) fn new(
        transport: Arc<dyn BleTransport>,
        active: SharedActive,
        events: EventSender,
    ) -> Self {
        Self {
            transport,
            active,
            events,
        }
    }

    /// Address and endpoint for a handle, or the appropriate error.
    fn resolve(&self, handle: usize) -> Result<(String, GattEndpoint), BleError> {
        let active = self.active.lock().expect("active lock poisoned");
        let conn = active.as_ref().ok_or(BleError::NotConnected)?;
        let endpoint = conn
            .endpoints
            .get(handle)
            .ok_or(BleError::InvalidHandle(handle))?;
        Ok((conn.address.clone(), endpoint.clone()))
    }

    /// Reads the raw value of the endpoint. No text decoding; payload
    /// interpretation belongs to the caller.
    pub async fn read(&self, handle: usize) -> Result<Vec<u8>, BleError> {
        let (address, endpoint) = self.resolve(handle)?;
        debug!("Read endpoint {} ({})", handle, endpoint.characteristic_uuid);
        self.transport
            .characteristic_read(&address, endpoint.service_uuid, endpoint.characteristic_uuid)
            .await
    }

    /// Writes `data` to the endpoint, picking the write primitive from
    /// its capabilities (without-response preferred). Fails with
    /// `WriteNotSupported` when the endpoint has neither.
    pub async fn write(&self, handle: usize, data: &[u8]) -> Result<(), BleError> {
        let (address, endpoint) = self.resolve(handle)?;
        match preferred_write_mode(&endpoint.props) {
            Some(WriteMode::Command) => {
                debug!("Write-command to endpoint {} ({} bytes)", handle, data.len());
                self.transport
                    .characteristic_write_command(
                        &address,
                        endpoint.service_uuid,
                        endpoint.characteristic_uuid,
                        data,
                    )
                    .await
            }
            Some(WriteMode::Request) => {
                debug!("Write-request to endpoint {} ({} bytes)", handle, data.len());
                self.transport
                    .characteristic_write_request(
                        &address,
                        endpoint.service_uuid,
                        endpoint.characteristic_uuid,
                        data,
                    )
                    .await
            }
            None => Err(BleError::WriteNotSupported),
        }
    }

    /// Subscribes to the endpoint's notifications. Every payload is
    /// re-emitted as a `NotificationReceived` event until disconnect or
    /// [`unsubscribe`](Self::unsubscribe). Subscribing twice to the same
    /// handle is a no-op.
    pub async fn subscribe(&self, handle: usize) -> Result<(), BleError> {
        let (address, endpoint) = self.resolve(handle)?;
        if !endpoint.props.notifiable {
            return Err(BleError::NotNotifiable);
        }

        {
            let active = self.active.lock().expect("active lock poisoned");
            if let Some(conn) = active.as_ref() {
                if conn.notify_tasks.contains_key(&handle) {
                    debug!("Endpoint {} already subscribed", handle);
                    return Ok(());
                }
            }
        }

        let stream = self
            .transport
            .characteristic_subscribe(&address, endpoint.service_uuid, endpoint.characteristic_uuid)
            .await?;

        let token = CancellationToken::new();
        let events = self.events.clone();
        let cancel = token.clone();
        tokio::spawn(async move {
            forward_notifications(stream, handle, events, cancel).await;
        });

        // The link may have dropped while the subscribe call was in
        // flight; only register the task against the same connection.
        let mut active = self.active.lock().expect("active lock poisoned");
        match active.as_mut() {
            Some(conn) if conn.address == address => {
                info!("Subscribed to endpoint {} on {}", handle, address);
                conn.notify_tasks.insert(handle, token);
                Ok(())
            }
            _ => {
                token.cancel();
                Err(BleError::NotConnected)
            }
        }
    }

    /// Cancels the notification forwarding task for `handle`. Idempotent
    /// for valid handles that are not subscribed; `InvalidHandle` out of
    /// bounds, `NotConnected` with no active link.
    pub fn unsubscribe(&self, handle: usize) -> Result<(), BleError> {
        let mut active = self.active.lock().expect("active lock poisoned");
        let conn = active.as_mut().ok_or(BleError::NotConnected)?;
        if handle >= conn.endpoints.len() {
            return Err(BleError::InvalidHandle(handle));
        }
        if let Some(token) = conn.notify_tasks.remove(&handle) {
            info!("Unsubscribed from endpoint {}", handle);
            token.cancel();
        }
        Ok(())
    }
}

/// Runs on its own task: pumps one subscription's payloads into the
/// event queue, one `NotificationReceived` per payload, in arrival
/// order.
async fn forward_notifications(
    mut stream: NotificationStream,
    handle: usize,
    events: EventSender,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(data)) => {
                    events.emit(SessionEvent::NotificationReceived {
                        endpoint_handle: handle,
                        data,
                    });
                }
                Some(Err(err)) => {
                    error!("Notification stream error on endpoint {}: {}", handle, err);
                    break;
                }
                None => {
                    info!("Notification stream ended for endpoint {}", handle);
                    break;
                }
            },
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(wwr: bool, wnr: bool) -> CharacteristicProps {
        CharacteristicProps {
            readable: false,
            write_with_response: wwr,
            write_without_response: wnr,
            notifiable: false,
        }
    }

    #[test]
    fn write_without_response_is_preferred() {
        assert_eq!(
            preferred_write_mode(&props(true, true)),
            Some(WriteMode::Command)
        );
        assert_eq!(
            preferred_write_mode(&props(false, true)),
            Some(WriteMode::Command)
        );
    }

    #[test]
    fn write_with_response_is_the_fallback() {
        assert_eq!(
            preferred_write_mode(&props(true, false)),
            Some(WriteMode::Request)
        );
    }

    #[test]
    fn no_write_capability_means_unsupported() {
        assert_eq!(preferred_write_mode(&props(false, false)), None);
    }
}
