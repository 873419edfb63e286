use crossbeam_channel::{Sender, TrySendError};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use super::{Notification, NotificationHandler, Transport};
use crate::config::LinkConfig;
use crate::error::TransportError;
use crate::types::{AttemptId, PipelineEvent, TransportEvent};

/// Back-off while the UI has not drained a full channel.
const SEND_RETRY: Duration = Duration::from_millis(10);

/// Service and characteristic the connection sequence resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub service_id: String,
    pub characteristic_id: String,
}

impl From<&LinkConfig> for LinkTarget {
    fn from(config: &LinkConfig) -> Self {
        Self {
            service_id: config.service_uuid.clone(),
            characteristic_id: config.characteristic_uuid.clone(),
        }
    }
}

/// Tags transport events with their attempt and forwards them to the UI thread.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<PipelineEvent>,
    attempt: AttemptId,
    current_attempt: Arc<AtomicU64>,
    shutdown_signal: Arc<AtomicBool>,
}

impl EventSender {
    pub fn new(
        sender: Sender<PipelineEvent>,
        attempt: AttemptId,
        current_attempt: Arc<AtomicU64>,
        shutdown_signal: Arc<AtomicBool>,
    ) -> Self {
        Self {
            sender,
            attempt,
            current_attempt,
            shutdown_signal,
        }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// False once a newer attempt started or the application is shutting down.
    pub fn is_live(&self) -> bool {
        !self.shutdown_signal.load(Ordering::Relaxed)
            && self.current_attempt.load(Ordering::Relaxed) == self.attempt
    }

    /// Lifecycle events must reach the pipeline. A full channel is retried
    /// on a timer so the runtime worker is never parked. Gives up on shutdown.
    pub async fn send(&self, event: TransportEvent) -> bool {
        let mut pending = PipelineEvent::transport(self.attempt, event);
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return true,
                Err(TrySendError::Disconnected(_)) => return false,
                Err(TrySendError::Full(event)) => {
                    if self.shutdown_signal.load(Ordering::Relaxed) {
                        warn!("Shutting down with a full event channel, dropping {:?}", event);
                        return false;
                    }
                    pending = event;
                    tokio::time::sleep(SEND_RETRY).await;
                }
            }
        }
    }

    /// `send` for synchronous notification handlers: one immediate try, then
    /// the retry moves onto the runtime.
    fn send_detached(&self, event: TransportEvent) {
        let Err(TrySendError::Full(PipelineEvent::Transport { event, .. })) =
            self.sender.try_send(PipelineEvent::transport(self.attempt, event))
        else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                let sender = self.clone();
                handle.spawn(async move {
                    sender.send(event).await;
                });
            }
            Err(_) => warn!("Event channel full outside the runtime, dropping {:?}", event),
        }
    }

    /// Frames are best effort: dropped when the channel is full.
    pub fn send_frame(&self, bytes: Vec<u8>) -> bool {
        match self
            .sender
            .try_send(PipelineEvent::transport(self.attempt, TransportEvent::FrameReceived(bytes)))
        {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping frame for attempt {}", self.attempt);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn deliver(&self, notification: Notification) -> bool {
        if !self.is_live() {
            info!("Attempt {} superseded, stopping notification delivery", self.attempt);
            return false;
        }

        match notification {
            Notification::Frame(bytes) => self.send_frame(bytes),
            Notification::Closed(reason) => {
                self.send_detached(TransportEvent::DeviceDisconnected(reason));
                false
            }
            Notification::Error(message) => {
                self.send_detached(TransportEvent::TransportFailed(message));
                false
            }
        }
    }
}

/// Runs request → connect → resolve → subscribe. The first failing step
/// reports its failure and ends the sequence.
pub async fn run_connection(transport: Arc<dyn Transport>, target: LinkTarget, events: EventSender) {
    info!("Attempt {}: requesting device for service {}", events.attempt(), target.service_id);

    let device = match transport.request_device(&target.service_id).await {
        Ok(device) => device,
        Err(TransportError::NoDeviceSelected) => {
            events.send(TransportEvent::SelectionCancelled).await;
            return;
        }
        Err(e) => {
            events.send(TransportEvent::TransportFailed(e.to_string())).await;
            return;
        }
    };

    let name = device.name();
    events.send(TransportEvent::DeviceSelected { name: name.clone() }).await;

    let mut link = match device.connect().await {
        Ok(link) => link,
        Err(e) => {
            events.send(TransportEvent::TransportFailed(e.to_string())).await;
            return;
        }
    };
    info!("Attempt {}: connected to {}", events.attempt(), name);

    let characteristic = match link
        .resolve_characteristic(&target.service_id, &target.characteristic_id)
        .await
    {
        Ok(characteristic) => characteristic,
        Err(e @ (TransportError::ServiceUnavailable(_) | TransportError::CharacteristicUnavailable(_))) => {
            events.send(TransportEvent::ServiceUnavailable(e.to_string())).await;
            return;
        }
        Err(e) => {
            events.send(TransportEvent::TransportFailed(e.to_string())).await;
            return;
        }
    };
    events.send(TransportEvent::ServicesResolved).await;

    let notifications = events.clone();
    let handler: NotificationHandler =
        Box::new(move |notification: Notification| notifications.deliver(notification));
    match characteristic.subscribe(handler).await {
        Ok(()) => {
            events.send(TransportEvent::NotificationsOpened).await;
        }
        Err(e) => {
            events.send(TransportEvent::TransportFailed(e.to_string())).await;
        }
    }
}
