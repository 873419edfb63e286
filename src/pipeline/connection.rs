use log::{debug, info};
use std::fmt;

use crate::types::{AttemptId, TransportEvent};

/// Why the last attempt ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NoDeviceSelected,
    ServiceUnavailable(String),
    Transport(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoDeviceSelected => write!(f, "no device selected"),
            FailureReason::ServiceUnavailable(detail) => write!(f, "service unavailable ({detail})"),
            FailureReason::Transport(message) => write!(f, "{message}"),
        }
    }
}

/// Link lifecycle. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting { device: String },
    Streaming { device: String, notifications_open: bool },
    Disconnected,
    Failed(FailureReason),
}

impl ConnectionState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, ConnectionState::Streaming { .. })
    }

    /// Scanning, Connecting or Streaming.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ConnectionState::Scanning | ConnectionState::Connecting { .. } | ConnectionState::Streaming { .. }
        )
    }

    /// 状态栏显示文本
    pub fn status_text(&self) -> String {
        match self {
            ConnectionState::Idle => "Hi! Press Connect to begin.".to_string(),
            ConnectionState::Scanning => "Scanning for devices...".to_string(),
            ConnectionState::Connecting { device } => format!("Connecting to {device}..."),
            ConnectionState::Streaming { notifications_open: false, device } => {
                format!("Starting notifications on {device}...")
            }
            ConnectionState::Streaming { notifications_open: true, .. } => "Connection successful!".to_string(),
            ConnectionState::Disconnected => "Device disconnected. Press Connect to reconnect.".to_string(),
            ConnectionState::Failed(reason) => format!("Connection failed: {reason}"),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Scanning => write!(f, "Scanning"),
            ConnectionState::Connecting { .. } => write!(f, "Connecting"),
            ConnectionState::Streaming { .. } => write!(f, "Streaming"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Failed(reason) => write!(f, "Failed({reason})"),
        }
    }
}

/// Outcome of a user connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectRequest {
    /// Moved to `Scanning`. `restarted_from` is set when the cycle passed back through `Idle`.
    Started {
        attempt: AttemptId,
        restarted_from: Option<ConnectionState>,
    },
    /// An attempt is already running or streaming; nothing changed.
    InFlight,
}

/// Outcome of a transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Moved { from: ConnectionState },
    /// Valid for the state but changes nothing.
    Stayed,
    /// Not valid for the state, or from a stale attempt.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempt: AttemptId,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            attempt: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Attempt id of the most recent connect request. `0` before the first one.
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn request_connect(&mut self) -> ConnectRequest {
        if self.state.is_in_flight() {
            debug!("Connect requested while {}, ignoring", self.state);
            return ConnectRequest::InFlight;
        }

        let restarted_from = match self.state {
            ConnectionState::Idle => None,
            _ => Some(std::mem::replace(&mut self.state, ConnectionState::Idle)),
        };

        self.attempt += 1;
        self.state = ConnectionState::Scanning;
        info!("Connection attempt {} started", self.attempt);

        ConnectRequest::Started {
            attempt: self.attempt,
            restarted_from,
        }
    }

    /// Applies an event from `attempt`. Frames never change the state.
    pub fn on_transport(&mut self, attempt: AttemptId, event: &TransportEvent) -> Transition {
        if attempt != self.attempt {
            debug!("Dropping event from stale attempt {} (current {})", attempt, self.attempt);
            return Transition::Ignored;
        }

        let next = match (&self.state, event) {
            (ConnectionState::Scanning, TransportEvent::DeviceSelected { name }) => {
                ConnectionState::Connecting { device: name.clone() }
            }
            (ConnectionState::Scanning, TransportEvent::SelectionCancelled) => {
                ConnectionState::Failed(FailureReason::NoDeviceSelected)
            }
            (ConnectionState::Connecting { device }, TransportEvent::ServicesResolved) => ConnectionState::Streaming {
                device: device.clone(),
                notifications_open: false,
            },
            (ConnectionState::Connecting { .. }, TransportEvent::ServiceUnavailable(detail)) => {
                ConnectionState::Failed(FailureReason::ServiceUnavailable(detail.clone()))
            }
            (ConnectionState::Streaming { notifications_open: true, .. }, TransportEvent::NotificationsOpened) => {
                return Transition::Stayed;
            }
            (ConnectionState::Streaming { device, .. }, TransportEvent::NotificationsOpened) => {
                ConnectionState::Streaming {
                    device: device.clone(),
                    notifications_open: true,
                }
            }
            (ConnectionState::Streaming { .. }, TransportEvent::FrameReceived(_)) => return Transition::Stayed,
            (ConnectionState::Streaming { .. }, TransportEvent::DeviceDisconnected(_)) => ConnectionState::Disconnected,
            (ConnectionState::Failed(_), TransportEvent::TransportFailed(_)) => return Transition::Ignored,
            (_, TransportEvent::TransportFailed(message)) => {
                ConnectionState::Failed(FailureReason::Transport(message.clone()))
            }
            _ => return Transition::Ignored,
        };

        let from = std::mem::replace(&mut self.state, next);
        info!("Connection state {} -> {}", from, self.state);
        Transition::Moved { from }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming_machine() -> (ConnectionMachine, AttemptId) {
        let mut machine = ConnectionMachine::new();
        let ConnectRequest::Started { attempt, .. } = machine.request_connect() else {
            panic!("expected a new attempt");
        };
        machine.on_transport(attempt, &TransportEvent::DeviceSelected { name: "sensor".into() });
        machine.on_transport(attempt, &TransportEvent::ServicesResolved);
        (machine, attempt)
    }

    #[test]
    fn happy_path_reaches_streaming() {
        let (mut machine, attempt) = streaming_machine();
        assert_eq!(
            machine.state(),
            &ConnectionState::Streaming {
                device: "sensor".into(),
                notifications_open: false
            }
        );

        let transition = machine.on_transport(attempt, &TransportEvent::NotificationsOpened);
        assert!(matches!(transition, Transition::Moved { .. }));
        assert_eq!(machine.state().status_text(), "Connection successful!");

        // 重复通知开启是幂等的
        assert_eq!(machine.on_transport(attempt, &TransportEvent::NotificationsOpened), Transition::Stayed);
    }

    #[test]
    fn cancelled_selection_fails_and_never_retries() {
        let mut machine = ConnectionMachine::new();
        let ConnectRequest::Started { attempt, restarted_from } = machine.request_connect() else {
            panic!("expected a new attempt");
        };
        assert_eq!(restarted_from, None);

        machine.on_transport(attempt, &TransportEvent::SelectionCancelled);
        assert_eq!(machine.state(), &ConnectionState::Failed(FailureReason::NoDeviceSelected));

        // further events of the failed attempt do not revive it
        machine.on_transport(attempt, &TransportEvent::DeviceSelected { name: "late".into() });
        assert_eq!(machine.state(), &ConnectionState::Failed(FailureReason::NoDeviceSelected));

        let next = machine.request_connect();
        assert_eq!(
            next,
            ConnectRequest::Started {
                attempt: attempt + 1,
                restarted_from: Some(ConnectionState::Failed(FailureReason::NoDeviceSelected)),
            }
        );
        assert_eq!(machine.state(), &ConnectionState::Scanning);
    }

    #[test]
    fn missing_service_fails_connecting() {
        let mut machine = ConnectionMachine::new();
        machine.request_connect();
        let attempt = machine.attempt();
        machine.on_transport(attempt, &TransportEvent::DeviceSelected { name: "sensor".into() });
        machine.on_transport(attempt, &TransportEvent::ServiceUnavailable("d1f4".into()));
        assert_eq!(
            machine.state(),
            &ConnectionState::Failed(FailureReason::ServiceUnavailable("d1f4".into()))
        );
    }

    #[test]
    fn transport_error_fails_from_any_active_state() {
        let (mut machine, attempt) = streaming_machine();
        machine.on_transport(attempt, &TransportEvent::TransportFailed("GATT dropped".into()));
        assert_eq!(
            machine.state(),
            &ConnectionState::Failed(FailureReason::Transport("GATT dropped".into()))
        );
        assert_eq!(machine.state().status_text(), "Connection failed: GATT dropped");

        // a second failure keeps the first reason
        machine.on_transport(attempt, &TransportEvent::TransportFailed("again".into()));
        assert_eq!(
            machine.state(),
            &ConnectionState::Failed(FailureReason::Transport("GATT dropped".into()))
        );
    }

    #[test]
    fn device_disconnect_ends_streaming() {
        let (mut machine, attempt) = streaming_machine();
        machine.on_transport(attempt, &TransportEvent::DeviceDisconnected(None));
        assert_eq!(machine.state(), &ConnectionState::Disconnected);
        assert!(!machine.state().is_streaming());
    }

    #[test]
    fn connect_while_in_flight_is_ignored() {
        let mut machine = ConnectionMachine::new();
        machine.request_connect();
        assert_eq!(machine.request_connect(), ConnectRequest::InFlight);
        assert_eq!(machine.attempt(), 1);

        let (mut machine, _) = streaming_machine();
        assert_eq!(machine.request_connect(), ConnectRequest::InFlight);
    }

    #[test]
    fn stale_attempt_events_are_ignored() {
        let mut machine = ConnectionMachine::new();
        machine.request_connect();
        let first = machine.attempt();
        machine.on_transport(first, &TransportEvent::TransportFailed("timeout".into()));
        machine.request_connect();

        let transition = machine.on_transport(first, &TransportEvent::DeviceSelected { name: "old".into() });
        assert_eq!(transition, Transition::Ignored);
        assert_eq!(machine.state(), &ConnectionState::Scanning);
    }

    #[test]
    fn out_of_order_events_are_ignored() {
        let mut machine = ConnectionMachine::new();
        machine.request_connect();
        let attempt = machine.attempt();
        assert_eq!(machine.on_transport(attempt, &TransportEvent::ServicesResolved), Transition::Ignored);
        assert_eq!(
            machine.on_transport(attempt, &TransportEvent::FrameReceived(b"1,2".to_vec())),
            Transition::Ignored
        );
        assert_eq!(machine.state(), &ConnectionState::Scanning);
    }
}
