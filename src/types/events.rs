/// Identifies one user-initiated connection attempt.
pub type AttemptId = u64;

/// Everything the pipeline reacts to, in the order it must be processed.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ConnectRequested,
    VisualizeRequested,
    Transport {
        attempt: AttemptId,
        event: TransportEvent,
    },
}

impl PipelineEvent {
    pub fn transport(attempt: AttemptId, event: TransportEvent) -> Self {
        PipelineEvent::Transport { attempt, event }
    }
}

/// Outcomes reported by the connector for a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    DeviceSelected { name: String },
    SelectionCancelled,
    ServicesResolved,
    ServiceUnavailable(String),
    NotificationsOpened,
    FrameReceived(Vec<u8>),
    DeviceDisconnected(Option<String>),
    TransportFailed(String),
}

/// Work the pipeline asks its owner to perform after handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Spawn the connection sequence tagged with this attempt.
    StartConnection { attempt: AttemptId },
    /// Show the readings and chart sections. Emitted once per successful connection.
    RevealReadings,
}
