use chrono::{DateTime, Local};
use log::{debug, error, info, warn};

use super::buffer::SeriesBuffer;
use super::connection::{ConnectRequest, ConnectionMachine, ConnectionState, Transition};
use super::decoder::FrameDecoder;
use super::event_log::OperatorLog;
use super::sink::{ChannelSpec, SinkAdapter, SinkFactory};
use crate::config::AppConfig;
use crate::error::StateViolation;
use crate::types::{AttemptId, Channel, Effect, PipelineEvent, Sample, TransportEvent};
use crate::utils::{format_clock_label, format_reading};

/// Knobs taken from the application config.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub capacity: usize,
    pub delimiter: char,
    pub log_capacity: usize,
    pub retain_history_on_reconnect: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PipelineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            capacity: config.plot.max_points,
            delimiter: config.link.delimiter,
            log_capacity: config.log.max_entries,
            retain_history_on_reconnect: config.session.retain_history_on_reconnect,
        }
    }
}

/// One successful connection, from entering `Streaming` until it ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: u64,
    pub device: String,
    pub started_at: DateTime<Local>,
    pub samples_accepted: u64,
}

/// Latest display strings. A channel keeps its last valid value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Readings {
    pub acceleration: Option<String>,
    pub velocity: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub samples_accepted: u64,
    pub samples_discarded: u64,
}

/// Ingestion session owned by the application root.
///
/// All mutation happens through [`Pipeline::dispatch`], one event at a time,
/// which keeps the buffer and sink free of locking.
pub struct Pipeline<F: SinkFactory> {
    machine: ConnectionMachine,
    decoder: FrameDecoder,
    buffer: SeriesBuffer,
    sink: SinkAdapter<F>,
    log: OperatorLog,
    readings: Readings,
    session: Option<Session>,
    sessions_started: u64,
    retain_history: bool,
    stats: PipelineStats,
}

impl<F: SinkFactory> Pipeline<F> {
    pub fn new(options: PipelineOptions, factory: F, channels: Vec<ChannelSpec>) -> Self {
        Self {
            machine: ConnectionMachine::new(),
            decoder: FrameDecoder::new(options.delimiter),
            buffer: SeriesBuffer::new(options.capacity),
            sink: SinkAdapter::new(factory, channels),
            log: OperatorLog::new(options.log_capacity),
            readings: Readings::default(),
            session: None,
            sessions_started: 0,
            retain_history: options.retain_history_on_reconnect,
            stats: PipelineStats::default(),
        }
    }

    pub fn from_config(config: &AppConfig, factory: F) -> Self {
        Self::new(
            PipelineOptions::from_config(config),
            factory,
            ChannelSpec::from_plot_config(&config.plot),
        )
    }

    pub fn dispatch(&mut self, event: PipelineEvent) -> Vec<Effect> {
        match event {
            PipelineEvent::ConnectRequested => self.on_connect_requested(),
            PipelineEvent::VisualizeRequested => {
                self.on_visualize_requested();
                Vec::new()
            }
            PipelineEvent::Transport {
                attempt,
                event: TransportEvent::FrameReceived(bytes),
            } => {
                self.on_frame(attempt, &bytes);
                Vec::new()
            }
            PipelineEvent::Transport { attempt, event } => self.on_transport(attempt, event),
        }
    }

    fn on_connect_requested(&mut self) -> Vec<Effect> {
        match self.machine.request_connect() {
            ConnectRequest::Started { attempt, restarted_from } => {
                if let Some(previous) = restarted_from {
                    self.log.push(format!("Restarting connection after {previous}"));
                }
                self.log.push("Scanning for devices...");
                vec![Effect::StartConnection { attempt }]
            }
            ConnectRequest::InFlight => {
                self.log
                    .push(format!("Connect ignored: link is already {}", self.machine.state()));
                Vec::new()
            }
        }
    }

    fn on_visualize_requested(&mut self) {
        if self.sink.activate() {
            info!("Chart activated with {} buffered points", self.buffer.len(Channel::Acceleration));
            self.log.push("Chart activated.");
            // 激活前已缓冲的数据立即显示
            self.sink.refresh(&self.buffer);
        } else {
            debug!("Chart already active");
        }
    }

    fn on_transport(&mut self, attempt: AttemptId, event: TransportEvent) -> Vec<Effect> {
        let from = match self.machine.on_transport(attempt, &event) {
            Transition::Moved { from } => from,
            Transition::Stayed => return Vec::new(),
            Transition::Ignored => {
                debug!("Ignored {:?} for attempt {} while {}", event, attempt, self.machine.state());
                return Vec::new();
            }
        };

        let mut effects = Vec::new();
        match self.machine.state().clone() {
            ConnectionState::Connecting { device } => {
                self.log.push(format!("Connecting to {device}..."));
            }
            ConnectionState::Streaming {
                device,
                notifications_open: false,
            } => {
                self.start_session(device);
                effects.push(Effect::RevealReadings);
            }
            ConnectionState::Streaming {
                notifications_open: true, ..
            } => {
                self.log.push("Connected & notifications started.");
            }
            ConnectionState::Disconnected => {
                let detail = match &event {
                    TransportEvent::DeviceDisconnected(Some(reason)) => format!(": {reason}"),
                    _ => String::new(),
                };
                warn!("Device disconnected{}", detail);
                self.log.push(format!("Device disconnected{detail}"));
                self.end_session();
            }
            ConnectionState::Failed(reason) => {
                error!("Connection attempt {} failed from {}: {}", attempt, from, reason);
                self.log.push(format!("Connection error: {reason}"));
                self.end_session();
            }
            ConnectionState::Idle | ConnectionState::Scanning => {}
        }
        effects
    }

    fn start_session(&mut self, device: String) {
        if self.sessions_started > 0 && !self.retain_history {
            info!("Clearing {} buffered points for new session", self.buffer.len(Channel::Acceleration));
            self.buffer.clear();
            self.sink.refresh(&self.buffer);
        }

        self.sessions_started += 1;
        let session = Session {
            id: self.sessions_started,
            device,
            started_at: Local::now(),
            samples_accepted: 0,
        };
        info!("Session {} started with {}", session.id, session.device);
        self.log.push(format!("Connected to {}.", session.device));
        self.session = Some(session);
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!(
                "Session {} ended after {} samples",
                session.id, session.samples_accepted
            );
        }
    }

    fn on_frame(&mut self, attempt: AttemptId, raw: &[u8]) {
        self.stats.frames_received += 1;

        let decoded = match self.decoder.decode(raw) {
            Ok(decoded) => decoded,
            Err(rejected) => {
                self.stats.frames_rejected += 1;
                self.log.push(format!("Received: {}", rejected.text));
                debug!("Rejected frame {:?}: {}", rejected.text, rejected.error);
                return;
            }
        };

        // 过滤前先记录每一帧
        self.log.push(format!("Received: {}", decoded.text));
        for field_error in &decoded.field_errors {
            debug!("Frame {:?}: {}", decoded.text, field_error);
        }

        if attempt != self.machine.attempt() {
            warn!("Frame from attempt {} arrived during attempt {}", attempt, self.machine.attempt());
            self.log.push(format!("Discarded: frame from superseded attempt {attempt}"));
            self.stats.samples_discarded += 1;
            return;
        }
        if !self.machine.state().is_streaming() {
            let violation = StateViolation {
                state: self.machine.state().to_string(),
            };
            warn!("{} (attempt {})", violation, attempt);
            self.log.push(format!("Discarded: {violation}"));
            self.stats.samples_discarded += 1;
            return;
        }

        self.accept(decoded.sample);
    }

    fn accept(&mut self, sample: Sample) {
        if !sample.has_values() {
            return;
        }

        if let Some(acceleration) = sample.acceleration {
            self.readings.acceleration = Some(format_reading(acceleration));
        }
        if let Some(velocity) = sample.velocity {
            self.readings.velocity = Some(format_reading(velocity));
        }

        let label = format_clock_label(&sample.observed_at);
        self.buffer.push_sample(&label, &sample);
        self.stats.samples_accepted += 1;
        if let Some(session) = self.session.as_mut() {
            session.samples_accepted += 1;
        }

        self.sink.refresh(&self.buffer);
    }

    pub fn state(&self) -> &ConnectionState {
        self.machine.state()
    }

    pub fn status_text(&self) -> String {
        self.machine.state().status_text()
    }

    pub fn buffer(&self) -> &SeriesBuffer {
        &self.buffer
    }

    pub fn sink(&self) -> Option<&F::Sink> {
        self.sink.sink()
    }

    pub fn is_chart_active(&self) -> bool {
        self.sink.is_active()
    }

    pub fn log(&self) -> &OperatorLog {
        &self.log
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::connection::FailureReason;
    use crate::pipeline::sink::testing::{counting_factory, RecordingSink};
    use std::cell::Cell;
    use std::rc::Rc;

    type TestPipeline = Pipeline<Box<dyn FnMut(&[ChannelSpec]) -> RecordingSink>>;

    fn pipeline_with(options: PipelineOptions) -> (TestPipeline, Rc<Cell<usize>>) {
        let (factory, builds) = counting_factory();
        let channels = ChannelSpec::from_plot_config(&AppConfig::default().plot);
        let factory: Box<dyn FnMut(&[ChannelSpec]) -> RecordingSink> = Box::new(factory);
        (Pipeline::new(options, factory, channels), builds)
    }

    fn pipeline() -> (TestPipeline, Rc<Cell<usize>>) {
        pipeline_with(PipelineOptions::default())
    }

    fn transport(attempt: AttemptId, event: TransportEvent) -> PipelineEvent {
        PipelineEvent::transport(attempt, event)
    }

    fn frame(attempt: AttemptId, text: &str) -> PipelineEvent {
        transport(attempt, TransportEvent::FrameReceived(text.as_bytes().to_vec()))
    }

    /// Drives a pipeline into Streaming and returns the attempt id.
    fn connect(pipeline: &mut TestPipeline) -> AttemptId {
        let effects = pipeline.dispatch(PipelineEvent::ConnectRequested);
        let Some(Effect::StartConnection { attempt }) = effects.first().cloned() else {
            panic!("expected StartConnection, got {effects:?}");
        };
        pipeline.dispatch(transport(attempt, TransportEvent::DeviceSelected { name: "sensor".into() }));
        let effects = pipeline.dispatch(transport(attempt, TransportEvent::ServicesResolved));
        assert_eq!(effects, vec![Effect::RevealReadings]);
        pipeline.dispatch(transport(attempt, TransportEvent::NotificationsOpened));
        attempt
    }

    #[test]
    fn streaming_frame_updates_readings_and_buffer() {
        let (mut pipeline, _) = pipeline();
        let attempt = connect(&mut pipeline);

        pipeline.dispatch(frame(attempt, "3.14,0.02"));

        assert_eq!(pipeline.readings().acceleration.as_deref(), Some("3.14"));
        assert_eq!(pipeline.readings().velocity.as_deref(), Some("0.02"));
        assert_eq!(pipeline.buffer().values(Channel::Acceleration), vec![Some(3.14)]);
        assert_eq!(pipeline.buffer().values(Channel::Velocity), vec![Some(0.02)]);
        assert_eq!(pipeline.log().count_prefixed("Received: 3.14,0.02"), 1);
        assert_eq!(pipeline.session().map(|s| s.samples_accepted), Some(1));
    }

    #[test]
    fn invalid_acceleration_only_updates_velocity() {
        let (mut pipeline, _) = pipeline();
        let attempt = connect(&mut pipeline);

        pipeline.dispatch(frame(attempt, "1.00,1.00"));
        pipeline.dispatch(frame(attempt, "abc,0.02"));

        assert_eq!(pipeline.readings().acceleration.as_deref(), Some("1.00"));
        assert_eq!(pipeline.readings().velocity.as_deref(), Some("0.02"));
        assert_eq!(pipeline.buffer().values(Channel::Acceleration), vec![Some(1.0), None]);
        assert_eq!(pipeline.buffer().values(Channel::Velocity), vec![Some(1.0), Some(0.02)]);
    }

    #[test]
    fn fully_invalid_sample_is_logged_but_not_buffered() {
        let (mut pipeline, _) = pipeline();
        let attempt = connect(&mut pipeline);

        pipeline.dispatch(frame(attempt, "abc,def"));

        assert!(pipeline.buffer().is_empty());
        assert_eq!(pipeline.readings(), &Readings::default());
        assert_eq!(pipeline.log().count_prefixed("Received: abc,def"), 1);
    }

    #[test]
    fn rejected_frame_does_not_touch_buffer() {
        let (mut pipeline, _) = pipeline();
        let attempt = connect(&mut pipeline);

        pipeline.dispatch(frame(attempt, "42"));

        assert!(pipeline.buffer().is_empty());
        assert_eq!(pipeline.stats().frames_rejected, 1);
        assert_eq!(pipeline.log().count_prefixed("Received: 42"), 1);
    }

    #[test]
    fn samples_outside_streaming_are_discarded() {
        let (mut pipeline, _) = pipeline();
        pipeline.dispatch(frame(0, "1,2"));
        assert!(pipeline.buffer().is_empty());

        let effects = pipeline.dispatch(PipelineEvent::ConnectRequested);
        assert_eq!(effects, vec![Effect::StartConnection { attempt: 1 }]);
        pipeline.dispatch(frame(1, "1,2"));
        assert!(pipeline.buffer().is_empty());
        assert_eq!(pipeline.stats().samples_discarded, 2);
        assert_eq!(pipeline.log().count_prefixed("Discarded: "), 2);
        assert_eq!(pipeline.log().count_prefixed("Received: 1,2"), 2);
    }

    #[test]
    fn stale_attempt_frames_are_discarded() {
        let (mut pipeline, _) = pipeline();
        let first = connect(&mut pipeline);
        pipeline.dispatch(transport(first, TransportEvent::TransportFailed("link lost".into())));
        let second = connect(&mut pipeline);
        assert_ne!(first, second);

        pipeline.dispatch(frame(first, "9,9"));
        assert!(pipeline.buffer().is_empty());
        assert_eq!(pipeline.log().count_prefixed("Discarded: frame from superseded attempt 1"), 1);
        assert_eq!(pipeline.log().count_prefixed("Discarded: sample discarded while"), 0);
        pipeline.dispatch(frame(second, "1,1"));
        assert_eq!(pipeline.buffer().len(Channel::Velocity), 1);
    }

    #[test]
    fn current_attempt_frames_after_link_ends_are_discarded() {
        let (mut pipeline, _) = pipeline();
        let attempt = connect(&mut pipeline);
        pipeline.dispatch(frame(attempt, "1,1"));
        pipeline.dispatch(transport(attempt, TransportEvent::DeviceDisconnected(None)));

        pipeline.dispatch(frame(attempt, "2,2"));
        assert_eq!(pipeline.buffer().len(Channel::Acceleration), 1);
        assert_eq!(pipeline.log().count_prefixed("Discarded: sample discarded while Disconnected"), 1);

        let effects = pipeline.dispatch(PipelineEvent::ConnectRequested);
        assert_eq!(effects, vec![Effect::StartConnection { attempt: 2 }]);
        let attempt = 2;
        pipeline.dispatch(transport(attempt, TransportEvent::TransportFailed("radio off".into())));
        assert!(matches!(pipeline.state(), ConnectionState::Failed(_)));

        pipeline.dispatch(frame(attempt, "3,3"));
        assert_eq!(pipeline.buffer().len(Channel::Acceleration), 1);
        assert_eq!(pipeline.buffer().len(Channel::Velocity), 1);
        assert_eq!(pipeline.stats().samples_discarded, 2);
    }

    #[test]
    fn thirty_five_samples_keep_last_thirty() {
        let (mut pipeline, _) = pipeline();
        let attempt = connect(&mut pipeline);
        for i in 0..35 {
            pipeline.dispatch(frame(attempt, &format!("{i},{}", i * 2)));
        }

        let acc = pipeline.buffer().values(Channel::Acceleration);
        assert_eq!(acc.len(), 30);
        assert_eq!(acc.first(), Some(&Some(5.0)));
        assert_eq!(acc.last(), Some(&Some(34.0)));
        let vel = pipeline.buffer().values(Channel::Velocity);
        assert_eq!(vel.first(), Some(&Some(10.0)));
    }

    #[test]
    fn no_redraw_until_visualize_then_once_per_sample() {
        let (mut pipeline, builds) = pipeline();
        let attempt = connect(&mut pipeline);

        pipeline.dispatch(frame(attempt, "1,1"));
        assert!(pipeline.sink().is_none());
        assert_eq!(pipeline.buffer().len(Channel::Acceleration), 1);

        pipeline.dispatch(PipelineEvent::VisualizeRequested);
        pipeline.dispatch(PipelineEvent::VisualizeRequested);
        assert_eq!(builds.get(), 1);

        // activation pushes what was already buffered
        let sink = pipeline.sink().unwrap();
        assert_eq!(sink.redraws, 1);
        assert_eq!(sink.latest(Channel::Acceleration).unwrap().2, vec![Some(1.0)]);

        pipeline.dispatch(frame(attempt, "2,2"));
        pipeline.dispatch(frame(attempt, "3,3"));
        let sink = pipeline.sink().unwrap();
        assert_eq!(sink.redraws, 3);
        assert_eq!(sink.latest(Channel::Velocity).unwrap().2, vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn cancelled_selection_then_manual_retry() {
        let (mut pipeline, _) = pipeline();
        pipeline.dispatch(PipelineEvent::ConnectRequested);
        pipeline.dispatch(transport(1, TransportEvent::SelectionCancelled));

        assert_eq!(pipeline.state(), &ConnectionState::Failed(FailureReason::NoDeviceSelected));
        assert_eq!(pipeline.status_text(), "Connection failed: no device selected");
        assert_eq!(pipeline.log().count_prefixed("Connection error: no device selected"), 1);

        let effects = pipeline.dispatch(PipelineEvent::ConnectRequested);
        assert_eq!(effects, vec![Effect::StartConnection { attempt: 2 }]);
        assert_eq!(pipeline.state(), &ConnectionState::Scanning);
    }

    #[test]
    fn connect_while_streaming_has_no_effect() {
        let (mut pipeline, _) = pipeline();
        connect(&mut pipeline);
        assert!(pipeline.dispatch(PipelineEvent::ConnectRequested).is_empty());
        assert!(pipeline.state().is_streaming());
    }

    #[test]
    fn history_is_retained_across_reconnects_by_default() {
        let (mut pipeline, _) = pipeline();
        let first = connect(&mut pipeline);
        pipeline.dispatch(frame(first, "1,1"));
        pipeline.dispatch(transport(first, TransportEvent::DeviceDisconnected(None)));
        assert_eq!(pipeline.state(), &ConnectionState::Disconnected);
        assert!(pipeline.session().is_none());

        let second = connect(&mut pipeline);
        pipeline.dispatch(frame(second, "2,2"));
        assert_eq!(pipeline.buffer().len(Channel::Acceleration), 2);
        assert_eq!(pipeline.session().map(|s| s.id), Some(2));
    }

    #[test]
    fn history_can_be_cleared_per_session() {
        let options = PipelineOptions {
            retain_history_on_reconnect: false,
            ..PipelineOptions::default()
        };
        let (mut pipeline, _) = pipeline_with(options);
        let first = connect(&mut pipeline);
        pipeline.dispatch(frame(first, "1,1"));
        pipeline.dispatch(transport(first, TransportEvent::DeviceDisconnected(Some("out of range".into()))));
        assert_eq!(pipeline.log().count_prefixed("Device disconnected: out of range"), 1);

        let second = connect(&mut pipeline);
        assert!(pipeline.buffer().is_empty());
        pipeline.dispatch(frame(second, "2,2"));
        assert_eq!(pipeline.buffer().values(Channel::Acceleration), vec![Some(2.0)]);
    }

    #[test]
    fn reveal_is_emitted_once_per_connection() {
        let (mut pipeline, _) = pipeline();
        let attempt = connect(&mut pipeline);
        let effects = pipeline.dispatch(transport(attempt, TransportEvent::NotificationsOpened));
        assert!(effects.is_empty());
        let effects = pipeline.dispatch(transport(attempt, TransportEvent::ServicesResolved));
        assert!(effects.is_empty());
    }
}
