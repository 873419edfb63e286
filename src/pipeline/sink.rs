use log::debug;

use super::buffer::SeriesBuffer;
use crate::config::PlotConfig;
use crate::types::Channel;

/// Static description of one plotted series.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub channel: Channel,
    pub name: String,
    pub color: [u8; 3],
}

impl ChannelSpec {
    /// Series definitions in display order.
    pub fn from_plot_config(config: &PlotConfig) -> Vec<ChannelSpec> {
        vec![
            ChannelSpec {
                channel: Channel::Acceleration,
                name: "Acceleration (m/s²)".to_string(),
                color: config.colors.acceleration,
            },
            ChannelSpec {
                channel: Channel::Velocity,
                name: "Velocity (mm/s)".to_string(),
                color: config.colors.velocity,
            },
        ]
    }
}

/// Renderer capability fed by the adapter.
pub trait RenderSink {
    fn set_series(&mut self, channel: Channel, labels: &[String], values: &[Option<f64>]);
    fn redraw(&mut self);
}

/// Builds the sink on first activation.
pub trait SinkFactory {
    type Sink: RenderSink;

    fn build(&mut self, channels: &[ChannelSpec]) -> Self::Sink;
}

impl<S, F> SinkFactory for F
where
    S: RenderSink,
    F: FnMut(&[ChannelSpec]) -> S,
{
    type Sink = S;

    fn build(&mut self, channels: &[ChannelSpec]) -> S {
        self(channels)
    }
}

/// Lazily constructs the sink and pushes buffer snapshots into it.
pub struct SinkAdapter<F: SinkFactory> {
    factory: F,
    channels: Vec<ChannelSpec>,
    sink: Option<F::Sink>,
}

impl<F: SinkFactory> SinkAdapter<F> {
    pub fn new(factory: F, channels: Vec<ChannelSpec>) -> Self {
        Self {
            factory,
            channels,
            sink: None,
        }
    }

    /// Returns `true` only on the call that constructed the sink.
    pub fn activate(&mut self) -> bool {
        if self.sink.is_some() {
            return false;
        }
        debug!("Constructing render sink with {} series", self.channels.len());
        self.sink = Some(self.factory.build(&self.channels));
        true
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    /// Pushes every channel and redraws. No-op until activated.
    pub fn refresh(&mut self, buffer: &SeriesBuffer) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        for spec in &self.channels {
            let labels = buffer.labels(spec.channel);
            let values = buffer.values(spec.channel);
            sink.set_series(spec.channel, &labels, &values);
        }
        sink.redraw();
    }

    pub fn sink(&self) -> Option<&F::Sink> {
        self.sink.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Sink double that records every call.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub series: Vec<(Channel, Vec<String>, Vec<Option<f64>>)>,
        pub redraws: usize,
    }

    impl RecordingSink {
        pub fn latest(&self, channel: Channel) -> Option<&(Channel, Vec<String>, Vec<Option<f64>>)> {
            self.series.iter().rev().find(|(c, _, _)| *c == channel)
        }
    }

    impl RenderSink for RecordingSink {
        fn set_series(&mut self, channel: Channel, labels: &[String], values: &[Option<f64>]) {
            self.series.push((channel, labels.to_vec(), values.to_vec()));
        }

        fn redraw(&mut self) {
            self.redraws += 1;
        }
    }

    /// Factory that counts how many sinks it built.
    pub fn counting_factory() -> (impl FnMut(&[ChannelSpec]) -> RecordingSink, Rc<Cell<usize>>) {
        let builds = Rc::new(Cell::new(0));
        let counter = Rc::clone(&builds);
        let factory = move |_: &[ChannelSpec]| {
            counter.set(counter.get() + 1);
            RecordingSink::default()
        };
        (factory, builds)
    }
}
