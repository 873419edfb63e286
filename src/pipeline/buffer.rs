use std::collections::VecDeque;

use crate::types::{Channel, Sample};

/// 默认滚动窗口长度
pub const DEFAULT_CAPACITY: usize = 30;

/// One entry of a series. `None` keeps the slot when the field was missing.
pub type SeriesPoint = (String, Option<f64>);

/// Fixed-capacity rolling series, one per channel, kept index-aligned.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    series: [VecDeque<SeriesPoint>; 2],
    capacity: usize,
}

impl Default for SeriesBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            series: [
                VecDeque::with_capacity(capacity + 1),
                VecDeque::with_capacity(capacity + 1),
            ],
            capacity,
        }
    }

    /// Appends to one channel. Overflow evicts the oldest entry of every channel.
    pub fn append(&mut self, channel: Channel, label: impl Into<String>, value: Option<f64>) {
        let queue = &mut self.series[channel.index()];
        queue.push_back((label.into(), value));

        // 超过容量时所有通道同时移除最旧数据，保持索引对齐
        if queue.len() > self.capacity {
            for queue in self.series.iter_mut() {
                queue.pop_front();
            }
        }
    }

    /// Appends one row across both channels with a shared label.
    pub fn push_sample(&mut self, label: &str, sample: &Sample) {
        for channel in Channel::ALL {
            self.append(channel, label, sample.value(channel));
        }
    }

    pub fn series(&self, channel: Channel) -> &VecDeque<SeriesPoint> {
        &self.series[channel.index()]
    }

    pub fn labels(&self, channel: Channel) -> Vec<String> {
        self.series(channel).iter().map(|(label, _)| label.clone()).collect()
    }

    pub fn values(&self, channel: Channel) -> Vec<Option<f64>> {
        self.series(channel).iter().map(|(_, value)| *value).collect()
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.series(channel).len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(VecDeque::is_empty)
    }

    pub fn clear(&mut self) {
        for queue in self.series.iter_mut() {
            queue.clear();
        }
    }
}
