use chrono::{DateTime, Local};
use std::fmt;

/// Telemetry channels in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Acceleration,
    Velocity,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Acceleration, Channel::Velocity];

    /// Position of the channel's field in a frame and in the series buffer.
    pub fn index(self) -> usize {
        match self {
            Channel::Acceleration => 0,
            Channel::Velocity => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Acceleration => write!(f, "acceleration"),
            Channel::Velocity => write!(f, "velocity"),
        }
    }
}

/// One decoded telemetry reading. A field that failed to parse is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub acceleration: Option<f64>,
    pub velocity: Option<f64>,
    pub observed_at: DateTime<Local>,
}

impl Sample {
    pub fn new(acceleration: Option<f64>, velocity: Option<f64>, observed_at: DateTime<Local>) -> Self {
        Self { acceleration, velocity, observed_at }
    }

    pub fn value(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Acceleration => self.acceleration,
            Channel::Velocity => self.velocity,
        }
    }

    /// 两个字段都无效时不产生任何数值更新
    pub fn has_values(&self) -> bool {
        self.acceleration.is_some() || self.velocity.is_some()
    }
}
