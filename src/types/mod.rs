pub mod sample;
pub mod events;

pub use sample::{Channel, Sample};
pub use events::{AttemptId, Effect, PipelineEvent, TransportEvent};
