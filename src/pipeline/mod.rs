pub mod buffer;
pub mod connection;
pub mod decoder;
pub mod event_log;
pub mod session;
pub mod sink;

pub use connection::ConnectionState;
pub use session::{Pipeline, Readings};
pub use sink::{ChannelSpec, RenderSink};
