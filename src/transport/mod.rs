// Transport capability
//
// The link to the sensor is modelled as four async steps, each of which may
// fail: pick a device advertising the service, connect to it, resolve the
// notification characteristic, subscribe. Implementations:
// - SimulatedTransport: local random telemetry, no hardware needed
// - MqttTransport: a gateway republishing the device's notifications to a broker

pub mod connector;
pub mod mqtt;
pub mod simulated;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{AppConfig, TransportKind};
use crate::error::TransportError;

pub use connector::{run_connection, EventSender, LinkTarget};
pub use mqtt::MqttTransport;
pub use simulated::SimulatedTransport;

/// What a subscribed characteristic delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Frame(Vec<u8>),
    /// The device ended the session.
    Closed(Option<String>),
    /// The transport itself broke.
    Error(String),
}

/// Receives notifications. Returning `false` asks the transport to stop delivering.
pub type NotificationHandler = Box<dyn FnMut(Notification) -> bool + Send + 'static>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Asks for a device offering `service_id`. `NoDeviceSelected` when none is chosen.
    async fn request_device(&self, service_id: &str) -> Result<Box<dyn Device>, TransportError>;
}

#[async_trait]
pub trait Device: Send {
    fn name(&self) -> String;

    async fn connect(self: Box<Self>) -> Result<Box<dyn Link>, TransportError>;
}

#[async_trait]
pub trait Link: Send {
    async fn resolve_characteristic(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<Box<dyn Characteristic>, TransportError>;
}

#[async_trait]
pub trait Characteristic: Send {
    /// Starts notification delivery. Frames arrive on `handler` in device order.
    async fn subscribe(self: Box<Self>, handler: NotificationHandler) -> Result<(), TransportError>;
}

/// Builds the transport selected in config.
pub fn create_transport(config: &AppConfig) -> Arc<dyn Transport> {
    match config.transport.kind {
        TransportKind::Simulated => Arc::new(SimulatedTransport::new(
            config.transport.simulated.clone(),
            &config.link,
        )),
        TransportKind::Mqtt => Arc::new(MqttTransport::from_env(config.transport.mqtt.clone())),
    }
}
