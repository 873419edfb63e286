// Simulated vibration sensor
//
// Advertises the configured service/characteristic and emits "acc,vel" text
// frames on a fixed interval. A share of frames is deliberately malformed so
// the decoder's partial-acceptance path is exercised without hardware.

use async_trait::async_trait;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::time::Duration;

use super::{Characteristic, Device, Link, Notification, NotificationHandler, Transport};
use crate::config::{LinkConfig, SimulatedConfig};
use crate::error::TransportError;

pub struct SimulatedTransport {
    config: SimulatedConfig,
    service_id: String,
    characteristic_id: String,
}

impl SimulatedTransport {
    /// The simulated device advertises the ids in `link`.
    pub fn new(config: SimulatedConfig, link: &LinkConfig) -> Self {
        Self {
            config,
            service_id: link.service_uuid.clone(),
            characteristic_id: link.characteristic_uuid.clone(),
        }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn request_device(&self, service_id: &str) -> Result<Box<dyn Device>, TransportError> {
        if self.config.device_name.trim().is_empty() {
            return Err(TransportError::NoDeviceSelected);
        }

        info!("Simulated device {} offered for service {}", self.config.device_name, service_id);
        Ok(Box::new(SimulatedDevice {
            config: self.config.clone(),
            service_id: self.service_id.clone(),
            characteristic_id: self.characteristic_id.clone(),
        }))
    }
}

struct SimulatedDevice {
    config: SimulatedConfig,
    service_id: String,
    characteristic_id: String,
}

#[async_trait]
impl Device for SimulatedDevice {
    fn name(&self) -> String {
        self.config.device_name.clone()
    }

    async fn connect(self: Box<Self>) -> Result<Box<dyn Link>, TransportError> {
        tokio::time::sleep(Duration::from_millis(self.config.connect_delay_ms)).await;
        Ok(Box::new(SimulatedLink {
            config: self.config,
            service_id: self.service_id,
            characteristic_id: self.characteristic_id,
        }))
    }
}

struct SimulatedLink {
    config: SimulatedConfig,
    service_id: String,
    characteristic_id: String,
}

#[async_trait]
impl Link for SimulatedLink {
    async fn resolve_characteristic(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<Box<dyn Characteristic>, TransportError> {
        if !service_id.eq_ignore_ascii_case(&self.service_id) {
            return Err(TransportError::ServiceUnavailable(service_id.to_string()));
        }
        if !characteristic_id.eq_ignore_ascii_case(&self.characteristic_id) {
            return Err(TransportError::CharacteristicUnavailable(characteristic_id.to_string()));
        }

        Ok(Box::new(SimulatedCharacteristic {
            config: self.config.clone(),
        }))
    }
}

struct SimulatedCharacteristic {
    config: SimulatedConfig,
}

#[async_trait]
impl Characteristic for SimulatedCharacteristic {
    async fn subscribe(self: Box<Self>, mut handler: NotificationHandler) -> Result<(), TransportError> {
        let config = self.config;
        let mut generator = TelemetryGenerator::new(config.clone(), StdRng::from_os_rng());

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(config.interval_ms));
            let mut sent: u64 = 0;
            loop {
                ticker.tick().await;
                let frame = generator.next_frame();
                if !handler(Notification::Frame(frame.into_bytes())) {
                    break;
                }

                sent += 1;
                if config.disconnect_after_frames > 0 && sent >= config.disconnect_after_frames {
                    handler(Notification::Closed(Some("simulated device powered off".to_string())));
                    break;
                }
            }
            info!("Simulated notifications stopped after {} frames", sent);
        });

        Ok(())
    }
}

/// Produces damped-sine vibration readings with noise.
pub struct TelemetryGenerator<R: Rng> {
    config: SimulatedConfig,
    rng: R,
    phase: f64,
}

impl<R: Rng> TelemetryGenerator<R> {
    pub fn new(config: SimulatedConfig, rng: R) -> Self {
        Self { config, rng, phase: 0.0 }
    }

    pub fn next_frame(&mut self) -> String {
        self.phase = (self.phase + TAU / 24.0) % TAU;
        let acceleration = self.config.acceleration_amplitude * self.phase.sin()
            + self.rng.random_range(-0.5..0.5);
        let velocity = self.config.velocity_amplitude * self.phase.cos().abs()
            + self.rng.random_range(0.0..0.2);

        if self.rng.random_bool(self.config.malformed_ratio) {
            return match self.rng.random_range(0..3) {
                0 => format!("ERR,{:.3}", velocity),
                1 => format!("{:.3}", acceleration),
                _ => "--".to_string(),
            };
        }

        format!("{:.3},{:.3}", acceleration, velocity)
    }
}
