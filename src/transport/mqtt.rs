use async_trait::async_trait;
use dotenv::dotenv;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS, SubscribeReasonCode};
use std::env;
use std::time::Duration;

use super::{Characteristic, Device, Link, Notification, NotificationHandler, Transport};
use crate::config::MqttConfig;
use crate::error::TransportError;

/// 网关在设备断开时发布到状态主题的负载
const OFFLINE_PAYLOADS: [&str; 2] = ["disconnected", "offline"];

/// 通过 MQTT 网关转发的 BLE 通知
///
/// 网关把设备的特征通知发布到 `<prefix>/<device>/<service>/<characteristic>`，
/// 设备状态发布到 `<prefix>/<device>/status`。
pub struct MqttTransport {
    config: MqttConfig,
    credentials: Option<(String, String)>,
}

impl MqttTransport {
    pub fn new(config: MqttConfig, credentials: Option<(String, String)>) -> Self {
        Self { config, credentials }
    }

    /// 凭据从 MQTT_USER / MQTT_PASS 读取（支持 .env 文件）
    pub fn from_env(config: MqttConfig) -> Self {
        dotenv().ok();

        let credentials = match (env::var("MQTT_USER"), env::var("MQTT_PASS")) {
            (Ok(user), Ok(pass)) => Some((user, pass)),
            _ => {
                info!("MQTT_USER/MQTT_PASS not set, connecting anonymously");
                None
            }
        };
        Self::new(config, credentials)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn request_device(&self, service_id: &str) -> Result<Box<dyn Device>, TransportError> {
        if self.config.device.trim().is_empty() {
            return Err(TransportError::NoDeviceSelected);
        }

        info!("Using gateway device {} for service {}", self.config.device, service_id);
        Ok(Box::new(MqttDevice {
            config: self.config.clone(),
            credentials: self.credentials.clone(),
        }))
    }
}

struct MqttDevice {
    config: MqttConfig,
    credentials: Option<(String, String)>,
}

#[async_trait]
impl Device for MqttDevice {
    fn name(&self) -> String {
        self.config.device.clone()
    }

    async fn connect(self: Box<Self>) -> Result<Box<dyn Link>, TransportError> {
        let config = self.config;
        let mut mqtt_options = MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);
        if let Some((user, pass)) = self.credentials {
            mqtt_options.set_credentials(user, pass);
        }
        mqtt_options
            .set_keep_alive(Duration::from_secs(u64::from(config.keep_alive)))
            .set_last_will(LastWill::new(
                presence_topic(&config),
                "offline",
                qos_level(config.qos),
                false,
            ));

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| TransportError::Timeout(config.connect_timeout_ms))??;

        info!("Connected to MQTT broker {}:{}", config.broker, config.port);
        Ok(Box::new(MqttLink {
            config,
            client,
            eventloop: Some(eventloop),
        }))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

struct MqttLink {
    config: MqttConfig,
    client: AsyncClient,
    eventloop: Option<EventLoop>,
}

#[async_trait]
impl Link for MqttLink {
    async fn resolve_characteristic(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<Box<dyn Characteristic>, TransportError> {
        let mut eventloop = self
            .eventloop
            .take()
            .ok_or_else(|| TransportError::Connection("link already consumed".to_string()))?;

        let qos = qos_level(self.config.qos);
        let data_topic = data_topic(&self.config, service_id, characteristic_id);
        let status_topic = status_topic(&self.config);
        self.client.subscribe(data_topic.clone(), qos).await?;
        self.client.subscribe(status_topic.clone(), qos).await?;

        // 两个订阅各有一个 SubAck，数据主题在前
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let acks = tokio::time::timeout(timeout, wait_for_subacks(&mut eventloop, 2))
            .await
            .map_err(|_| TransportError::Timeout(self.config.connect_timeout_ms))??;

        match acks.first() {
            Some(SubscribeReasonCode::Success(_)) => {}
            _ => {
                self.eventloop = Some(eventloop);
                return Err(TransportError::CharacteristicUnavailable(characteristic_id.to_string()));
            }
        }
        if !matches!(acks.get(1), Some(SubscribeReasonCode::Success(_))) {
            warn!("Status topic {} rejected, disconnects will only surface as errors", status_topic);
        }

        debug!("Subscribed to {}", data_topic);
        Ok(Box::new(MqttCharacteristic {
            client: self.client.clone(),
            eventloop,
            data_topic,
            status_topic,
        }))
    }
}

async fn wait_for_subacks(eventloop: &mut EventLoop, expected: usize) -> Result<Vec<SubscribeReasonCode>, TransportError> {
    let mut codes = Vec::with_capacity(expected);
    while codes.len() < expected {
        if let Event::Incoming(Packet::SubAck(suback)) = eventloop.poll().await? {
            codes.extend(suback.return_codes);
        }
    }
    Ok(codes)
}

struct MqttCharacteristic {
    client: AsyncClient,
    eventloop: EventLoop,
    data_topic: String,
    status_topic: String,
}

#[async_trait]
impl Characteristic for MqttCharacteristic {
    async fn subscribe(self: Box<Self>, mut handler: NotificationHandler) -> Result<(), TransportError> {
        let MqttCharacteristic {
            client,
            mut eventloop,
            data_topic,
            status_topic,
        } = *self;

        tokio::spawn(async move {
            loop {
                let notification = match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == data_topic => {
                        Notification::Frame(publish.payload.to_vec())
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == status_topic => {
                        match device_status(&publish.payload) {
                            Some(reason) => Notification::Closed(Some(reason)),
                            None => continue,
                        }
                    }
                    Ok(_) => continue, // 忽略其他报文
                    Err(e) => {
                        error!("MQTT connection error: {}", e);
                        handler(Notification::Error(e.to_string()));
                        break;
                    }
                };

                let closed = matches!(notification, Notification::Closed(_));
                if !handler(notification) || closed {
                    break;
                }
            }

            // 接收方已不再需要通知
            if let Err(e) = client.disconnect().await {
                debug!("MQTT disconnect after stop failed: {}", e);
            }
            // 让 Disconnect 报文真正发出
            let _ = tokio::time::timeout(Duration::from_millis(200), eventloop.poll()).await;
            info!("MQTT notification task for {} stopped", data_topic);
        });

        Ok(())
    }
}

/// 状态主题负载为离线标记时返回断开原因
fn device_status(payload: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(payload);
    let status = text.trim();
    if OFFLINE_PAYLOADS.iter().any(|p| status.eq_ignore_ascii_case(p)) {
        Some(format!("gateway reported device {}", status.to_ascii_lowercase()))
    } else {
        None
    }
}

fn data_topic(config: &MqttConfig, service_id: &str, characteristic_id: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        config.topic_prefix,
        config.device,
        service_id.to_ascii_lowercase(),
        characteristic_id.to_ascii_lowercase()
    )
}

fn status_topic(config: &MqttConfig) -> String {
    format!("{}/{}/status", config.topic_prefix, config.device)
}

fn presence_topic(config: &MqttConfig) -> String {
    format!("{}/clients/{}", config.topic_prefix, config.client_id)
}

fn qos_level(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
