use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 应用配置管理模块
/// 集中管理所有配置项，提供默认值和配置验证

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "vibelink.toml";

/// 配置文件路径环境变量
pub const CONFIG_ENV_VAR: &str = "VIBELINK_CONFIG";

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub link: LinkConfig,
    pub transport: TransportConfig,
    pub plot: PlotConfig,
    pub session: SessionConfig,
    pub log: LogConfig,
    pub channels: ChannelConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: f32,
    pub height: f32,
    pub title: String,
    pub resizable: bool,
    pub vsync: bool,
}

/// 设备服务/特征 UUID
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub service_uuid: String,
    pub characteristic_uuid: String,
    /// 帧字段分隔符
    pub delimiter: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Simulated,
    Mqtt,
}

/// 传输层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub mqtt: MqttConfig,
    pub simulated: SimulatedConfig,
}

/// MQTT桥接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    /// 网关发布通知的设备名，为空表示未选择设备
    pub device: String,
    pub topic_prefix: String,
    pub qos: u8,
    pub keep_alive: u16,
    pub connect_timeout_ms: u64,
}

/// 模拟设备配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    pub device_name: String,
    pub connect_delay_ms: u64,
    pub interval_ms: u64,
    /// 格式错误帧的比例 (0.0 - 1.0)
    pub malformed_ratio: f64,
    pub acceleration_amplitude: f64,
    pub velocity_amplitude: f64,
    /// 发送多少帧后模拟设备断开，0 表示不断开
    pub disconnect_after_frames: u64,
}

/// 绘图配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// 滚动窗口点数
    pub max_points: usize,
    pub plot_height: f32,
    pub allow_drag: bool,
    pub allow_zoom: bool,
    pub colors: PlotColors,
}

/// 绘图颜色配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotColors {
    pub acceleration: [u8; 3],
    pub velocity: [u8; 3],
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 重新连接后是否保留已有曲线数据
    pub retain_history_on_reconnect: bool,
}

/// 操作日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub max_entries: usize,
}

/// 通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub event_channel_capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 760.0,
            title: "VibeLink - Vibration Monitor".to_string(),
            resizable: true,
            vsync: true,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: "d1f4a9b0-1234-4a3f-bc2a-7e8f12345678".to_string(),
            characteristic_uuid: "b1c2d3e4-5678-4abc-9def-1234567890ab".to_string(),
            delimiter: ',',
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Simulated,
            mqtt: MqttConfig::default(),
            simulated: SimulatedConfig::default(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "vibelink_client".to_string(),
            device: "vibration-sensor".to_string(),
            topic_prefix: "ble".to_string(),
            qos: 1,
            keep_alive: 5,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            device_name: "Simulated Vibration Sensor".to_string(),
            connect_delay_ms: 300,
            interval_ms: 500,
            malformed_ratio: 0.05,
            acceleration_amplitude: 9.81,
            velocity_amplitude: 4.5,
            disconnect_after_frames: 0,
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            max_points: 30,
            plot_height: 260.0,
            allow_drag: false,
            allow_zoom: false,
            colors: PlotColors::default(),
        }
    }
}

impl Default for PlotColors {
    fn default() -> Self {
        Self {
            acceleration: [0, 255, 247],  // 青色
            velocity: [255, 0, 170],      // 品红
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retain_history_on_reconnect: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { max_entries: 500 }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 5000,
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;

        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;

        config.validate()?;
        Ok(config)
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width <= 0.0 || self.window.height <= 0.0 {
            return Err(ConfigError::ValidationError("Window dimensions must be positive".to_string()));
        }

        if self.plot.max_points == 0 {
            return Err(ConfigError::ValidationError("Plot window must hold at least one point".to_string()));
        }

        if self.link.service_uuid.trim().is_empty() || self.link.characteristic_uuid.trim().is_empty() {
            return Err(ConfigError::ValidationError("Service and characteristic UUIDs are required".to_string()));
        }

        if self.link.delimiter.is_whitespace() {
            return Err(ConfigError::ValidationError("Frame delimiter must not be whitespace".to_string()));
        }

        if !(0.0..=1.0).contains(&self.transport.simulated.malformed_ratio) {
            return Err(ConfigError::ValidationError("Malformed ratio must be between 0 and 1".to_string()));
        }

        if self.transport.simulated.interval_ms == 0 {
            return Err(ConfigError::ValidationError("Simulated frame interval must be positive".to_string()));
        }

        if self.transport.mqtt.qos > 2 {
            return Err(ConfigError::ValidationError("MQTT QoS must be 0, 1 or 2".to_string()));
        }

        if self.log.max_entries == 0 {
            return Err(ConfigError::ValidationError("Operator log must keep at least one entry".to_string()));
        }

        if self.channels.event_channel_capacity == 0 {
            return Err(ConfigError::ValidationError("Event channel capacity must be positive".to_string()));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(toml::de::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// 配置管理器
pub struct ConfigManager {
    config: AppConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// 创建配置管理器
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            config_path: None,
        }
    }

    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = AppConfig::load_from_file(&path)?;
        Ok(Self {
            config,
            config_path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// 按环境变量、默认文件、内置默认值的顺序加载
    pub fn discover() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_from_file(path);
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::load_from_file(DEFAULT_CONFIG_FILE);
        }

        Ok(Self::new())
    }

    /// 获取当前配置
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
