use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::config::AppConfig;
use crate::pipeline::{ChannelSpec, Pipeline};
use crate::plotter::PlotSink;
use crate::transport::{LinkTarget, Transport};
use crate::types::PipelineEvent;

/// 应用状态管理模块
/// 管线归 UI 线程所有，传输任务只通过事件通道与之通信

/// 首次点击 Plot 时构造图表
pub type PlotFactory = Box<dyn FnMut(&[ChannelSpec]) -> PlotSink>;

/// 传输任务到 UI 线程的事件通道
#[derive(Debug, Clone)]
pub struct EventChannel {
    pub sender: Sender<PipelineEvent>,
    pub receiver: Receiver<PipelineEvent>,
}

impl EventChannel {
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self { sender, receiver }
    }
}

/// 连接任务所需的运行时资源
pub struct LinkRuntime {
    pub runtime: Handle,
    pub transport: Arc<dyn Transport>,
    pub target: LinkTarget,
    pub events: EventChannel,
    /// 最新一次连接尝试的编号，旧任务据此停止投递
    pub current_attempt: Arc<AtomicU64>,
    pub shutdown_signal: Arc<AtomicBool>,
}

/// 统一的应用状态管理
pub struct AppState {
    pub pipeline: Pipeline<PlotFactory>,
    pub link: LinkRuntime,
    /// 读数与图表区域是否已显示
    pub revealed: bool,
}

impl AppState {
    /// `ctx` 为空时图表不会主动请求重绘
    pub fn new(
        config: &AppConfig,
        runtime: Handle,
        transport: Arc<dyn Transport>,
        events: EventChannel,
        shutdown_signal: Arc<AtomicBool>,
        ctx: Option<egui::Context>,
    ) -> Self {
        let plot_config = config.plot.clone();
        let factory: PlotFactory =
            Box::new(move |channels: &[ChannelSpec]| PlotSink::new(channels, &plot_config, ctx.clone()));

        Self {
            pipeline: Pipeline::from_config(config, factory),
            link: LinkRuntime {
                runtime,
                transport,
                target: LinkTarget::from(&config.link),
                events,
                current_attempt: Arc::new(AtomicU64::new(0)),
                shutdown_signal,
            },
            revealed: false,
        }
    }
}
