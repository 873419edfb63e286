mod app;
mod config;
mod error;
mod logger;
mod pipeline;
mod plotter;
mod transport;
mod types;
mod utils;

use dotenv::dotenv;
use eframe::egui;
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use app::{AppState, EventChannel, VibeApp};
use config::ConfigManager;

fn main() {
    dotenv().ok(); // 加载 .env 文件
    logger::init_logger();
    info!("Application starting");

    let config = match ConfigManager::discover() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    match config.config_path() {
        Some(path) => info!("配置文件: {}", path.display()),
        None => info!("未找到配置文件，使用默认配置"),
    }
    let app_config = config.get_config().clone();

    // 传输任务运行在 tokio 运行时，界面在主线程
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("vibelink-transport")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let events = EventChannel::bounded(app_config.channels.event_channel_capacity);
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let transport = transport::create_transport(&app_config);
    info!("Transport: {:?}", app_config.transport.kind);

    let options = eframe::NativeOptions {
        vsync: app_config.window.vsync,
        hardware_acceleration: eframe::HardwareAcceleration::Preferred, // 硬件加速优先模式
        renderer: eframe::Renderer::Glow,
        viewport: egui::ViewportBuilder::default()
            .with_title(app_config.window.title.clone())
            .with_inner_size([app_config.window.width, app_config.window.height])
            .with_resizable(app_config.window.resizable),
        ..Default::default()
    };

    let runtime_handle = runtime.handle().clone();
    let app_shutdown = Arc::clone(&shutdown_signal);
    let title = app_config.window.title.clone();
    if let Err(e) = eframe::run_native(
        &title,
        options,
        Box::new(move |cc| {
            let state = AppState::new(
                &app_config,
                runtime_handle,
                transport,
                events,
                app_shutdown,
                Some(cc.egui_ctx.clone()),
            );
            Ok(Box::new(VibeApp::new(state)))
        }),
    ) {
        error!("GUI failed: {}", e);
        std::process::exit(1);
    }

    // GUI 关闭后，通知传输任务停止投递
    info!("GUI closed, signaling transport tasks to shutdown");
    shutdown_signal.store(true, Ordering::Relaxed);

    // 最多等待 3 秒
    runtime.shutdown_timeout(Duration::from_secs(3));
    info!("Transport runtime stopped");
}
