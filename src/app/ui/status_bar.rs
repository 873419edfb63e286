use eframe::egui;

use crate::app::app_core::VibeApp;
use crate::pipeline::ConnectionState;
use crate::utils::format_elapsed;

fn status_color(state: &ConnectionState) -> egui::Color32 {
    match state {
        ConnectionState::Idle | ConnectionState::Disconnected => egui::Color32::from_rgb(120, 120, 120),
        ConnectionState::Scanning | ConnectionState::Connecting { .. } => egui::Color32::from_rgb(255, 165, 0), // 橙色
        ConnectionState::Streaming { .. } => egui::Color32::from_rgb(0, 150, 0), // 绿色
        ConnectionState::Failed(_) => egui::Color32::from_rgb(150, 0, 0), // 红色
    }
}

pub fn render_status_bar(app: &mut VibeApp, ctx: &egui::Context) {
    egui::TopBottomPanel::top("status_bar")
        .min_height(40.0)
        .show(ctx, |ui| {
            ui.add_space(5.0);
            ui.horizontal(|ui| {
                let pipeline = &app.state.pipeline;
                let state = pipeline.state();

                // 连接中不可重复点击
                let connect = ui.add_enabled(!state.is_in_flight(), egui::Button::new("🔗 Connect"));

                ui.separator();
                ui.colored_label(status_color(state), pipeline.status_text());

                if let Some(session) = pipeline.session() {
                    ui.separator();
                    ui.label(format!("Device: {}", session.device));
                    let elapsed = (chrono::Local::now() - session.started_at).to_std().unwrap_or_default();
                    ui.label(format!("Uptime: {}", format_elapsed(elapsed)));
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let stats = pipeline.stats();
                    ui.label(format!(
                        "Frames: {} | Rejected: {} | Samples: {}",
                        stats.frames_received, stats.frames_rejected, stats.samples_accepted
                    ));
                });

                if connect.clicked() {
                    app.state.request_connect();
                }
            });
            ui.add_space(5.0);
        });
}
