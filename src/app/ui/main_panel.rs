use eframe::egui;

use crate::app::app_core::VibeApp;
use crate::pipeline::Readings;

fn render_readings(readings: &Readings, ui: &mut egui::Ui) {
    ui.group(|ui| {
        ui.heading("Latest Readings");
        egui::Grid::new("readings_grid").num_columns(2).spacing([24.0, 6.0]).show(ui, |ui| {
            ui.label("Acceleration (m/s²):");
            ui.monospace(readings.acceleration.as_deref().unwrap_or("--"));
            ui.end_row();

            ui.label("Velocity (mm/s):");
            ui.monospace(readings.velocity.as_deref().unwrap_or("--"));
            ui.end_row();
        });
    });
}

pub fn render_main_panel(app: &mut VibeApp, ctx: &egui::Context) {
    egui::CentralPanel::default().show(ctx, |ui| {
        // 首次连接成功前不显示读数与图表
        if !app.state.revealed {
            ui.centered_and_justified(|ui| {
                ui.label("Connect to a vibration sensor to see live readings.");
            });
            return;
        }

        render_readings(app.state.pipeline.readings(), ui);
        ui.add_space(10.0);

        ui.horizontal(|ui| {
            ui.heading("Chart");
            if !app.state.pipeline.is_chart_active() && ui.button("📈 Plot").clicked() {
                app.state.request_plot();
            }
        });

        match app.state.pipeline.sink() {
            Some(plot) => plot.ui(ui),
            None => {
                ui.label(format!(
                    "{} points buffered. Press Plot to draw them.",
                    app.state.pipeline.buffer().len(crate::types::Channel::Acceleration)
                ));
            }
        }
    });
}
