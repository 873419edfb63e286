use eframe::egui;

use crate::app::app_core::VibeApp;

pub fn render_log_panel(app: &mut VibeApp, ctx: &egui::Context) {
    egui::TopBottomPanel::bottom("log_panel")
        .resizable(true)
        .default_height(180.0)
        .show(ctx, |ui| {
            let log = app.state.pipeline.log();
            ui.horizontal(|ui| {
                ui.heading("Log");
                if log.dropped() > 0 {
                    ui.weak(format!("({} older entries dropped)", log.dropped()));
                }
            });

            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for entry in log.entries() {
                        ui.monospace(entry.display());
                    }
                });
        });
}
