use std::time::Duration;
use eframe::{egui, Frame};

use super::state::AppState;

pub struct VibeApp {
    // 统一的状态管理
    pub state: AppState,
}

impl VibeApp {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl eframe::App for VibeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        ctx.set_visuals(egui::Visuals::dark());

        // 先处理传输事件，再渲染
        self.state.process_pending_events();

        crate::app::ui::render_status_bar(self, ctx);
        crate::app::ui::render_log_panel(self, ctx);
        crate::app::ui::render_main_panel(self, ctx);

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
