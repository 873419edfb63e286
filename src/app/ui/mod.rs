pub mod log_panel;
pub mod main_panel;
pub mod status_bar;

pub use log_panel::render_log_panel;
pub use main_panel::render_main_panel;
pub use status_bar::render_status_bar;
