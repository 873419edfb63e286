use chrono::{DateTime, Local};
use std::time::Duration;

/// 图表横轴标签：本地时间 HH:MM:SS
pub fn format_clock_label(at: &DateTime<Local>) -> String {
    at.format("%H:%M:%S").to_string()
}

/// 读数显示，固定两位小数
pub fn format_reading(value: f64) -> String {
    format!("{:.2}", value)
}

/// 将持续时间格式化为 HH:MM:SS
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn readings_use_two_decimals() {
        assert_eq!(format_reading(3.14), "3.14");
        assert_eq!(format_reading(0.02), "0.02");
        assert_eq!(format_reading(-10.25), "-10.25");
        assert_eq!(format_reading(2.0), "2.00");
    }

    #[test]
    fn clock_label() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 7, 3).unwrap();
        assert_eq!(format_clock_label(&at), "09:07:03");
    }

    #[test]
    fn elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "01:02:03");
        assert_eq!(format_elapsed(Duration::from_millis(999)), "00:00:00");
    }
}
