use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotPoints, Points};
use log::debug;

use crate::config::PlotConfig;
use crate::pipeline::{ChannelSpec, RenderSink};
use crate::types::Channel;

/// 坐标轴标题
const X_AXIS_TITLE: &str = "Time";
const Y_AXIS_TITLE: &str = "Value";

/// 格式化数字为固定宽度的 y 轴标签
fn format_fixed_width_y_label(value: f64) -> String {
    let abs_value = value.abs();
    if abs_value >= 1000.0 {
        format!("{:6.1e}", value)
    } else if abs_value >= 100.0 {
        format!("{:6.0}", value)
    } else if abs_value >= 10.0 {
        format!("{:6.1}", value)
    } else {
        format!("{:6.2}", value)
    }
}

/// 按缺失值把序列切成连续片段，x 为点的下标
fn contiguous_segments(values: &[Option<f64>]) -> Vec<Vec<[f64; 2]>> {
    let mut segments = Vec::new();
    let mut current: Vec<[f64; 2]> = Vec::new();
    for (i, value) in values.iter().enumerate() {
        match value {
            Some(v) => current.push([i as f64, *v]),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

#[derive(Debug, Clone, Default)]
struct SeriesView {
    labels: Vec<String>,
    values: Vec<Option<f64>>,
}

/// egui_plot 折线图，作为管线的渲染端
pub struct PlotSink {
    channels: Vec<ChannelSpec>,
    series: [SeriesView; 2],
    height: f32,
    allow_drag: bool,
    allow_zoom: bool,
    ctx: Option<egui::Context>,
    redraws: u64,
}

impl PlotSink {
    /// `ctx` 为空时不会请求重绘（测试中使用）
    pub fn new(channels: &[ChannelSpec], config: &PlotConfig, ctx: Option<egui::Context>) -> Self {
        Self {
            channels: channels.to_vec(),
            series: Default::default(),
            height: config.plot_height,
            allow_drag: config.allow_drag,
            allow_zoom: config.allow_zoom,
            ctx,
            redraws: 0,
        }
    }

    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    pub fn labels(&self, channel: Channel) -> &[String] {
        &self.series[channel.index()].labels
    }

    pub fn values(&self, channel: Channel) -> &[Option<f64>] {
        &self.series[channel.index()].values
    }

    pub fn ui(&self, ui: &mut egui::Ui) {
        // 两个通道的标签一致，取第一个非空的作为横轴
        let labels = self
            .series
            .iter()
            .find(|s| !s.labels.is_empty())
            .map(|s| s.labels.clone())
            .unwrap_or_default();
        let point_count = labels.len().max(1);

        Plot::new("vibration_plot")
            .height(self.height)
            .legend(Legend::default())
            .x_axis_label(X_AXIS_TITLE)
            .y_axis_label(Y_AXIS_TITLE)
            .allow_drag(self.allow_drag)
            .allow_zoom(self.allow_zoom)
            .allow_scroll(false)
            .include_x(0.0)
            .include_x((point_count - 1) as f64)
            .x_axis_formatter(move |mark, _range| {
                let index = mark.value.round();
                if (mark.value - index).abs() > f64::EPSILON || index < 0.0 {
                    return String::new();
                }
                labels.get(index as usize).cloned().unwrap_or_default()
            })
            .y_axis_formatter(|mark, _range| format_fixed_width_y_label(mark.value))
            .show(ui, |plot_ui| {
                for spec in &self.channels {
                    let [r, g, b] = spec.color;
                    let color = Color32::from_rgb(r, g, b);
                    let values = &self.series[spec.channel.index()].values;

                    for segment in contiguous_segments(values) {
                        if segment.len() == 1 {
                            plot_ui.points(
                                Points::new(spec.name.as_str(), PlotPoints::from(segment))
                                    .color(color)
                                    .radius(3.0),
                            );
                        } else {
                            plot_ui.line(
                                Line::new(spec.name.as_str(), PlotPoints::from(segment))
                                    .color(color)
                                    .width(2.0),
                            );
                        }
                    }
                }
            });
    }
}

impl RenderSink for PlotSink {
    fn set_series(&mut self, channel: Channel, labels: &[String], values: &[Option<f64>]) {
        let view = &mut self.series[channel.index()];
        view.labels = labels.to_vec();
        view.values = values.to_vec();
    }

    fn redraw(&mut self) {
        self.redraws += 1;
        if let Some(ctx) = &self.ctx {
            ctx.request_repaint();
        } else {
            debug!("Plot redraw #{} without a UI context", self.redraws);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_split_series_into_segments() {
        let values = [Some(1.0), Some(2.0), None, Some(4.0), None, None, Some(7.0), Some(8.0)];
        let segments = contiguous_segments(&values);
        assert_eq!(
            segments,
            vec![
                vec![[0.0, 1.0], [1.0, 2.0]],
                vec![[3.0, 4.0]],
                vec![[6.0, 7.0], [7.0, 8.0]],
            ]
        );
        assert!(contiguous_segments(&[None, None]).is_empty());
    }

    #[test]
    fn y_labels_keep_fixed_width() {
        for value in [0.5, -3.25, 42.0, -512.0, 12345.0] {
            let label = format_fixed_width_y_label(value);
            assert!(label.len() >= 6, "{label:?}");
        }
        assert_eq!(format_fixed_width_y_label(9.81), "  9.81");
        assert_eq!(format_fixed_width_y_label(-42.0), " -42.0");
    }

    #[test]
    fn renders_headless_with_gaps_and_axis_titles() {
        let config = PlotConfig::default();
        let mut sink = PlotSink::new(&ChannelSpec::from_plot_config(&config), &config, None);
        let labels: Vec<String> = ["10:00:00", "10:00:01", "10:00:02"].map(String::from).to_vec();
        sink.set_series(Channel::Acceleration, &labels, &[Some(1.0), None, Some(3.0)]);
        sink.set_series(Channel::Velocity, &labels, &[Some(0.1), Some(0.2), Some(0.3)]);

        let ctx = egui::Context::default();
        let output = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| sink.ui(ui));
        });

        assert!(!output.shapes.is_empty());
        assert_eq!(X_AXIS_TITLE, "Time");
        assert_eq!(Y_AXIS_TITLE, "Value");
    }

    #[test]
    fn set_series_replaces_channel_snapshot() {
        let config = PlotConfig::default();
        let mut sink = PlotSink::new(&ChannelSpec::from_plot_config(&config), &config, None);

        sink.set_series(
            Channel::Velocity,
            &["10:00:00".to_string(), "10:00:01".to_string()],
            &[Some(1.5), None],
        );
        sink.redraw();

        assert_eq!(sink.labels(Channel::Velocity).len(), 2);
        assert_eq!(sink.values(Channel::Velocity), &[Some(1.5), None]);
        assert!(sink.values(Channel::Acceleration).is_empty());
        assert_eq!(sink.redraws(), 1);
    }
}
