use std::sync::mpsc::Receiver;
use std::time::Duration;

use egui_phosphor::regular::{BROOM, PAUSE, PLAY};
use egui_plot::{Line, Plot};

use super::traces::TracesCollection;
use super::{PlotSettings, PlotView};
use crate::sink::{PlotCommand, PlotSink};

/// Ranges accepted by the time-window slider, in seconds.
const TIME_WINDOW_BOUNDS: (f64, f64) = (1.0, 60.0);

/// `mm:ss.s` for seconds since measurement start.
pub fn format_elapsed(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return String::new();
    }
    let minutes = (secs / 60.0).floor();
    format!("{:02}:{:04.1}", minutes as u64, secs - minutes * 60.0)
}

/// eframe application showing one stacked lane per trace.
pub struct PlotApp {
    rx: Receiver<PlotCommand>,
    sink: PlotSink,
    traces: TracesCollection,
    headline: String,
    paused: bool,
}

impl PlotApp {
    pub fn new(view: PlotView) -> Self {
        let PlotView { device, rx, sink, settings, sample_rate, .. } = view;
        let PlotSettings { time_window_secs, max_points, .. } = settings;
        Self {
            rx,
            sink,
            traces: TracesCollection::new(max_points, time_window_secs),
            headline: format!("{} @ {} Hz", device, sample_rate),
            paused: false,
        }
    }

    /// Drain pending commands; keeps ingesting while paused so nothing is lost.
    pub fn ingest(&mut self) {
        while let Ok(command) = self.rx.try_recv() {
            self.traces.apply(command);
        }
    }

    pub fn traces(&self) -> &TracesCollection {
        &self.traces
    }

    /// Queue a clear behind the points already in flight.
    pub fn clear(&self) {
        if self.sink.clear_all().is_err() {
            log::debug!("plot channel closed");
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        if paused == self.paused {
            return;
        }
        self.paused = paused;
        if paused {
            self.traces.take_snapshot();
        } else {
            self.traces.clear_snapshot();
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.strong(&self.headline);
            ui.separator();

            let label = if self.paused {
                format!("{PLAY} Resume")
            } else {
                format!("{PAUSE} Pause")
            };
            if ui.button(label).clicked() {
                self.set_paused(!self.paused);
            }
            if ui.button(format!("{BROOM} Clear")).clicked() {
                self.clear();
            }

            ui.separator();
            ui.label("Time Window:");
            ui.add(
                egui::Slider::new(
                    &mut self.traces.time_window,
                    TIME_WINDOW_BOUNDS.0..=TIME_WINDOW_BOUNDS.1,
                )
                .suffix(" s"),
            );
        });
    }

    fn render_plots(&mut self, ui: &mut egui::Ui) {
        let count = self.traces.order.len();
        if count == 0 {
            ui.centered_and_justified(|ui| ui.label("waiting for samples…"));
            return;
        }
        let latest = self.traces.latest_time().unwrap_or(0.0);
        let window = self.traces.time_window;
        let lane_height = (ui.available_height() / count as f32 - ui.spacing().item_spacing.y).max(40.0);

        for (lane, trace) in self.traces.iter().enumerate() {
            let last_lane = lane + 1 == count;
            let unit = trace.unit.clone();
            let plot = Plot::new(("trace_lane", lane))
                .height(lane_height)
                .link_axis("lanes", [true, false])
                .allow_scroll(false)
                .allow_zoom(false)
                .show_x(true)
                .show_y(true)
                .y_axis_label(format!("{} [{}]", trace.name, unit))
                .x_axis_formatter(move |x, _range| {
                    if last_lane {
                        format_elapsed(x.value)
                    } else {
                        String::new()
                    }
                });
            let points: Vec<[f64; 2]> = trace.shown().iter().copied().collect();
            let range = trace.value_range();
            plot.show(ui, |plot_ui| {
                plot_ui.set_plot_bounds_x((latest - window)..=latest);
                if let Some((lo, hi)) = range {
                    let pad = ((hi - lo) * 0.05).max(1e-6);
                    plot_ui.set_plot_bounds_y((lo - pad)..=(hi + pad));
                }
                plot_ui.line(Line::new(trace.name.clone(), points));
            });
        }
    }
}

impl eframe::App for PlotApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ingest();

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            self.render_controls(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_plots(ui);
        });

        // Request continuous repainting (~60 fps).
        ctx.request_repaint_after(Duration::from_millis(16));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0.0), "00:00.0");
        assert_eq!(format_elapsed(83.44), "01:23.4");
        assert_eq!(format_elapsed(-1.0), "");
    }

    #[test]
    fn test_clear_goes_through_the_sink() {
        use crate::device::{DeviceInfo, DeviceType, Interfaces};
        use crate::sink::{channel_plot, PlotPoint};

        let (sink, rx) = channel_plot();
        let trace = sink.create_trace("BIP 01", "uVolt");
        let points: Vec<PlotPoint> = (0..5).map(|n| PlotPoint { x: n as f64 * 0.002, y: 1.0 }).collect();
        sink.send_points(&trace, points).unwrap();
        let view = PlotView {
            device: DeviceInfo {
                device_type: DeviceType::Saga,
                serial: "1005210038".to_string(),
                interfaces: Interfaces::default(),
            },
            traces: vec![trace.clone()],
            rx,
            sink: sink.clone(),
            settings: PlotSettings::default(),
            sample_rate: 500.0,
        };
        let mut app = PlotApp::new(view);
        app.ingest();
        assert_eq!(app.traces().traces[&trace.id].live.len(), 5);

        app.clear();
        sink.send_points(&trace, vec![PlotPoint { x: 0.01, y: 2.0 }]).unwrap();
        app.ingest();
        let live = &app.traces().traces[&trace.id].live;
        assert_eq!(live.len(), 1);
        assert_eq!(live[0], [0.01, 2.0]);
    }
}
