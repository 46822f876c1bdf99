//! Live plot window.
//!
//! | Sub-module   | Responsibility |
//! | ------------ | -------------- |
//! | [`traces`]   | Rolling per-trace buffers fed by [`PlotCommand`](crate::sink::PlotCommand)s |
//! | [`plot_app`] | The [`eframe::App`] drawing one lane per trace |
//! | [`run`]      | [`NativePresenter`], which owns the native event loop |
//!
//! A [`PlotView`] binds to a device: it subscribes to the device's sample blocks and
//! forwards each enabled channel to its own trace. A [`Presenter`] then shows the
//! view and blocks until the user closes the window.

use std::sync::mpsc::Receiver;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceInfo, SampleBlock};
use crate::error::PresentError;
use crate::sink::{channel_plot, PlotCommand, PlotPoint, PlotSink, Trace};

pub mod plot_app;
pub mod run;
pub mod traces;

pub use plot_app::PlotApp;
pub use run::NativePresenter;

/// Window and buffer settings of the plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSettings {
    /// Native window title.
    pub title: String,
    /// Rolling time window in seconds.
    pub time_window_secs: f64,
    /// Maximum number of points retained per trace.
    pub max_points: usize,
    /// Initial inner size of the window in logical pixels.
    pub window_size: [f32; 2],
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            title: "ECG stream".to_string(),
            time_window_secs: 10.0,
            max_points: 10_000,
            window_size: [1400.0, 900.0],
        }
    }
}

/// Shows a [`PlotView`] and returns once the user closed it.
pub trait Presenter {
    fn present(&mut self, view: PlotView) -> Result<(), PresentError>;
}

/// Plot content bound to one device.
#[derive(Debug)]
pub struct PlotView {
    pub(crate) device: DeviceInfo,
    pub(crate) traces: Vec<Trace>,
    pub(crate) rx: Receiver<PlotCommand>,
    pub(crate) sink: PlotSink,
    pub(crate) settings: PlotSettings,
    pub(crate) sample_rate: f64,
}

impl PlotView {
    /// Subscribe to `device` and create one trace per enabled channel.
    pub fn new(device: &mut dyn Device, settings: PlotSettings) -> Result<PlotView, PresentError> {
        let channels = device.enabled_channels()?;
        let fs = device.sampling_frequency()?;
        let sample_rate = channels
            .iter()
            .map(|ch| fs.rate_of(ch.channel_type))
            .fold(0.0, f64::max);
        let blocks = device.register_consumer()?;

        let (sink, rx) = channel_plot();
        let traces: Vec<Trace> = channels
            .iter()
            .map(|ch| sink.create_trace(ch.name.as_str(), ch.unit.as_str()))
            .collect();
        {
            let sink = sink.clone();
            let traces = traces.clone();
            thread::Builder::new()
                .name("plot-forward".to_string())
                .spawn(move || forward(blocks, sink, traces))
                .map_err(PresentError::Spawn)?;
        }
        log::debug!("plot view bound to {} with {} traces", device.info(), traces.len());

        Ok(PlotView {
            device: device.info(),
            traces,
            rx,
            sink,
            settings,
            sample_rate,
        })
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn settings(&self) -> &PlotSettings {
        &self.settings
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

/// Split sample blocks into per-trace chunks until either side hangs up.
fn forward(blocks: Receiver<SampleBlock>, sink: PlotSink, traces: Vec<Trace>) {
    for block in blocks.iter() {
        for (column, trace) in traces.iter().enumerate().take(block.channel_count) {
            let points: Vec<PlotPoint> = block
                .frames()
                .enumerate()
                .map(|(n, frame)| PlotPoint {
                    x: block.timestamp(n),
                    y: frame[column] as f64,
                })
                .collect();
            if sink.send_points(trace, points).is_err() {
                log::debug!("plot closed; forwarder exiting");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::{SimulatedDriver, SimulationOptions};
    use crate::device::{BaseSampleRate, ChannelTypeScope, DeviceDriver, DeviceType, Interfaces};
    use std::time::Duration;

    #[test]
    fn test_view_forwards_enabled_channels() {
        let mut devices = SimulatedDriver::new(1)
            .with_options(SimulationOptions {
                block_interval: Duration::from_millis(5),
                ..Default::default()
            })
            .discover(DeviceType::Saga, Interfaces::default())
            .unwrap();
        let device = devices[0].as_mut();
        device.open().unwrap();
        device
            .set_sampling_config(BaseSampleRate::Decimal, ChannelTypeScope::All, 8)
            .unwrap();
        let all: Vec<usize> = (0..48).collect();
        device.set_active_channels(&all, false).unwrap();
        device.set_active_channels(&[32, 33], true).unwrap();

        let view = PlotView::new(device, PlotSettings::default()).unwrap();
        assert_eq!(view.sample_rate(), 500.0);
        let names: Vec<&str> = view.traces().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["BIP 01", "BIP 02"]);

        device.start_measurement().unwrap();
        let mut app = PlotApp::new(view);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while app.traces().latest_time().is_none() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
            app.ingest();
        }
        assert!(app.traces().latest_time().is_some());
        assert_eq!(app.traces().order.len(), 2);
        device.close().unwrap();
    }
}
