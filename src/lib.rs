//! ecg-stream crate root: re-exports and module wiring.
//!
//! Configures a SAGA-class biosignal amplifier, streams its ECG channels and shows
//! them in a live egui/eframe plot until the window is closed.
//!
//! - `device`: driver and device traits, plus a simulated SAGA driver
//! - `channels`: per-type channel selection
//! - `stream`: network outlet and CSV writers
//! - `sink`: channel feeding the plot window
//! - `app`: the plot window and its presenter
//! - `config`: YAML session configuration
//! - `session`: the end-to-end acquisition flow

pub mod app;
pub mod channels;
pub mod config;
pub mod device;
pub mod error;
pub mod session;
pub mod sink;
pub mod stream;

// Public re-exports for a compact external API
pub use app::{NativePresenter, PlotSettings, PlotView, Presenter};
pub use channels::{ChannelPartition, ChannelSelection};
pub use config::SessionConfig;
pub use device::simulated::{SimulatedDriver, SimulationOptions};
pub use device::{Device, DeviceDriver};
pub use error::{DeviceError, Error, Result};
pub use session::Outcome;
pub use stream::{OutputFormat, SampleWriter, StreamWriter};
