//! One acquisition session: discover, configure, stream, plot, tear down.
//!
//! Device-layer failures end the session early with [`Outcome::Aborted`]; anything
//! else is returned as an error. Either way the device is closed exactly once if it
//! was opened and is still connected, after the stream has been closed.

use crate::app::{PlotView, Presenter};
use crate::channels;
use crate::config::SessionConfig;
use crate::device::{ChannelTypeScope, Device, DeviceDriver};
use crate::error::{DeviceError, Result, StreamError};
use crate::stream::SampleWriter;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Discovery returned no device; nothing was opened.
    NoDevice,
    /// The window was closed and everything was torn down in order.
    Completed,
    /// A device-layer error stopped the setup; teardown still ran.
    Aborted(DeviceError),
}

/// Owns the device for the session and releases it on every exit path.
struct DeviceGuard<'w> {
    device: Box<dyn Device>,
    writer: Option<&'w mut dyn SampleWriter>,
}

impl<'w> DeviceGuard<'w> {
    fn new(device: Box<dyn Device>) -> Self {
        Self { device, writer: None }
    }

    fn device(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    fn open_stream(&mut self, writer: &'w mut dyn SampleWriter) -> std::result::Result<(), StreamError> {
        writer.open(self.device.as_mut())?;
        self.writer = Some(writer);
        Ok(())
    }

    /// Stream close, then device close.
    fn finish(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        self.device.close()?;
        Ok(())
    }
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(error) = writer.close() {
                log::error!("closing stream: {}", error);
            }
        }
        if self.device.state().is_connected() {
            log::debug!("closing {} on early exit", self.device.info());
            if let Err(error) = self.device.close() {
                log::error!("closing {}: {}", self.device.info(), error);
            }
        }
    }
}

/// Run a session to completion. Blocks while the plot window is open.
pub fn run(
    driver: &mut dyn DeviceDriver,
    writer: &mut dyn SampleWriter,
    presenter: &mut dyn Presenter,
    config: &SessionConfig,
) -> Result<Outcome> {
    match run_inner(driver, writer, presenter, config) {
        Ok(outcome) => Ok(outcome),
        Err(error) => match error.as_device_error() {
            Some(device_error) => {
                log::error!("{}", error);
                Ok(Outcome::Aborted(device_error.clone()))
            }
            None => Err(error),
        },
    }
}

fn run_inner<'w>(
    driver: &mut dyn DeviceDriver,
    writer: &'w mut dyn SampleWriter,
    presenter: &mut dyn Presenter,
    config: &SessionConfig,
) -> Result<Outcome> {
    let settings = &config.device;

    log::info!("Looking for devices...");
    let discovered = driver.discover(settings.device_type, settings.interfaces)?;
    log::debug!("discovered {} device(s)", discovered.len());
    let Some(device) = discovered.into_iter().next() else {
        log::warn!("no {} device found", settings.device_type);
        return Ok(Outcome::NoDevice);
    };

    let mut guard = DeviceGuard::new(device);
    guard.device().open()?;
    log::info!("Device {} opened.", guard.device().info());

    log::info!("Setting the sample rate...");
    guard
        .device()
        .set_sampling_config(settings.base_sample_rate, ChannelTypeScope::All, settings.divider)?;
    let fs = guard.device().sampling_frequency()?;
    log::info!("The updated base-sample-rate is {} Hz.", fs.base);
    log::info!("The updated sample-rates per channel-type-group are:");
    for (channel_type, rate) in &fs.groups {
        log::info!("{} = {} Hz", channel_type, rate);
    }

    let partition = channels::select(guard.device(), &config.channels)?;
    log::info!(
        "{} of {} channels enabled: {:?}",
        partition.enable.len(),
        partition.len(),
        partition.enable
    );

    guard.open_stream(writer)?;
    log::info!("Opened stream '{}'.", config.stream.label);

    let view = PlotView::new(guard.device(), config.plot.clone())?;
    presenter.present(view)?;

    guard.finish()?;
    log::info!("Session finished.");
    Ok(Outcome::Completed)
}

