//! Outbound sample streams.
//!
//! A [`StreamWriter`] binds to an opened [`Device`], subscribes to its sample blocks
//! and forwards them to one of the [`OutputFormat`]s on a writer thread:
//! - `Network`: a TCP outlet emitting newline-delimited JSON ([`outlet`]).
//! - `Csv`: a timestamped CSV file ([`csv`]).

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{Channel, Device, DeviceState};
use crate::error::StreamError;

pub mod csv;
pub mod outlet;

/// How often writer threads check for a stop request while no samples arrive.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Destination of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Network,
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "network" | "net" | "tcp" => Ok(Self::Network),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown output format '{}' (expected network or csv)", other)),
        }
    }
}

/// Where the stream goes, per format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Listen address of the network outlet.
    pub bind: String,
    /// Directory receiving CSV recordings.
    pub output_dir: PathBuf,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:16571".to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Stream metadata, sent once to every outlet client and used for CSV headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub channel_count: usize,
    pub nominal_srate: f64,
    pub channels: Vec<ChannelInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub label: String,
    pub unit: String,
}

impl StreamHeader {
    pub fn new(name: impl Into<String>, channels: &[Channel], nominal_srate: f64) -> Self {
        Self {
            name: name.into(),
            content_type: "ExG".to_string(),
            channel_count: channels.len(),
            nominal_srate,
            channels: channels
                .iter()
                .map(|ch| ChannelInfo {
                    label: ch.name.clone(),
                    unit: ch.unit.clone(),
                })
                .collect(),
        }
    }
}

/// Anything that can be bound to a device for the duration of a session.
pub trait SampleWriter {
    fn open(&mut self, device: &mut dyn Device) -> Result<(), StreamError>;

    /// Stop writing. Closing a writer that is not open is a no-op.
    fn close(&mut self) -> Result<(), StreamError>;
}

#[derive(Debug)]
struct Running {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), StreamError>>,
    local_addr: Option<SocketAddr>,
    path: Option<PathBuf>,
}

/// Stream writer for one output format, labelled with the stream name.
#[derive(Debug)]
pub struct StreamWriter {
    format: OutputFormat,
    label: String,
    config: StreamConfig,
    running: Option<Running>,
}

impl StreamWriter {
    pub fn new(format: OutputFormat, label: impl Into<String>) -> Self {
        Self::with_config(format, label, StreamConfig::default())
    }

    pub fn with_config(format: OutputFormat, label: impl Into<String>, config: StreamConfig) -> Self {
        Self {
            format,
            label: label.into(),
            config,
            running: None,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_open(&self) -> bool {
        self.running.is_some()
    }

    /// Address the network outlet listens on, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().and_then(|running| running.local_addr)
    }

    /// Path of the CSV recording, once open.
    pub fn output_path(&self) -> Option<&Path> {
        self.running.as_ref().and_then(|running| running.path.as_deref())
    }
}

impl SampleWriter for StreamWriter {
    fn open(&mut self, device: &mut dyn Device) -> Result<(), StreamError> {
        if self.running.is_some() {
            return Err(StreamError::AlreadyOpen);
        }
        let channels = device.enabled_channels()?;
        if channels.is_empty() {
            return Err(StreamError::NoChannels);
        }
        let fs = device.sampling_frequency()?;
        let nominal_srate = channels
            .iter()
            .map(|ch| fs.rate_of(ch.channel_type))
            .fold(0.0, f64::max);
        let header = StreamHeader::new(self.label.clone(), &channels, nominal_srate);
        let rx = device.register_consumer()?;
        let stop = Arc::new(AtomicBool::new(false));

        let running = match self.format {
            OutputFormat::Network => {
                let (local_addr, handle) = outlet::spawn(&self.config.bind, header, rx, stop.clone())?;
                log::info!("stream '{}' listening on {}", self.label, local_addr);
                Running { stop, handle, local_addr: Some(local_addr), path: None }
            }
            OutputFormat::Csv => {
                let (path, handle) = csv::spawn(&self.config.output_dir, header, rx, stop.clone())?;
                log::info!("stream '{}' recording to {}", self.label, path.display());
                Running { stop, handle, local_addr: None, path: Some(path) }
            }
        };
        self.running = Some(running);

        if device.state() != DeviceState::Sampling {
            if let Err(error) = device.start_measurement() {
                self.close()?;
                return Err(error.into());
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), StreamError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        running.stop.store(true, Ordering::Relaxed);
        let result = running.handle.join().map_err(|_| StreamError::WriterPanicked)?;
        log::debug!("stream '{}' closed", self.label);
        result
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::error!("closing stream '{}': {}", self.label, error);
        }
    }
}
