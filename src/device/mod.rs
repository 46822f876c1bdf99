//! Device driver seam.
//!
//! The acquisition hardware is reached through two traits:
//! - [`DeviceDriver`] enumerates devices of a given type over a pair of transports.
//! - [`Device`] is a handle to one amplifier: open/close, sampling configuration,
//!   channel enable/disable and sample delivery to registered consumers.
//!
//! [`simulated`] provides an in-process implementation with the channel layout of a
//! SAGA 32+ amplifier.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::Receiver;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

pub mod simulated;

/// Family of amplifier to look for during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Saga,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Saga => write!(f, "SAGA"),
        }
    }
}

/// Physical transport between host, docking station and data recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Usb,
    Network,
    Wifi,
    Electrical,
    Optical,
    Bluetooth,
}

/// Transports used to reach the data recorder and the docking station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interfaces {
    pub data_recorder: InterfaceType,
    pub docking_station: InterfaceType,
}

impl Default for Interfaces {
    fn default() -> Self {
        Self {
            data_recorder: InterfaceType::Wifi,
            docking_station: InterfaceType::Usb,
        }
    }
}

/// Connection state of a device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Disconnected,
    Connected,
    Sampling,
}

impl DeviceState {
    /// `true` while the handle holds a live connection (idle or sampling).
    pub fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

/// Channel-type tag reported for each device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Uni,
    Bip,
    Aux,
    Sensor,
    Status,
    Counter,
}

impl ChannelType {
    pub const ALL: [ChannelType; 6] = [
        Self::Uni,
        Self::Bip,
        Self::Aux,
        Self::Sensor,
        Self::Status,
        Self::Counter,
    ];
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Uni => "UNI",
            Self::Bip => "BIP",
            Self::Aux => "AUX",
            Self::Sensor => "SENSOR",
            Self::Status => "STATUS",
            Self::Counter => "COUNTER",
        };
        f.write_str(name)
    }
}

/// Which channel groups a sampling configuration applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTypeScope {
    All,
    Only(ChannelType),
}

impl ChannelTypeScope {
    pub fn contains(self, channel_type: ChannelType) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => only == channel_type,
        }
    }
}

/// Core acquisition frequency before per-group dividers are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BaseSampleRate {
    Binary,
    #[default]
    Decimal,
}

impl BaseSampleRate {
    pub fn hz(self) -> f64 {
        match self {
            Self::Binary => 4096.0,
            Self::Decimal => 4000.0,
        }
    }
}

/// Dividers accepted by [`Device::set_sampling_config`].
pub const VALID_DIVIDERS: [u32; 4] = [1, 2, 4, 8];

/// Effective sampling rates read back from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingFrequency {
    pub base: f64,
    pub groups: BTreeMap<ChannelType, f64>,
}

impl SamplingFrequency {
    /// Rate of the given channel group, falling back to the base rate.
    pub fn rate_of(&self, channel_type: ChannelType) -> f64 {
        self.groups.get(&channel_type).copied().unwrap_or(self.base)
    }
}

/// One channel descriptor as reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub unit: String,
    pub channel_type: ChannelType,
    pub enabled: bool,
}

impl Channel {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, channel_type: ChannelType) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            channel_type,
            enabled: true,
        }
    }
}

/// Identification of a discovered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub serial: String,
    pub interfaces: Interfaces,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} #{}", self.device_type, self.serial)
    }
}

/// A block of interleaved sample frames over the enabled channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    /// Index of the first frame since measurement start.
    pub first_index: u64,
    pub sample_rate: f64,
    pub channel_count: usize,
    pub values: Vec<f32>,
}

impl SampleBlock {
    pub fn frame_count(&self) -> usize {
        if self.channel_count == 0 {
            0
        } else {
            self.values.len() / self.channel_count
        }
    }

    /// Per-sample slices, one value per enabled channel.
    pub fn frames(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.values.chunks_exact(self.channel_count.max(1)).take(self.frame_count())
    }

    /// Seconds since measurement start of the `frame`-th frame in this block.
    pub fn timestamp(&self, frame: usize) -> f64 {
        (self.first_index + frame as u64) as f64 / self.sample_rate
    }
}

/// Entry point of a device driver: turns a device type and transports into handles.
pub trait DeviceDriver {
    fn discover(
        &mut self,
        device_type: DeviceType,
        interfaces: Interfaces,
    ) -> Result<Vec<Box<dyn Device>>, DeviceError>;
}

/// Handle to a single amplifier.
pub trait Device {
    fn info(&self) -> DeviceInfo;

    fn open(&mut self) -> Result<(), DeviceError>;

    /// Stops any running measurement and drops the connection.
    fn close(&mut self) -> Result<(), DeviceError>;

    fn state(&self) -> DeviceState;

    fn set_sampling_config(
        &mut self,
        base_rate: BaseSampleRate,
        scope: ChannelTypeScope,
        divider: u32,
    ) -> Result<(), DeviceError>;

    fn sampling_frequency(&self) -> Result<SamplingFrequency, DeviceError>;

    /// All channels in device order, including disabled ones.
    fn channels(&self) -> Result<Vec<Channel>, DeviceError>;

    fn set_active_channels(&mut self, indices: &[usize], enabled: bool) -> Result<(), DeviceError>;

    fn start_measurement(&mut self) -> Result<(), DeviceError>;

    fn stop_measurement(&mut self) -> Result<(), DeviceError>;

    /// Subscribe to sample blocks. Dropping the receiver unsubscribes.
    fn register_consumer(&mut self) -> Result<Receiver<SampleBlock>, DeviceError>;

    /// Enabled channels only, in device order.
    fn enabled_channels(&self) -> Result<Vec<Channel>, DeviceError> {
        Ok(self.channels()?.into_iter().filter(|ch| ch.enabled).collect())
    }
}
