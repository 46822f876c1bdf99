//! In-process SAGA amplifier.
//!
//! Exposes the SAGA 32+ channel layout (32 unipolar, 4 bipolar, 9 auxiliary,
//! sensor, status and counter channels) and, while sampling, produces a synthetic
//! ECG on the bipolar channels from a background thread.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{
    BaseSampleRate, Channel, ChannelType, ChannelTypeScope, Device, DeviceDriver, DeviceInfo,
    DeviceState, DeviceType, Interfaces, SampleBlock, SamplingFrequency, VALID_DIVIDERS,
};
use crate::error::DeviceError;

const UNI_CHANNELS: usize = 32;
const BIP_CHANNELS: usize = 4;
const AUX_GROUPS: usize = 3;
const AUX_PER_GROUP: usize = 3;

/// Shape of the generated signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationOptions {
    pub heart_rate_bpm: f64,
    /// R-peak amplitude in µV on the first bipolar channel.
    pub ecg_amplitude_uv: f64,
    pub block_interval: Duration,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            heart_rate_bpm: 72.0,
            ecg_amplitude_uv: 1200.0,
            block_interval: Duration::from_millis(50),
        }
    }
}

/// Driver that "discovers" a fixed number of simulated SAGA devices.
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    device_count: usize,
    options: SimulationOptions,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SimulatedDriver {
    pub fn new(device_count: usize) -> Self {
        Self {
            device_count,
            options: SimulationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SimulationOptions) -> Self {
        self.options = options;
        self
    }
}

impl DeviceDriver for SimulatedDriver {
    fn discover(
        &mut self,
        device_type: DeviceType,
        interfaces: Interfaces,
    ) -> Result<Vec<Box<dyn Device>>, DeviceError> {
        log::debug!(
            "discover({}, dr={:?}, ds={:?})",
            device_type,
            interfaces.data_recorder,
            interfaces.docking_station
        );
        let devices = (0..self.device_count)
            .map(|n| {
                let info = DeviceInfo {
                    device_type,
                    serial: format!("{}", 1_005_210_038 + n as u64),
                    interfaces,
                };
                Box::new(SimulatedDevice::new(info, self.options)) as Box<dyn Device>
            })
            .collect();
        Ok(devices)
    }
}

#[derive(Debug)]
struct Producer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// A simulated SAGA 32+ amplifier.
#[derive(Debug)]
pub struct SimulatedDevice {
    info: DeviceInfo,
    options: SimulationOptions,
    state: DeviceState,
    channels: Vec<Channel>,
    base_rate: BaseSampleRate,
    dividers: BTreeMap<ChannelType, u32>,
    consumers: Arc<Mutex<Vec<Sender<SampleBlock>>>>,
    producer: Option<Producer>,
}

impl SimulatedDevice {
    pub fn new(info: DeviceInfo, options: SimulationOptions) -> Self {
        Self {
            info,
            options,
            state: DeviceState::Disconnected,
            channels: saga_channel_layout(),
            base_rate: BaseSampleRate::Binary,
            dividers: ChannelType::ALL.iter().map(|&ty| (ty, 1)).collect(),
            consumers: Arc::new(Mutex::new(Vec::new())),
            producer: None,
        }
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    fn ensure_idle(&self) -> Result<(), DeviceError> {
        match self.state {
            DeviceState::Disconnected => Err(DeviceError::NotConnected),
            DeviceState::Sampling => Err(DeviceError::Busy),
            DeviceState::Connected => Ok(()),
        }
    }

    fn group_rate(&self, channel_type: ChannelType) -> f64 {
        let divider = self.dividers.get(&channel_type).copied().unwrap_or(1);
        self.base_rate.hz() / divider as f64
    }

    fn halt_producer(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.stop.store(true, Ordering::Relaxed);
            if producer.handle.join().is_err() {
                log::error!("{}: sample producer panicked", self.info);
            }
        }
    }
}

impl Device for SimulatedDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        if self.state.is_connected() {
            return Err(DeviceError::AlreadyOpen);
        }
        self.state = DeviceState::Connected;
        log::debug!("{}: opened", self.info);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.halt_producer();
        self.consumers.lock().unwrap().clear();
        self.state = DeviceState::Disconnected;
        log::debug!("{}: closed", self.info);
        Ok(())
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn set_sampling_config(
        &mut self,
        base_rate: BaseSampleRate,
        scope: ChannelTypeScope,
        divider: u32,
    ) -> Result<(), DeviceError> {
        self.ensure_idle()?;
        if !VALID_DIVIDERS.contains(&divider) {
            return Err(DeviceError::InvalidDivider(divider));
        }
        log::debug!("{}: set_sampling_config({:?}, {:?}, {})", self.info, base_rate, scope, divider);
        self.base_rate = base_rate;
        for (&channel_type, value) in self.dividers.iter_mut() {
            if scope.contains(channel_type) {
                *value = divider;
            }
        }
        Ok(())
    }

    fn sampling_frequency(&self) -> Result<SamplingFrequency, DeviceError> {
        self.ensure_connected()?;
        Ok(SamplingFrequency {
            base: self.base_rate.hz(),
            groups: self.dividers.keys().map(|&ty| (ty, self.group_rate(ty))).collect(),
        })
    }

    fn channels(&self) -> Result<Vec<Channel>, DeviceError> {
        self.ensure_connected()?;
        Ok(self.channels.clone())
    }

    fn set_active_channels(&mut self, indices: &[usize], enabled: bool) -> Result<(), DeviceError> {
        self.ensure_idle()?;
        let count = self.channels.len();
        if let Some(&index) = indices.iter().find(|&&index| index >= count) {
            return Err(DeviceError::InvalidChannel { index, count });
        }
        log::trace!("{}: set_active_channels({:?}, {})", self.info, indices, enabled);
        for &index in indices {
            self.channels[index].enabled = enabled;
        }
        Ok(())
    }

    fn start_measurement(&mut self) -> Result<(), DeviceError> {
        match self.state {
            DeviceState::Disconnected => return Err(DeviceError::NotConnected),
            DeviceState::Sampling => return Ok(()),
            DeviceState::Connected => (),
        }
        let plan = SignalPlan::new(&self.channels, self.options);
        let rate = self
            .channels
            .iter()
            .filter(|ch| ch.enabled)
            .map(|ch| self.group_rate(ch.channel_type))
            .fold(0.0, f64::max);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = stop.clone();
            let consumers = self.consumers.clone();
            let interval = self.options.block_interval;
            thread::Builder::new()
                .name(format!("saga-{}", self.info.serial))
                .spawn(move || produce(plan, rate, interval, consumers, stop))
                .map_err(|error| DeviceError::Device {
                    code: 0x0100,
                    message: format!("cannot start sampling thread: {}", error),
                })?
        };
        self.producer = Some(Producer { stop, handle });
        self.state = DeviceState::Sampling;
        log::debug!("{}: sampling at {} Hz", self.info, rate);
        Ok(())
    }

    fn stop_measurement(&mut self) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.halt_producer();
        self.state = DeviceState::Connected;
        Ok(())
    }

    fn register_consumer(&mut self) -> Result<Receiver<SampleBlock>, DeviceError> {
        self.ensure_connected()?;
        let (tx, rx) = channel();
        self.consumers.lock().unwrap().push(tx);
        Ok(rx)
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.halt_producer();
    }
}

/// Channel layout of a SAGA 32+ amplifier.
pub fn saga_channel_layout() -> Vec<Channel> {
    let mut channels = Vec::new();
    for n in 1..=UNI_CHANNELS {
        channels.push(Channel::new(format!("UNI {}", n), "uVolt", ChannelType::Uni));
    }
    for n in 1..=BIP_CHANNELS {
        channels.push(Channel::new(format!("BIP {:02}", n), "uVolt", ChannelType::Bip));
    }
    for group in 1..=AUX_GROUPS {
        for n in 1..=AUX_PER_GROUP {
            channels.push(Channel::new(format!("AUX {}-{}", group, n), "uVolt", ChannelType::Aux));
        }
    }
    channels.push(Channel::new("APG", "-", ChannelType::Sensor));
    channels.push(Channel::new("STATUS", "-", ChannelType::Status));
    channels.push(Channel::new("COUNTER", "-", ChannelType::Counter));
    channels
}

/// What to generate for each enabled channel, in output order.
#[derive(Debug, Clone)]
struct SignalPlan {
    sources: Vec<(ChannelType, usize)>,
    options: SimulationOptions,
}

impl SignalPlan {
    fn new(channels: &[Channel], options: SimulationOptions) -> Self {
        let mut ordinals: BTreeMap<ChannelType, usize> = BTreeMap::new();
        let mut sources = Vec::new();
        for ch in channels {
            let ordinal = ordinals.entry(ch.channel_type).or_insert(0);
            if ch.enabled {
                sources.push((ch.channel_type, *ordinal));
            }
            *ordinal += 1;
        }
        Self { sources, options }
    }

    fn value(&self, channel_type: ChannelType, ordinal: usize, index: u64, t: f64) -> f32 {
        match channel_type {
            ChannelType::Bip => {
                let scale = 1.0 - 0.15 * ordinal as f64;
                (ecg_waveform(t, self.options.heart_rate_bpm) * self.options.ecg_amplitude_uv * scale) as f32
            }
            ChannelType::Uni => {
                let phase = ordinal as f64 * std::f64::consts::PI / 16.0;
                (10.0 * (2.0 * std::f64::consts::PI * 10.0 * t + phase).sin()) as f32
            }
            ChannelType::Counter => index as f32,
            ChannelType::Aux | ChannelType::Sensor | ChannelType::Status => 0.0,
        }
    }
}

/// Normalised ECG (R peak = 1.0) as a sum of Gaussian P, Q, R, S and T waves.
pub fn ecg_waveform(t: f64, heart_rate_bpm: f64) -> f64 {
    // (position within beat, amplitude, width) per wave
    const WAVES: [(f64, f64, f64); 5] = [
        (0.20, 0.12, 0.025),
        (0.37, -0.10, 0.010),
        (0.40, 1.00, 0.012),
        (0.43, -0.22, 0.010),
        (0.70, 0.28, 0.045),
    ];
    let phase = (t * heart_rate_bpm / 60.0).fract();
    WAVES
        .iter()
        .map(|&(center, amplitude, width)| {
            let d = (phase - center) / width;
            amplitude * (-0.5 * d * d).exp()
        })
        .sum()
}

fn produce(
    plan: SignalPlan,
    rate: f64,
    interval: Duration,
    consumers: Arc<Mutex<Vec<Sender<SampleBlock>>>>,
    stop: Arc<AtomicBool>,
) {
    if plan.sources.is_empty() || rate <= 0.0 {
        log::warn!("no enabled channels; producer idle");
        return;
    }
    let start = Instant::now();
    let mut produced: u64 = 0;
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(interval);
        let target = (start.elapsed().as_secs_f64() * rate) as u64;
        if target <= produced {
            continue;
        }
        let mut values = Vec::with_capacity((target - produced) as usize * plan.sources.len());
        for index in produced..target {
            let t = index as f64 / rate;
            for &(channel_type, ordinal) in &plan.sources {
                values.push(plan.value(channel_type, ordinal, index, t));
            }
        }
        let block = SampleBlock {
            first_index: produced,
            sample_rate: rate,
            channel_count: plan.sources.len(),
            values,
        };
        produced = target;
        consumers.lock().unwrap().retain(|tx| tx.send(block.clone()).is_ok());
    }
}
