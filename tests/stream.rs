use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

use ecg_stream::channels::{self, ChannelSelection};
use ecg_stream::device::simulated::{SimulatedDriver, SimulationOptions};
use ecg_stream::device::{BaseSampleRate, ChannelTypeScope, Device, DeviceDriver, DeviceState, DeviceType, Interfaces};
use ecg_stream::error::StreamError;
use ecg_stream::stream::outlet::Frame;
use ecg_stream::stream::{OutputFormat, SampleWriter, StreamConfig, StreamHeader, StreamWriter};

fn configured_device() -> Box<dyn Device> {
    let mut devices = SimulatedDriver::new(1)
        .with_options(SimulationOptions {
            block_interval: Duration::from_millis(5),
            ..Default::default()
        })
        .discover(DeviceType::Saga, Interfaces::default())
        .unwrap();
    let mut device = devices.remove(0);
    device.open().unwrap();
    device
        .set_sampling_config(BaseSampleRate::Decimal, ChannelTypeScope::All, 8)
        .unwrap();
    channels::select(device.as_mut(), &ChannelSelection::default()).unwrap();
    device
}

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ecg-stream-{}-{}", name, std::process::id()))
}

#[test]
fn network_outlet_sends_header_then_frames() {
    let mut device = configured_device();
    let config = StreamConfig {
        bind: "127.0.0.1:0".to_string(),
        ..Default::default()
    };
    let mut writer = StreamWriter::with_config(OutputFormat::Network, "SAGA", config);
    writer.open(device.as_mut()).unwrap();
    assert_eq!(device.state(), DeviceState::Sampling);

    let addr = writer.local_addr().unwrap();
    let socket = TcpStream::connect(addr).unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut lines = BufReader::new(socket).lines();

    let header: StreamHeader = serde_json::from_str(&lines.next().unwrap().unwrap()).unwrap();
    assert_eq!(header.name, "SAGA");
    assert_eq!(header.content_type, "ExG");
    assert_eq!(header.channel_count, 1);
    assert_eq!(header.nominal_srate, 500.0);
    assert_eq!(header.channels[0].label, "BIP 01");

    let first: Frame = serde_json::from_str(&lines.next().unwrap().unwrap()).unwrap();
    let second: Frame = serde_json::from_str(&lines.next().unwrap().unwrap()).unwrap();
    assert_eq!(first.v.len(), 1);
    assert!(second.t > first.t);

    writer.close().unwrap();
    assert!(!writer.is_open());
    device.close().unwrap();
}

#[test]
fn csv_writer_records_enabled_channels() {
    let dir = scratch_dir("csv");
    let mut device = configured_device();
    let config = StreamConfig {
        output_dir: dir.clone(),
        ..Default::default()
    };
    let mut writer = StreamWriter::with_config(OutputFormat::Csv, "ECG", config);
    writer.open(device.as_mut()).unwrap();
    let path = writer.output_path().unwrap().to_owned();
    assert!(path.starts_with(&dir));
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("ECG_"));

    std::thread::sleep(Duration::from_millis(300));
    writer.close().unwrap();
    device.close().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let mut rows = content.lines();
    assert_eq!(rows.next(), Some("timestamp,BIP 01"));
    let data: Vec<&str> = rows.collect();
    assert!(!data.is_empty());
    assert!(data.iter().all(|row| row.split(',').count() == 2));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn open_twice_is_rejected() {
    let mut device = configured_device();
    let config = StreamConfig {
        bind: "127.0.0.1:0".to_string(),
        ..Default::default()
    };
    let mut writer = StreamWriter::with_config(OutputFormat::Network, "SAGA", config);
    writer.open(device.as_mut()).unwrap();
    assert!(matches!(writer.open(device.as_mut()), Err(StreamError::AlreadyOpen)));
    writer.close().unwrap();
    writer.close().unwrap();
    device.close().unwrap();
}

#[test]
fn open_without_enabled_channels_fails() {
    let mut device = configured_device();
    let all: Vec<usize> = (0..48).collect();
    device.set_active_channels(&all, false).unwrap();
    let mut writer = StreamWriter::new(OutputFormat::Network, "SAGA");
    assert!(matches!(writer.open(device.as_mut()), Err(StreamError::NoChannels)));
    assert_eq!(device.state(), DeviceState::Connected);
    device.close().unwrap();
}
