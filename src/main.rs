use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;
use log::*;

use ecg_stream::config::SessionConfig;
use ecg_stream::device::simulated::SimulatedDriver;
use ecg_stream::session::{self, Outcome};
use ecg_stream::{NativePresenter, OutputFormat, StreamWriter};

/// Stream the ECG channels of a SAGA amplifier and plot them live.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session config (YAML). Defaults to ~/.ecg-stream/config.yaml when present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Auxiliary channel ordinals to enable
    #[arg(long, value_delimiter = ',')]
    aux: Option<Vec<usize>>,

    /// Bipolar channel ordinals to enable
    #[arg(long, value_delimiter = ',')]
    bip: Option<Vec<usize>>,

    /// Channel-group divider (1, 2, 4 or 8)
    #[arg(long)]
    divider: Option<u32>,

    /// Output format: network or csv
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Stream label
    #[arg(long)]
    label: Option<String>,

    /// Listen address of the network outlet
    #[arg(long)]
    bind: Option<String>,

    /// Directory for CSV recordings
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Number of simulated devices to discover
    #[arg(long, default_value_t = 1)]
    devices: usize,
}

impl Args {
    fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::load_from_default_path().unwrap_or_else(|e| {
                warn!("ignoring default config: {}", e);
                None
            })
            .unwrap_or_default(),
        };
        if let Some(aux) = &self.aux {
            config.channels.aux = aux.iter().copied().collect();
        }
        if let Some(bip) = &self.bip {
            config.channels.bip = bip.iter().copied().collect();
        }
        if let Some(divider) = self.divider {
            config.device.divider = divider;
        }
        if let Some(format) = self.format {
            config.stream.format = format;
        }
        if let Some(label) = &self.label {
            config.stream.label = label.clone();
        }
        if let Some(bind) = &self.bind {
            config.stream.target.bind = bind.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.stream.target.output_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.session_config()?;
    debug!("Config: {:#?}", config);

    let mut driver = SimulatedDriver::new(args.devices);
    let mut writer = StreamWriter::with_config(
        config.stream.format,
        config.stream.label.clone(),
        config.stream.target.clone(),
    );
    let mut presenter = NativePresenter::get_or_create(None);

    match session::run(&mut driver, &mut writer, &mut presenter, &config)? {
        Outcome::Completed => info!("Done."),
        Outcome::NoDevice => warn!("No device found; nothing to stream."),
        Outcome::Aborted(error) => {
            error!("Session aborted: {}", error);
            std::process::exit(1);
        }
    }
    Ok(())
}
