//! Sensor Link CLI Application
//!
//! Command-line front end for the sensor-link library. It drives one device
//! session against the simulated board and adds:
//! - TOML configuration with command-line overrides
//! - Streaming or log-and-download runs per signal
//! - A JSON report of every run

use anyhow::{Context, Result};
use clap::Parser;
use sensor_link::sim::{SimBoard, SimTransport};
use sensor_link::Device;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod report;
mod session;

use config::{AppConfig, Mode, SignalConfig};
use report::RunReport;
use session::Session;

/// Sensor Link - Stream, record and download sensor board signals
#[derive(Parser, Debug)]
#[command(name = "sensor-link-cli")]
#[command(about = "Stream, record and download sensor board signals", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Signal to run (can be repeated); replaces the signals of the config file
    #[arg(short, long, value_name = "NAME")]
    signal: Vec<String>,

    /// Stream samples or record them into the onboard log
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Number of samples per signal
    #[arg(short = 'n', long, value_name = "COUNT")]
    samples: Option<usize>,

    /// Time processor period in milliseconds
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Output file for the JSON report (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Sensor Link CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using sensor-link library v{}", sensor_link::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    if config.signals.is_empty() {
        println!("Sensor Link - No signals selected");
        println!("\nQuick Start:");
        println!("  sensor-link-cli --signal accelerometer --samples 20");
        println!("  sensor-link-cli --signal gyroscope --mode log --delay-ms 50");
        println!("\nFrom a configuration file:");
        println!("  sensor-link-cli --config config.toml");
        println!("\nUse --help for more options");
        return Ok(());
    }

    run(&config)
}

/// Fold command-line flags into the loaded configuration
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if !args.signal.is_empty() {
        config.signals = args.signal.iter().map(|name| SignalConfig::new(name)).collect();
    }
    for signal in &mut config.signals {
        if let Some(mode) = args.mode {
            signal.mode = mode;
        }
        if let Some(samples) = args.samples {
            signal.samples = samples;
        }
        if args.delay_ms.is_some() {
            signal.delay_ms = args.delay_ms;
        }
    }
    if args.output.is_some() {
        config.output.report = args.output.clone();
    }
}

fn run(config: &AppConfig) -> Result<()> {
    let board = Arc::new(SimBoard::with_signals(&config.available_signals()?));
    let transport = Arc::new(SimTransport::new().with_model_number(&config.device.model_number));
    let device = Device::new(board.clone(), transport, config.client.clone())
        .context("Failed to create device session")?;

    device.connect().context("Failed to connect")?;
    let info = device.info().context("Failed to read device information")?;
    log::info!(
        "Connected to {} (serial {}, firmware {})",
        info.model(),
        info.serial,
        info.firmware
    );

    let mut report = RunReport::new(info);
    let mut session = Session::new(&device, &board);
    for (id, plan) in config.signal_ids()?.into_iter().zip(&config.signals) {
        log::info!("Running {} ({:?}, {} samples)", id, plan.mode, plan.samples);
        let signal = session.run(id, plan)?;
        log::info!("{}: {} samples", id, signal.samples.len());
        report.push(signal);
    }

    device.disconnect().context("Failed to disconnect")?;
    report.write(&config.output)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
