//! Replay a telemetry capture, or follow a live link, and print snapshots.
//!
//! ```text
//! cargo run --example replay -- -v 2 --file capture.bin --interval 250ms
//! cargo run --example replay -- --tcp localhost:2000 --threshold 28
//! ```
//!
//! Snapshots are printed to stdout as one JSON object per line.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use groundlink::Float;
use groundlink::aggregate::Mode;
use groundlink::config::Config;
use groundlink::graph::CancellationToken;
use groundlink::station::Station;

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Read the link from this file. Default is stdin.
    #[arg(long, conflicts_with = "tcp")]
    file: Option<PathBuf>,

    /// Connect to a serial-over-TCP bridge.
    #[arg(long)]
    tcp: Option<String>,

    /// JSON config file. Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbosity level.
    #[arg(short, default_value = "0")]
    verbose: usize,

    /// Time between snapshots.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "500ms")]
    interval: Duration,

    /// Override the alarm threshold.
    #[arg(long)]
    threshold: Option<Float>,

    /// Let the satellite compute the moving average.
    #[arg(long)]
    satellite_mean: bool,
}

fn load_config(opt: &Opt) -> Result<Config> {
    let mut config = match &opt.config {
        Some(path) => serde_json::from_reader(std::fs::File::open(path)?)?,
        None => Config::default(),
    };
    if let Some(t) = opt.threshold {
        config.alarm_threshold = t;
    }
    if opt.satellite_mean {
        config.mode = Mode::SatelliteComputed;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("groundlink")
        .quiet(false)
        .verbosity(opt.verbose)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;
    let config = load_config(&opt)?;
    info!("Config: {}", serde_json::to_string(&config)?);

    let station = match (&opt.tcp, &opt.file) {
        (Some(addr), _) => Station::connect_tcp(addr.as_str(), config)?,
        (None, Some(path)) => Station::new(std::fs::File::open(path)?, std::io::sink(), config),
        (None, None) => Station::new(std::io::stdin(), std::io::sink(), config),
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("Got Ctrl-C");
            cancel.cancel();
        })?;
    }

    station.start()?;
    loop {
        let done = !station.is_running() || cancel.is_canceled();
        println!("{}", serde_json::to_string(&station.snapshot()?)?);
        if done {
            break;
        }
        std::thread::sleep(opt.interval);
    }
    // A reader blocked on stdin can't be woken up, so don't wait for it.
    let on_stdin = opt.tcp.is_none() && opt.file.is_none();
    if on_stdin && station.is_running() {
        warn!("Not waiting for reader blocked on stdin");
        return Ok(());
    }
    station.shutdown()?;
    Ok(())
}
