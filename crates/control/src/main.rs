//! widget-control
//!
//! Configuration utility for Audio-Widget USB audio devices. Reads the
//! device's feature catalog and lets the user change the selected value of
//! each feature, interactively or from a batch file.

mod config;
mod tui;
mod usb;

use anyhow::{Context, Result, bail};
use clap::Parser;
use common::{setup_file_logging, setup_logging};
use config::WidgetConfig;
use protocol::{DeviceIdentity, DeviceMatcher, DeviceSession, FEATURES, UsbBus, apply_config};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use usb::RusbBus;

#[derive(Parser, Debug)]
#[command(name = "widget-control")]
#[command(
    author,
    version,
    about = "Audio-Widget configuration - read and change device features"
)]
#[command(long_about = "
Reads the feature catalog of an attached Audio-Widget over USB control
transfers and changes the selected value of each feature (board type,
firmware image, channel routing, ...).

EXAMPLES:
    # Interactive editor
    widget-control

    # Print the device identity and every feature
    widget-control --info

    # Same as JSON
    widget-control --info --json

    # Apply a batch file (lines of Feature=Value, ';' comments, needreset=1)
    widget-control --apply widget.cfg

    # List attached Audio-Widget devices
    widget-control --list-devices

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/widget-control/config.toml
    3. /etc/widget-control/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List matching USB devices and exit
    #[arg(long, conflicts_with_all = ["info", "apply"])]
    list_devices: bool,

    /// Print device identity and feature values and exit
    #[arg(long, conflicts_with = "apply")]
    info: bool,

    /// Print --info output as JSON
    #[arg(long, requires = "info")]
    json: bool,

    /// Apply a batch configuration file and exit
    #[arg(long, value_name = "FILE")]
    apply: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn interactive(&self) -> bool {
        !self.list_devices && !self.info && self.apply.is_none()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = WidgetConfig::default();
        let path = WidgetConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        WidgetConfig::load_or_default()
    };

    // CLI log level wins over the config value
    let log_level = args.log_level.as_deref().unwrap_or(&config.app.log_level);

    if args.interactive() {
        let log_path = config.app.log_path();
        setup_file_logging(log_level, &log_path).context("Failed to setup logging")?;
    } else {
        setup_logging(log_level).context("Failed to setup logging")?;
    }

    info!("widget-control v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let matcher = config.matcher().context("Invalid device id configuration")?;
    let bus = RusbBus::new(config.timeout()).context("Failed to initialize libusb")?;

    if args.list_devices {
        return list_devices_mode(&bus, &matcher);
    }

    let mut session = DeviceSession::new(matcher);

    if args.info {
        return info_mode(&bus, &mut session, args.json);
    }

    if let Some(ref path) = args.apply {
        return apply_mode(&bus, &mut session, path, &config);
    }

    info!("Running in TUI mode (interactive)");
    tui::run(bus, session, config.timing.clone())
}

/// List matching devices and exit
fn list_devices_mode(bus: &RusbBus, matcher: &DeviceMatcher) -> Result<()> {
    let devices: Vec<_> = bus
        .devices()
        .context("Failed to enumerate USB devices")?
        .into_iter()
        .filter(|device| matcher.matches(device))
        .collect();

    if devices.is_empty() {
        println!("No Audio-Widget devices found.");
    } else {
        println!("Found {} Audio-Widget device(s):\n", devices.len());
        for device in devices {
            println!(
                "  {:04x}:{:04x}  Bus {:03} Device {:03}",
                device.vendor_id, device.product_id, device.bus_number, device.device_address
            );
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct FeatureReport<'a> {
    name: &'static str,
    values: &'a [String],
    selected: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeviceReport<'a> {
    identity: &'a DeviceIdentity,
    features: Vec<FeatureReport<'a>>,
}

fn device_report<T: protocol::Transport>(session: &DeviceSession<T>) -> Result<DeviceReport<'_>> {
    let Some(identity) = session.identity() else {
        bail!("Device identity not available");
    };

    let features = FEATURES
        .iter()
        .filter_map(|descriptor| {
            let slot = session.catalog().slot(descriptor.id)?;
            Some(FeatureReport {
                name: descriptor.name,
                values: &slot.values,
                selected: slot.selected.as_deref(),
            })
        })
        .collect();

    Ok(DeviceReport { identity, features })
}

fn print_features(report: &DeviceReport<'_>) {
    for feature in &report.features {
        println!(
            "  {:<12} {:<16} [{}]",
            feature.name,
            feature.selected.unwrap_or("-"),
            feature.values.join(", ")
        );
    }
}

/// Print identity and features and exit
fn info_mode(bus: &RusbBus, session: &mut DeviceSession<usb::RusbHandle>, json: bool) -> Result<()> {
    session.initialize(bus)?;
    let report = device_report(session)?;

    if json {
        let output =
            serde_json::to_string_pretty(&report).context("Failed to serialize device report")?;
        println!("{}", output);
    } else {
        println!("{}\n", report.identity);
        print_features(&report);
    }

    Ok(())
}

/// Apply a batch file, then re-read the device if it was reset
fn apply_mode(
    bus: &RusbBus,
    session: &mut DeviceSession<usb::RusbHandle>,
    path: &Path,
    config: &WidgetConfig,
) -> Result<()> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;

    session.initialize(bus)?;
    let report = apply_config(session, &input)?;

    for (feature, value) in &report.applied {
        info!("{} = {}", feature, value);
    }
    println!("Applied {} setting(s) from {}", report.applied.len(), path.display());

    if report.reset_requested {
        if !report.reset_sent {
            println!("Reset request was not acknowledged");
        }
        let settle = config.timing.batch_reset_settle();
        info!("Waiting {:?} for the device to restart", settle);
        std::thread::sleep(settle);
        session
            .initialize(bus)
            .context("Device did not come back after reset")?;
    }

    print_features(&device_report(session)?);
    Ok(())
}
