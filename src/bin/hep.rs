// Hep CLI
// Runs commands when matching Linux input events arrive

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use log::LevelFilter;
use signal_hook::consts::{SIGINT, SIGTERM};

use hep_core::{spawn_signal_handler, CapabilityMap, EvdevSource, Processor, RuleSet};

/// HID event processor
#[derive(Parser, Debug)]
#[command(name = "hep")]
#[command(version)]
#[command(about = "Run commands on Linux input events", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, conflicts_with = "silent")]
    debug: bool,

    /// Only log errors
    #[arg(short, long)]
    silent: bool,

    /// Prefix log lines with a timestamp
    #[arg(short, long)]
    timestamp: bool,

    /// YAML configuration file [default: ~/.config/hep/config.yaml]
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Detach from the terminal and run in the background
    #[arg(short = 'D', long)]
    daemon: bool,

    /// Validate config and exit
    #[arg(long)]
    check_config: bool,

    /// List available input devices
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else if self.silent {
            LevelFilter::Error
        } else {
            LevelFilter::Info
        }
    }

    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => default_config_path().context("cannot determine config directory, use --config"),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hep").join("config.yaml"))
}

fn init_logger(args: &Args) {
    let timestamp = args.timestamp;
    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .format(move |buf, record| {
            if timestamp {
                writeln!(buf, "{} {}: {}", buf.timestamp_millis(), record.level(), record.args())
            } else {
                writeln!(buf, "{}: {}", record.level(), record.args())
            }
        })
        .init();
}

/// Fork into the background; only the child returns.
fn daemonize() -> anyhow::Result<()> {
    // SAFETY: called before any thread is spawned or device is opened
    match unsafe { libc::fork() } {
        -1 => bail!("fork failed: {}", std::io::Error::last_os_error()),
        0 => {}
        _ => std::process::exit(0),
    }

    // SAFETY: plain syscall in the freshly forked child
    if unsafe { libc::setsid() } == -1 {
        bail!("setsid failed: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

fn list_devices() {
    let devices = EvdevSource::new().list_devices();
    println!("Found {} input device(s):", devices.len());
    for (identity, capabilities) in &devices {
        println!("  {}: {}", identity.path.display(), identity.name);
        println!(
            "      vendor=0x{:04x} product=0x{:04x} version=0x{:04x} types=[{}]",
            identity.info.vendor,
            identity.info.product,
            identity.info.version,
            describe_capabilities(capabilities)
        );
    }
}

/// `type(code count)` for each supported event type, e.g. `0(0), 1(84)`.
fn describe_capabilities(capabilities: &CapabilityMap) -> String {
    capabilities
        .types()
        .map(|t| {
            let count = capabilities.codes(t).map_or(0, |codes| codes.len());
            format!("{}({})", t, count)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_config(rules: &RuleSet) {
    println!("Configuration is valid: {} rule block(s)", rules.len());
    for (index, block) in rules.iter().enumerate() {
        let grab = if block.device.grab { ", grab" } else { "" };
        println!("  #{}: {} key rule(s){}", index, block.keys.len(), grab);
    }
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    if args.list_devices {
        list_devices();
        return Ok(ExitCode::SUCCESS);
    }

    let config_path = args.config_path()?;
    let rules = RuleSet::from_path(&config_path)
        .with_context(|| format!("invalid config {}", config_path.display()))?;

    if args.check_config {
        check_config(&rules);
        return Ok(ExitCode::SUCCESS);
    }

    if args.daemon {
        daemonize()?;
    }

    let mut processor = Processor::new(rules, Box::new(EvdevSource::new()))
        .context("cannot start event processor")?;
    let shutdown = processor.shutdown_handle();
    // Exit from the signal thread: a foreground command may be blocking the loop
    spawn_signal_handler(&[SIGINT, SIGTERM], shutdown.clone(), |_| {
        std::process::exit(1)
    })?;

    processor.run()?;

    if shutdown.is_requested() {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(&args);

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
