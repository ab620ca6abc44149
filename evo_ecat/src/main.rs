//! # EVO EtherCAT Master Binary
//!
//! Brings the segment on `IFNAME` to OPERATIONAL, runs the bounded cyclic
//! loop against the configured drive while the network supervisor recovers
//! dropped devices in the background, then returns every device to INIT.
//!
//! # Usage
//!
//! ```bash
//! # Simulated segment with default timing (10 000 cycles at 5 ms)
//! evo_ecat sim0
//!
//! # Config file, shorter run, debug output (per-cycle diagnostics)
//! evo_ecat eth0 --config config/ecat.toml --cycles 2000 -v
//!
//! # JSON logs
//! evo_ecat eth0 --json
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Run completed, or no interface given (usage printed) |
//! | 1 | Fatal startup failure (config, bind, no devices, RT setup) |
//! | 2 | Not all devices reached OPERATIONAL |

use clap::{CommandFactory, Parser};
use evo_common::config::{ConfigError, LogLevel, load_master_config};
use evo_common::fieldbus::config::MasterConfig;
use evo_ecat::network::NetworkState;
use evo_ecat::orchestrator::{Orchestrator, RunReport};
use evo_ecat::rt::{is_realtime, rt_setup};
use evo_ecat::supervisor::Supervisor;
use evo_ecat::transport_registry::TransportRegistry;
use evo_ecat::transports::register_all_transports;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_FATAL: u8 = 1;
const EXIT_NOT_OPERATIONAL: u8 = 2;

/// EVO EtherCAT master - single-axis CiA-402 servo over cyclic process data
#[derive(Parser, Debug)]
#[command(name = "evo_ecat")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "EtherCAT master driving one CiA-402 servo with network state supervision")]
#[command(long_about = None)]
struct Args {
    /// Network interface the segment is attached to (e.g. eth0)
    #[arg(value_name = "IFNAME")]
    ifname: Option<String>,

    /// Path to master configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Transport to use (overrides [transport] driver)
    #[arg(short, long)]
    driver: Option<String>,

    /// Number of cyclic exchanges (overrides [cycle] cycle_count)
    #[arg(long)]
    cycles: Option<u64>,

    /// CPU core for the cyclic thread (rt feature)
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority of the cyclic thread (rt feature)
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let Some(ifname) = args.ifname.as_deref() else {
        // No interface: usage only.
        let _ = Args::command().print_help();
        println!();
        return ExitCode::SUCCESS;
    };

    let config = load_config(&args);
    let log_level = config
        .as_ref()
        .map_or(LogLevel::default(), |c| c.shared.log_level);
    setup_tracing(&args, log_level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    match run(&args, ifname, config) {
        Ok(report) if report.reached_operational => {
            info!(
                "EVO EtherCAT master finished: {} cycles ({} degraded), drive {:?}",
                report.stats.cycles, report.stats.degraded, report.drive_state
            );
            ExitCode::SUCCESS
        }
        Ok(report) => {
            warn!(
                "EVO EtherCAT master finished: {} of {} slaves not OPERATIONAL",
                report.non_operational.len(),
                report.devices
            );
            ExitCode::from(EXIT_NOT_OPERATIONAL)
        }
        Err(e) => {
            error!("FATAL: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(args: &Args, ifname: &str, config: MasterConfig) -> Result<RunReport, Box<dyn std::error::Error>> {
    info!("EVO EtherCAT master v{} starting...", env!("CARGO_PKG_VERSION"));

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    let mut registry = TransportRegistry::new();
    register_all_transports(&mut registry);
    let driver = args.driver.as_deref().unwrap_or(&config.transport.driver);
    let bus = registry.create(driver, &config)?;
    info!("Transport: {} v{}", bus.name(), bus.version());

    let network = Arc::new(NetworkState::new());
    let supervisor = Supervisor::new(
        Arc::clone(&bus),
        Arc::clone(&network),
        config.supervisor.clone(),
        config.cycle.group,
    )
    .spawn(Arc::clone(&running))?;

    rt_setup(args.cpu_core, args.rt_priority)?;
    if is_realtime() {
        info!(
            "RT setup complete (cpu_core={}, priority={})",
            args.cpu_core, args.rt_priority
        );
    } else {
        info!("Running in standard (non-RT) mode");
    }

    let mut orchestrator = Orchestrator::new(bus, network, &config, running);
    let result = orchestrator.run(ifname);
    supervisor.stop();
    Ok(result?)
}

/// Load `--config` (or defaults) and apply CLI overrides.
fn load_config(args: &Args) -> Result<MasterConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_master_config(path)?,
        None => MasterConfig::default(),
    };
    if let Some(cycles) = args.cycles {
        config.cycle.cycle_count = cycles;
    }
    config.validate()?;
    Ok(config)
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.as_tracing_level()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
