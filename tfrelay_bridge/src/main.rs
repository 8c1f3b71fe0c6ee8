/// TFRELAY Bridge
///
/// Publishes configured static transforms on bus A, optionally turns pose
/// datagrams into transforms, and optionally relays transforms both ways
/// between bus A and bus B until interrupted.
///
/// Exit status: 0 after Ctrl+C, 1 on startup failure or when a bus host
/// requests shutdown.
use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tfrelay_core::communication::{BusConfig, BusPairConfig, TransformBus};
use tfrelay_core::relay::{BridgeController, InterruptHandle, InterruptReason, ShutdownHook};
use tfrelay_library::{PoseIngest, PoseMapper, StaticConfig, StaticPublisher};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_NAME: &str = "tfrelay";

/// Crates whose level follows the verbosity flags; everything else stays at warn
const OWN_TARGETS: [&str; 3] = ["tfrelay_core", "tfrelay_library", "tfrelay_bridge"];

#[derive(Parser, Debug)]
#[command(name = "tfrelay_bridge")]
#[command(about = "Relay coordinate-frame transforms between two pub/sub buses", long_about = None)]
#[command(group(ArgGroup::new("verbosity").args(["quiet", "debug", "trace", "info"])))]
struct Args {
    /// Static transform / message mapping / bus config file (TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Instance name, used as bus A authority when the config has no buses
    #[arg(long, default_value = DEFAULT_NAME)]
    name: String,

    /// Relay transforms between bus A and bus B
    #[arg(long)]
    bridge: bool,

    /// Listen for pose datagrams on this address
    #[arg(long)]
    pose_listen: Option<SocketAddr>,

    /// Only log errors
    #[arg(long)]
    quiet: bool,

    /// Debug logging
    #[arg(long)]
    debug: bool,

    /// Trace logging
    #[arg(long)]
    trace: bool,

    /// Info logging
    #[arg(long)]
    info: bool,
}

impl Args {
    /// Filter directives for the verbosity flags
    fn log_directives(&self) -> String {
        let level = match (self.quiet, self.trace, self.debug, self.info) {
            (true, ..) => return "error".to_string(),
            (_, true, ..) => "trace",
            (_, _, true, _) => "debug",
            (.., true) => "info",
            _ => return "warn".to_string(),
        };

        let mut directives = vec!["warn".to_string()];
        directives.extend(OWN_TARGETS.iter().map(|t| format!("{}={}", t, level)));
        directives.join(",")
    }
}

/// Buses used when the config file does not describe any
fn default_buses(name: &str) -> BusPairConfig {
    BusPairConfig {
        a: BusConfig::local(name, "a"),
        b: BusConfig::local(&format!("{}-b", name), "b"),
    }
}

fn init_logging(args: &Args) {
    // RUST_LOG wins over the verbosity flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_directives()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<i32> {
    let config = match &args.config {
        Some(path) => StaticConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StaticConfig::default(),
    };
    let buses = config.buses.clone().unwrap_or_else(|| {
        debug!("no buses configured, using local segments");
        default_buses(&args.name)
    });
    if config.buses.is_some() && args.name != DEFAULT_NAME {
        warn!(
            "--name is ignored, bus A authority comes from the config file ('{}')",
            buses.a.authority
        );
    }

    let bus_a = buses.a.build().context("failed to open bus A")?;

    if args.config.is_some() {
        StaticPublisher::new(Arc::clone(&bus_a))
            .publish(&config.transforms)
            .context("failed to publish static transforms")?;
    }

    let ingest = match args.pose_listen {
        Some(addr) => Some(
            PoseIngest::spawn(addr, PoseMapper::new(config.mappings.clone()), Arc::clone(&bus_a))
                .context("failed to start pose ingest")?,
        ),
        None => None,
    };

    if args.bridge {
        let bus_b = buses.b.build().context("failed to open bus B")?;
        run_bridge(bus_a, bus_b, &config, ingest)
    } else {
        run_until_interrupted(bus_a, ingest)
    }
}

/// Block until `interrupt` is raised, then stop pose ingest
///
/// Callers shut buses down only after this returns, so the listener never
/// publishes onto a closed bus.
fn await_interrupt(interrupt: &InterruptHandle, ingest: Option<PoseIngest>) -> InterruptReason {
    let reason = interrupt.wait();
    if let Some(ingest) = ingest {
        ingest.stop();
    }
    reason
}

fn run_bridge(
    bus_a: Arc<dyn TransformBus>,
    bus_b: Arc<dyn TransformBus>,
    config: &StaticConfig,
    ingest: Option<PoseIngest>,
) -> Result<i32> {
    let mut bridge = BridgeController::new(bus_a, bus_b, config.bridge_or_default())
        .context("invalid bridge configuration")?;
    let hook = ShutdownHook::install(bridge.interrupt_handle())?;
    bridge.start().context("failed to start bridge")?;

    await_interrupt(&bridge.interrupt_handle(), ingest);
    hook.disarm();
    let outcome = bridge.join()?;

    info!(
        "bridge stopped ({}); a->b: {:?}; b->a: {:?}",
        outcome.reason, outcome.a_to_b, outcome.b_to_a
    );
    Ok(outcome.exit_code())
}

fn run_until_interrupted(
    bus_a: Arc<dyn TransformBus>,
    ingest: Option<PoseIngest>,
) -> Result<i32> {
    let interrupt = InterruptHandle::new();
    let hook = ShutdownHook::install(interrupt.clone())?;
    {
        let interrupt = interrupt.clone();
        let authority = bus_a.authority_name().to_string();
        bus_a.on_host_shutdown(Arc::new(move || {
            interrupt.interrupt(InterruptReason::External(authority.clone()));
        }));
    }

    let reason = await_interrupt(&interrupt, ingest);
    hook.disarm();
    bus_a.shutdown()?;
    info!("stopped ({})", reason);
    Ok(reason.exit_code())
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error:\n  {:#}\n", e);
            1
        }
    };
    std::process::exit(code);
}
