//! `snort-bridge-demo` — a thin demonstration binary over the `snort_bridge`
//! library.
//!
//! The control-plane API (creating instances, binding interfaces, listing
//! clients) is out of scope for the crate proper (§1); this binary is the
//! "thin parser over setters" that §1 describes, existing only to exercise
//! `Bridge`/`CryptoEngine` end-to-end from a terminal for manual testing.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use snort_bridge::bridge::{self, AttachDirection, BidirectionalPolicy};
use snort_bridge::{Bridge, Config, CryptoEngine};

#[derive(Parser)]
#[command(name = "snort-bridge-demo")]
#[command(version)]
#[command(about = "Demonstration CLI for the IDS bridge and async crypto offload engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration (compiled-in defaults overridden
    /// by `SNORT_BRIDGE_*` environment variables).
    Config,
    /// Create an instance, attach it to an interface, and report its
    /// shared-memory/eventfd handoff shape, then tear it down.
    ///
    /// This does not run a real client or worker loop; it only exercises
    /// the control surface (§6.3) and prints what a real client would
    /// receive over the control socket.
    Demo {
        /// Name for the instance.
        #[arg(long, default_value = "ids0")]
        name: String,
        /// `log2` of the ring size (number of descriptor slots = 2^n).
        #[arg(long)]
        log2_queue_size: Option<u8>,
        /// Forward in-flight packets instead of dropping them on client
        /// disconnect.
        #[arg(long)]
        keep_on_disconnect: bool,
        /// Interface id to attach the instance to.
        #[arg(long, default_value_t = 1)]
        if_id: u32,
        /// Name of the crypto engine to register alongside the bridge
        /// (`qat` or `dasync`).
        #[arg(long)]
        engine: Option<String>,
    },
    /// Create one instance and listen on the control socket for a real
    /// inspector client to `HELLO` it, until interrupted.
    Serve {
        /// Name for the instance a client can `HELLO`.
        #[arg(long, default_value = "ids0")]
        name: String,
        /// `log2` of the ring size (number of descriptor slots = 2^n).
        #[arg(long)]
        log2_queue_size: Option<u8>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Demo { name, log2_queue_size, keep_on_disconnect, if_id, engine } => {
            run_demo(&config, &name, log2_queue_size, keep_on_disconnect, if_id, engine.as_deref())?;
        }
        Commands::Serve { name, log2_queue_size } => {
            let rt = tokio::runtime::Runtime::new().context("building async runtime")?;
            rt.block_on(run_serve(&config, &name, log2_queue_size))?;
        }
    }

    Ok(())
}

async fn run_serve(config: &Config, name: &str, log2_queue_size: Option<u8>) -> Result<()> {
    let log2_queue_size = log2_queue_size.unwrap_or(config.log2_queue_size);

    let mut server_bridge = Bridge::new(config.num_workers, BidirectionalPolicy::TraverseOnce);
    server_bridge
        .instance_create(name, log2_queue_size, true)
        .with_context(|| format!("creating instance '{name}'"))?;
    log::info!("created instance '{name}' with {} ring slot(s)", 1u32 << u32::from(log2_queue_size));

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let control_loop = tokio::spawn(bridge::run_control_loop(server_bridge, control_rx));

    log::info!("control socket will listen on {}; press ctrl-c to stop", config.socket_path);
    tokio::select! {
        result = bridge::accept_loop(&config.socket_path, control_tx) => {
            result.context("control socket accept loop")?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("ctrl-c received, shutting down");
        }
    }

    control_loop.abort();
    Ok(())
}

fn run_demo(
    config: &Config,
    name: &str,
    log2_queue_size: Option<u8>,
    keep_on_disconnect: bool,
    if_id: u32,
    engine: Option<&str>,
) -> Result<()> {
    let log2_queue_size = log2_queue_size.unwrap_or(config.log2_queue_size);

    let mut bridge = Bridge::new(config.num_workers, BidirectionalPolicy::TraverseOnce);
    let mut crypto_engine = CryptoEngine::new(config.num_workers);

    let engine_name = engine.unwrap_or(&config.engine);
    crypto_engine
        .register_engine(engine_name)
        .with_context(|| format!("registering crypto engine '{engine_name}'"))?;
    log::info!("registered crypto engine '{engine_name}' for {} worker(s)", config.num_workers);

    let instance_id = bridge
        .instance_create(name, log2_queue_size, !keep_on_disconnect)
        .with_context(|| format!("creating instance '{name}'"))?;
    log::info!("created instance '{name}' (id={instance_id}) with {} ring slot(s)", 1u32 << u32::from(log2_queue_size));

    bridge
        .interface_attach(name, if_id, AttachDirection::InOut)
        .with_context(|| format!("attaching instance '{name}' to interface {if_id}"))?;
    log::info!("attached instance '{name}' to interface {if_id} (inout)");

    let instance = bridge.instance_by_name(name).expect("just created");
    println!("instance '{name}' (id={instance_id}) created, no client connected yet.");
    println!("a client connecting to {} would HELLO{{{name}}} and receive:", config.socket_path);
    println!("  {} worker qpair(s), log2_queue_size={log2_queue_size}", config.num_workers);
    println!("  stats: {:?}", instance.stats.snapshot());

    bridge.instance_disconnect(instance_id, |buf, next| {
        log::debug!("would forward buffer {buf} to successor {next} (no client was ever attached)");
    })?;
    bridge.interface_detach_all(if_id);
    bridge.instance_delete(instance_id)?;
    log::info!("instance '{name}' torn down");

    Ok(())
}
