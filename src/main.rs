//! padforge - userspace Xbox gamepad driver
//!
//! Reads Xbox, Xbox 360 and Xbox 360 wireless pads over USB and exposes them
//! as remappable uinput devices, one slot per controller.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use padforge::config::AppConfig;
use padforge::daemon::Daemon;
use padforge::discovery::UdevDiscovery;
use padforge::output::evdev_backend::EvdevInput;
use padforge::output::{DeviceIdentities, MemoryInput, OutputActor, UInput, VirtualInput};
use padforge::slot::SlotArena;
use padforge::transport::{UsbControllerFactory, SUPPORTED_DEVICES};

const DEFAULT_CONFIG: &str = "padforge.yaml";

/// padforge - Xbox family gamepads as remappable virtual input devices
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Record output in memory instead of creating uinput devices
    #[arg(long)]
    no_uinput: bool,

    /// Print the supported devices and exit
    #[arg(long)]
    list_supported: bool,

    /// Print the compiled modifier chains and exit
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.log_json)?;

    if args.list_supported {
        for device in SUPPORTED_DEVICES {
            println!(
                "{:04x}:{:04x}  {:<16}  {}",
                device.vendor,
                device.product,
                device.family.to_string(),
                device.name
            );
        }
        return Ok(());
    }

    info!("Starting padforge {}...", env!("CARGO_PKG_VERSION"));
    let config = load_config(&args.config).await?;

    let backend: Box<dyn VirtualInput> = if args.no_uinput {
        info!("uinput disabled, output is recorded in memory");
        Box::new(MemoryInput::new().0)
    } else {
        Box::new(EvdevInput::new(config.daemon.force_feedback))
    };
    let mut uinput = UInput::new(backend, DeviceIdentities::new(), config.daemon.extra_devices);
    let slots = SlotArena::build(&config, &mut uinput).context("Failed to compile slots")?;

    if args.dump_config {
        dump_config(&slots);
        return Ok(());
    }

    uinput.finish().context("Failed to create virtual devices")?;
    let (output, output_task) = OutputActor::spawn(uinput);

    let cancel = CancellationToken::new();
    let events = UdevDiscovery::spawn(cancel.clone())?;

    let factory = UsbControllerFactory::new(config.daemon.detach_kernel_driver);
    let daemon = Daemon::new(&config, slots, Box::new(factory), output, cancel.clone());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    daemon.run(events).await?;

    if output_task.await.is_err() {
        warn!("output actor ended abnormally");
    }
    info!("padforge shutdown complete");
    Ok(())
}

async fn load_config(path: &str) -> Result<AppConfig> {
    if path == DEFAULT_CONFIG && !Path::new(path).exists() {
        info!("No {} found, using the default configuration", DEFAULT_CONFIG);
        return Ok(AppConfig::default());
    }
    let config = AppConfig::load(path).await?;
    info!("Configuration loaded from {}", path);
    Ok(config)
}

fn dump_config(slots: &SlotArena) {
    for slot in slots.iter() {
        println!("slot {} (led {})", slot.id(), slot.led_status());
        for (index, chain) in slot.config().lock().describe().into_iter().enumerate() {
            println!("  config {}", index);
            if chain.is_empty() {
                println!("    (no modifiers)");
            }
            for modifier in chain {
                println!("    {}", modifier);
            }
        }
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: {}", level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .init();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = ctrl_c.await;
            info!("Shutdown signal received");
            return;
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate.recv() => {},
    }
    info!("Shutdown signal received");
}
