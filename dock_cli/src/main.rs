mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use dock_config::{Catalog, Config, Logging};
use dock_core::DockError;
use dock_traits::{DockSwitches, Indicators, Valves};
use eyre::WrapErr;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    if !cli.json {
        color_eyre::install()?;
    }

    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;

    let catalog = match &cli.catalog {
        Some(path) => Some(dock_config::load_catalog_csv(path)?),
        None => None,
    };

    match cli.cmd {
        Commands::Run {
            seconds,
            heartbeat_ms,
        } => cmd_run(&cfg, catalog.as_ref(), seconds, heartbeat_ms, cli.json),
        Commands::SelfCheck => {
            let mut hw = open_hardware(&cfg)?;
            let report = run::self_check(&mut hw, cfg.station.port_count)?;
            if cli.json {
                println!("{report}");
            } else {
                println!(
                    "Self-check OK: docked={} ports={}",
                    report["docked"], cfg.station.port_count
                );
            }
            Ok(())
        }
        Commands::Health => {
            let hw = open_hardware(&cfg)?;
            let station = run::build_station(&cfg, catalog.as_ref(), hw.clone(), hw)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&station.supervisor.health())?
            );
            Ok(())
        }
        Commands::Queue => {
            let listing = run::queue_listing(&cfg)?;
            if cli.json {
                println!("{listing}");
            } else {
                println!("{} queued upload(s)", listing["len"]);
                for e in listing["entries"].as_array().into_iter().flatten() {
                    println!(
                        "  #{} {} account={} bytes={}",
                        e["id"], e["label"], e["account"], e["size"]
                    );
                }
            }
            Ok(())
        }
    }
}

fn cmd_run(
    cfg: &Config,
    catalog: Option<&Catalog>,
    seconds: Option<u64>,
    heartbeat_ms: u64,
    json: bool,
) -> eyre::Result<()> {
    if heartbeat_ms == 0 {
        return Err(DockError::Config("--heartbeat-ms must be >= 1".into()).into());
    }
    let hw = open_hardware(cfg)?;
    let station = run::build_station(cfg, catalog, hw.clone(), hw)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .wrap_err("install Ctrl-C handler")?;

    let summary = station.run(seconds, Duration::from_millis(heartbeat_ms), &shutdown)?;
    if json {
        println!("{}", summary.to_json());
    } else {
        println!(
            "Stopped after {} heartbeat(s); flash writes drained.",
            summary.heartbeats
        );
    }
    Ok(())
}

fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = dock_config::load_toml(&text)?;
    cfg.validate()
        .map_err(|e| DockError::Config(e.to_string()))?;
    Ok(cfg)
}

fn init_tracing(json: bool, level: &str, logging: &Logging) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| DockError::Config(format!("log level '{level}': {e}")))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(filter)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter)
                .boxed(),
        );
    }

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| DockError::Config(format!("logging.file '{file}' has no file name")))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
            .map_err(|e| DockError::Config(format!("logging.level: {e}")))?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_hardware(
    cfg: &Config,
) -> eyre::Result<impl DockSwitches + Valves + Indicators + Clone + Send + 'static> {
    use dock_hardware::SharedDock;
    use dock_hardware::gpio::{GpioDock, GpioPins};

    let required = |pin: Option<u8>, name: &str| {
        pin.ok_or_else(|| DockError::Config(format!("pins.{name} is required on hardware")))
    };
    let pins = GpioPins {
        dock_switch: required(cfg.pins.dock_switch, "dock_switch")?,
        card_presence: cfg.pins.card_presence.clone(),
        pressure_switch: cfg.pins.pressure_switch.clone(),
        pressure_good: cfg.pins.pressure_good.clone(),
        valves: cfg.pins.valves.clone(),
        led_red: required(cfg.pins.led_red, "led_red")?,
        led_green: required(cfg.pins.led_green, "led_green")?,
        led_yellow: required(cfg.pins.led_yellow, "led_yellow")?,
        buzzer: required(cfg.pins.buzzer, "buzzer")?,
    };
    let dock = GpioDock::new(&pins)
        .map_err(|e| dock_core::hw_error::map_hw_error(&e))?;
    tracing::info!(ports = cfg.station.port_count, "GPIO hardware opened");
    Ok(SharedDock::new(dock))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_hardware(
    cfg: &Config,
) -> eyre::Result<impl DockSwitches + Valves + Indicators + Clone + Send + 'static> {
    let sim = dock_hardware::SimulatedDock::new(cfg.station.port_count);
    // Lets integration tests start with an instrument in the cradle.
    if std::env::var_os("DOCKD_SIM_DOCKED").is_some() {
        sim.set_docked(true);
    }
    tracing::info!(ports = cfg.station.port_count, "using simulated hardware");
    Ok(sim)
}
