//! Valvelink CLI - Command-line interface
//!
//! Drives the valve rig from a terminal or a script.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};
use valvelink_core::cli::{format_line, CliResult, OutputFormat};
use valvelink_core::config::{self, AppConfig};
use valvelink_core::{
    list_ports, Command, DeviceProvider, SerialConfig, SerialDeviceProvider, SerialManager,
    SimulatedRig, SimulatorConfig, ThrottleSender,
};

/// Valvelink CLI
#[derive(Parser, Debug)]
#[command(
    name = "valvelink",
    version,
    about = "Serial control for a three-valve rig",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "VALVELINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Serial port name (e.g., COM3, /dev/ttyACM0); overrides config
    #[arg(short, long, env = "VALVELINK_PORT", global = true)]
    port: Option<String>,

    /// Baud rate; overrides config
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Talk to the built-in simulated rig instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Connect and print everything the rig sends; stdin lines are forwarded
    Monitor {
        /// Prefix lines with the local receive time
        #[arg(short, long)]
        timestamps: bool,

        /// Exit after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Move a valve
    Valve {
        /// Valve index (0-2)
        valve: u8,
        /// Angle in degrees
        #[arg(allow_hyphen_values = true)]
        angle: i16,
        /// Time to keep printing replies (ms)
        #[arg(long, default_value = "200")]
        wait: u64,
    },

    /// Set a valve calibration offset
    Calibrate {
        /// Valve index (0-2)
        valve: u8,
        /// Angle in degrees (-90 to 90)
        #[arg(allow_hyphen_values = true)]
        angle: i16,
        /// Time to keep printing replies (ms)
        #[arg(long, default_value = "200")]
        wait: u64,
    },

    /// Set pump throttle
    Pump {
        /// Throttle percentage (0-100)
        percent: u8,
    },

    /// Show or write configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show exit codes
    ExitCodes,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write the effective configuration to the file
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let app_config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => return report(&CliResult::from(&e), cli.quiet),
    };

    let _log_guard = match init_tracing(&cli, &app_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            None
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => return report(&CliResult::from(&anyhow::Error::new(e)), cli.quiet),
    };

    let result = match runtime.block_on(run(&cli, app_config)) {
        Ok(result) => result,
        Err(e) => CliResult::from(&e),
    };
    report(&result, cli.quiet)
}

fn report(result: &CliResult, quiet: bool) -> ExitCode {
    match (result.is_success(), result.message()) {
        (true, Some(msg)) if !quiet => println!("{msg}"),
        (false, Some(msg)) => eprintln!("Error: {msg}"),
        _ => {}
    }
    result.to_exit_code()
}

fn load_config(cli: &Cli) -> Result<AppConfig, config::ConfigError> {
    let mut app_config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(port) = &cli.port {
        app_config.serial.port = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        app_config.serial.baud_rate = baud;
    }
    app_config.validate()?;
    Ok(app_config)
}

fn init_tracing(
    cli: &Cli,
    app_config: &AppConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        app_config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Invalid log filter")?;

    let mut layers = Vec::new();
    if app_config.logging.json {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    let mut guard = None;
    if let Some(dir) = &app_config.logging.directory {
        let appender = tracing_appender::rolling::daily(dir, "valvelink.log");
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .context("Failed to initialize tracing")?;
    Ok(guard)
}

async fn run(cli: &Cli, app_config: AppConfig) -> anyhow::Result<CliResult> {
    match &cli.command {
        Commands::ListPorts => show_ports(cli),
        Commands::Monitor {
            timestamps,
            duration,
        } => monitor(cli, &app_config, *timestamps, *duration).await,
        Commands::Valve { valve, angle, wait } => {
            let command = Command::set_valve(*valve, *angle)?;
            one_shot(cli, &app_config, &command, Duration::from_millis(*wait)).await
        }
        Commands::Calibrate { valve, angle, wait } => {
            let command = Command::calibrate(*valve, *angle)?;
            one_shot(cli, &app_config, &command, Duration::from_millis(*wait)).await
        }
        Commands::Pump { percent } => pump(cli, &app_config, *percent).await,
        Commands::Config { action } => handle_config(cli, &app_config, action),
        Commands::ExitCodes => {
            valvelink_core::cli::print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

fn show_ports(cli: &Cli) -> anyhow::Result<CliResult> {
    let ports = list_ports()?;

    if cli.format == OutputFormat::Json {
        return Ok(CliResult::success_with_message(serde_json::to_string_pretty(
            &ports,
        )?));
    }
    if ports.is_empty() {
        return Ok(CliResult::success_with_message("No serial ports found."));
    }

    let lines: Vec<String> = ports
        .iter()
        .map(|p| {
            let marker = if p.usb { "*" } else { " " };
            format!("{marker} {:<20} {}", p.name, p.kind)
        })
        .collect();
    Ok(CliResult::success_with_message(lines.join("\n")))
}

fn provider(cli: &Cli, app_config: &AppConfig) -> Arc<dyn DeviceProvider> {
    if cli.simulate {
        info!("Using simulated rig");
        Arc::new(SimulatedRig::new(
            SimulatorConfig::default().boot_banner(&["valve rig simulator ready"]),
        ))
    } else {
        Arc::new(SerialDeviceProvider::new(SerialConfig {
            port: app_config.serial.port.clone(),
            baud_rate: app_config.serial.baud_rate,
        }))
    }
}

async fn open_manager(
    cli: &Cli,
    app_config: &AppConfig,
    timestamps: bool,
) -> anyhow::Result<Arc<SerialManager>> {
    let manager = Arc::new(SerialManager::with_provider(
        provider(cli, app_config),
        app_config.manager_config(),
    ));

    let format = cli.format;
    manager.on_receive(move |line| {
        let ts = timestamps.then(chrono::Local::now);
        println!("{}", format_line(line, format, ts));
    });

    manager.connect().await?;
    if !cli.quiet {
        eprintln!(
            "Connected to {}",
            manager.device_info().unwrap_or_else(|| "device".to_string())
        );
    }
    Ok(manager)
}

async fn monitor(
    cli: &Cli,
    app_config: &AppConfig,
    timestamps: bool,
    duration: Option<u64>,
) -> anyhow::Result<CliResult> {
    let link_lost = Arc::new(Notify::new());
    let manager = open_manager(cli, app_config, timestamps).await?;
    {
        let link_lost = link_lost.clone();
        manager.on_connection_change(move |connected| {
            if !connected {
                link_lost.notify_one();
            }
        });
    }

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break CliResult::cancelled();
            }
            () = &mut deadline => break CliResult::success(),
            () = link_lost.notified() => {
                warn!("Device disconnected");
                break CliResult::error(
                    valvelink_core::ExitCodes::CONNECTION_FAILED,
                    "Device disconnected",
                );
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Err(e) = manager.send(line).await {
                        warn!(error = %e, "Send failed");
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
        }
    };

    manager.disconnect().await;
    Ok(result)
}

async fn one_shot(
    cli: &Cli,
    app_config: &AppConfig,
    command: &Command,
    wait: Duration,
) -> anyhow::Result<CliResult> {
    let manager = open_manager(cli, app_config, false).await?;
    let sent = manager.send_command(command).await;
    if sent.is_ok() {
        tokio::time::sleep(wait).await;
    }
    manager.disconnect().await;
    sent?;
    Ok(CliResult::success())
}

async fn pump(cli: &Cli, app_config: &AppConfig, percent: u8) -> anyhow::Result<CliResult> {
    let manager = open_manager(cli, app_config, false).await?;
    let throttle = ThrottleSender::new(manager.clone(), app_config.throttle.debounce);
    throttle.set(percent)?;

    let window = app_config.throttle.debounce * 2 + Duration::from_millis(100);
    let sent = tokio::time::timeout(window, async {
        while throttle.last_sent() != Some(percent) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok();

    drop(throttle);
    manager.disconnect().await;

    if sent {
        Ok(CliResult::success())
    } else {
        Ok(CliResult::error(
            valvelink_core::ExitCodes::WRITE_FAILED,
            "Throttle value was not sent",
        ))
    }
}

fn handle_config(
    cli: &Cli,
    app_config: &AppConfig,
    action: &ConfigAction,
) -> anyhow::Result<CliResult> {
    match action {
        ConfigAction::Show => {
            let text = if cli.format == OutputFormat::Json {
                serde_json::to_string_pretty(app_config)?
            } else {
                toml::to_string_pretty(app_config)?
            };
            Ok(CliResult::success_with_message(text))
        }
        ConfigAction::Path => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => config::config_path().ok_or(config::ConfigError::NoConfigDir)?,
            };
            Ok(CliResult::success_with_message(path.display().to_string()))
        }
        ConfigAction::Init => {
            let path = match &cli.config {
                Some(path) => {
                    app_config.save_to(path)?;
                    path.clone()
                }
                None => app_config.save()?,
            };
            Ok(CliResult::success_with_message(format!(
                "Wrote {}",
                path.display()
            )))
        }
    }
}
