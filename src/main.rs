use anyhow::Result;
use clap::Parser;
use screentouch::ScreentouchConfig;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "screentouch")]
#[command(about = "Turns a multi-touch screen into a pointer device")]
#[command(version)]
#[command(long_about = "Reads raw multi-touch input from a Linux touchscreen, tracks and debounces \
contacts, classifies taps, drags and multi-finger gestures, and replays them as clicks, \
pointer motion and scrolling through a virtual uinput pointer device.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "screentouch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without opening any device")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// List detected multi-touch devices and exit
    #[arg(long, help = "List multi-touch devices under /dev/input and exit")]
    list_devices: bool,

    /// Dry run mode - open the touch device but create no pointer device
    #[arg(long, help = "Open and validate the touch device, then exit")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Append log output to a file")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    if args.list_devices {
        list_devices();
        return Ok(());
    }

    info!("Starting Screentouch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ScreentouchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    if args.dry_run {
        dry_run(&config)?;
        return Ok(());
    }

    let exit_code = run_daemon(config, PathBuf::from(&args.config)).await?;
    info!("Screentouch exited with code: {}", exit_code);

    // Exit with appropriate code for systemd
    std::process::exit(exit_code);
}

#[cfg(all(feature = "device", target_os = "linux"))]
async fn run_daemon(config: ScreentouchConfig, config_path: PathBuf) -> Result<i32> {
    let mut daemon = screentouch::ScreentouchDaemon::open(config, Some(config_path))
        .map_err(|e| {
            error!("Failed to start: {}", screentouch::ErrorExt::user_message(&e));
            e
        })?;

    let exit_code = daemon.run().await.map_err(|e| {
        error!("Runtime error: {}", e);
        e
    })?;
    Ok(exit_code)
}

#[cfg(not(all(feature = "device", target_os = "linux")))]
async fn run_daemon(_config: ScreentouchConfig, _config_path: PathBuf) -> Result<i32> {
    error!("Built without touch device support");
    Err(screentouch::DeviceError::NotAvailable.into())
}

#[cfg(all(feature = "device", target_os = "linux"))]
fn dry_run(config: &ScreentouchConfig) -> Result<()> {
    use screentouch::{build_transform, TouchDevice};

    let device = TouchDevice::open_configured(&config.device.path, false, std::time::Instant::now())?;
    let transform = build_transform(&config.calibration, device.bounds())?;

    info!("Dry run - no pointer device created");
    println!("✓ Touch device: {} ({})", device.path(), device.name());
    println!("  slots: {}", device.slot_count());
    println!("  device range: {:?}", transform.device_bounds());
    println!("  display range: {:?}", transform.display_bounds());
    println!("  coefficients: {:?}", transform.coefficients());
    Ok(())
}

#[cfg(not(all(feature = "device", target_os = "linux")))]
fn dry_run(_config: &ScreentouchConfig) -> Result<()> {
    Err(screentouch::DeviceError::NotAvailable.into())
}

#[cfg(all(feature = "device", target_os = "linux"))]
fn list_devices() {
    let devices = screentouch::discover_touch_devices();
    if devices.is_empty() {
        println!("No multi-touch devices found");
    }
    for path in devices {
        println!("{}", path);
    }
}

#[cfg(not(all(feature = "device", target_os = "linux")))]
fn list_devices() {
    println!("Built without touch device support");
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("screentouch={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(log_file_appender(path)?);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

fn log_file_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", path.display()))?;
    Ok(tracing_appender::rolling::never(directory, file_name))
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Screentouch Configuration File");
    println!("# This is the default configuration with all available options");
    println!("#");
    println!("# [calibration] accepts optional keys:");
    println!("#   display_resolution = [800, 480]");
    println!("#   rotation = \"Rotate90\"");
    println!("#   coefficients = [a, b, c, d, e, f]");
    println!();

    let rendered = toml::to_string_pretty(&ScreentouchConfig::default())?;
    println!("{}", rendered);
    Ok(())
}
