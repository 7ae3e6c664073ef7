//! Fixture controller daemon
//!
//! Loads the daemon configuration and hardware profile, then runs the scan
//! loop against a serial port (or stdin/stdout with `--stdio`) until Ctrl+C
//! or SIGTERM.
//!
//! With `--mock` every pin, the PWM channel and the LED board port expander
//! are simulated, so the full command surface can be exercised on a
//! development machine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fixture_core::{default_config_path, DaemonConfig};
use fixture_hardware::sim::{SimExpander, SimPinBank, SimPwm};
use fixture_hardware::sysfs::{self, SysfsGpio, SysfsPwm};
use fixture_hardware::{BoxedPwm, Cat9555, LedBoard, PinProvider, PortExpander, SerialDriver};
use fixtured::{
    shutdown, BreathingTask, DeviceRegistry, FixtureController, FixtureParamsStore, ScanLoop,
    Sequencer,
};
use tokio::fs;
use tracing::{info, warn};

/// Pneumatic fixture controller
#[derive(Parser, Debug)]
#[command(name = "fixtured")]
#[command(version, about = "Pneumatic test fixture controller", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Simulate pins, PWM and the LED board port expander
    #[arg(long)]
    mock: bool,

    /// Serial device path (e.g., /dev/ttyAMA0, /dev/ttyUSB0)
    ///
    /// Overrides `serial.port` from the config file.
    #[arg(long)]
    device: Option<String>,

    /// Hardware profile (JSON) describing devices and bindings
    #[arg(long)]
    hw_profile: Option<PathBuf>,

    /// Read commands from stdin and reply on stdout
    #[arg(long)]
    stdio: bool,
}

/// Pin, PWM and port expander implementations the daemon runs on
struct Backend {
    pins: Box<dyn PinProvider>,
    pwm: Option<BoxedPwm>,
    expander: Option<Box<dyn PortExpander>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    info!("Fixture controller starting...");

    // Determine config path: CLI flag > env var > default
    let config_path = args.config.unwrap_or_else(|| {
        std::env::var("FIXTURED_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path())
    });
    info!("Configuration file: {}", config_path.display());

    let mut config = load_daemon_config(&config_path).await?;
    if let Some(device) = args.device {
        config.serial.port = device;
    }
    if let Some(profile) = args.hw_profile {
        config.hw_profile = Some(profile);
    }
    info!("  Hardware profile: {}", config.hw_profile_path().display());
    info!("  Fixture parameters: {}", config.fixture_params_path().display());

    let backend = if args.mock {
        info!("Mock mode: simulated pins, PWM and port expander");
        mock_backend(&config)?
    } else {
        sysfs_backend(&config)
    };

    // Step 1: Build the device graph
    let mut registry = DeviceRegistry::new(backend.pins);
    let profile_path = config.hw_profile_path();
    let report = registry
        .load_config(&profile_path)
        .await
        .with_context(|| format!("Failed to load hardware profile {}", profile_path.display()))?;
    if report.bindings_skipped > 0 {
        warn!(
            "{} binding(s) skipped, see warnings above",
            report.bindings_skipped
        );
    }

    // Step 2: Controller context
    let params = FixtureParamsStore::load(&config.fixture_params_path()).await;
    let led_board = init_led_board(&config, backend.expander);
    let sequencer = Sequencer::new(config.layout.clone(), &config.sequencer);
    let mut controller =
        FixtureController::new(registry.into_graph(), sequencer, params, led_board);

    // Step 3: Background breathing LED
    let breathing = match backend.pwm {
        Some(pwm) if config.breathing.enabled => Some(BreathingTask::spawn(pwm, &config.breathing)),
        _ => {
            info!("Breathing LED disabled");
            None
        }
    };

    // Step 4: Command link
    let mut link = if args.stdio {
        info!("Command channel: stdin/stdout");
        SerialDriver::stdio(config.serial.debug_uart)
    } else {
        info!(
            "Command channel: {} at {} baud",
            config.serial.port, config.serial.baud_rate
        );
        SerialDriver::open(
            &config.serial.port,
            config.serial.baud_rate,
            config.serial.debug_uart,
        )
        .with_context(|| {
            format!(
                "Failed to open {}. Use --stdio to run without a serial port.",
                config.serial.port
            )
        })?
    };

    info!("Fixture controller ready!");

    let mut scan = ScanLoop::new(Duration::from_millis(config.scan.period_ms.max(1)));
    scan.run(&mut controller, &mut link, shutdown::shutdown_signal())
        .await;

    shutdown::finalize(&config.shutdown, &mut controller, breathing);
    Ok(())
}

/// Load the daemon config from TOML, creating it with defaults if missing.
async fn load_daemon_config(path: &Path) -> Result<DaemonConfig> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        info!(
            "Config not found at {}. Creating with defaults.",
            path.display()
        );

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory '{}'", parent.display()))?;
        }

        let config = DaemonConfig::default();
        let toml_str = config.to_toml().context("Failed to serialize config")?;
        fs::write(path, &toml_str)
            .await
            .context("Failed to write config file")?;
        return Ok(config);
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    DaemonConfig::from_toml(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

fn mock_backend(config: &DaemonConfig) -> Result<Backend> {
    let address = config.led_board.address;
    let expander = Cat9555::new(SimExpander::with_address(address), address)
        .context("Invalid LED board address")?;
    Ok(Backend {
        pins: Box::new(SimPinBank::new()),
        pwm: Some(Box::new(SimPwm::new())),
        expander: Some(Box::new(expander)),
    })
}

fn sysfs_backend(config: &DaemonConfig) -> Backend {
    let pwm: Option<BoxedPwm> = if config.breathing.enabled {
        match SysfsPwm::open(0, config.breathing.pwm_channel, config.breathing.frequency_hz) {
            Ok(pwm) => Some(Box::new(pwm)),
            Err(e) => {
                warn!("PWM channel {} unavailable: {}", config.breathing.pwm_channel, e);
                None
            }
        }
    } else {
        None
    };

    let expander: Option<Box<dyn PortExpander>> = if config.led_board.enabled {
        match sysfs::open_expander(&config.led_board.bus, config.led_board.address) {
            Ok(expander) => Some(Box::new(expander)),
            Err(e) => {
                warn!("LED board expander unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    Backend {
        pins: Box::new(SysfsGpio::default()),
        pwm,
        expander,
    }
}

fn init_led_board(
    config: &DaemonConfig,
    expander: Option<Box<dyn PortExpander>>,
) -> Option<LedBoard> {
    if !config.led_board.enabled {
        info!("LED board disabled in config");
        return None;
    }

    let Some(expander) = expander else {
        warn!(
            "No port expander at 0x{:02x} on {}, LED board commands will fail",
            config.led_board.address, config.led_board.bus
        );
        return None;
    };

    match LedBoard::init(expander) {
        Ok(board) => {
            info!(
                "LED board ready at 0x{:02x} on {}",
                config.led_board.address, config.led_board.bus
            );
            Some(board)
        }
        Err(e) => {
            warn!("LED board init failed: {}", e);
            None
        }
    }
}

/// Initialize tracing subscriber for logging
///
/// Logs go to stderr so stdout stays free for `--stdio`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
