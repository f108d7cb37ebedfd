//! bootlink CLI - talk to a serial bootloader from the command line.
//!
//! ## Features
//!
//! - Connect, disconnect, erase, read and reboot commands
//! - Device info query
//! - Firmware upload, automatic or one chunk per key press
//! - Offline image inspection and frame encoding
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use anyhow::Result;
use bootlink::{EventSink, NativePort, SerialConfig, Session};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

mod commands;
mod config;
mod output;
mod serial;

use config::Config;
use serial::{SerialOptions, select_serial_port};

/// Default baud rate when neither flag, environment nor config sets one.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// bootlink - host tool for a framed serial bootloader.
///
/// Environment variables:
///   BOOTLINK_PORT              - Default serial port
///   BOOTLINK_BAUD              - Default baud rate (default: 115200)
///   BOOTLINK_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "bootlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "BOOTLINK_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "BOOTLINK_BAUD")]
    baud: Option<u32>,

    /// Reply deadline in milliseconds [default: 1000].
    #[arg(long, global = true, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Use the early frame revision (no length byte).
    #[arg(long, global = true)]
    legacy_frame: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "BOOTLINK_NON_INTERACTIVE")]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Open a bootloader session.
    Connect,

    /// End the bootloader session.
    Disconnect,

    /// Restart the device.
    Reboot,

    /// Erase the application firmware.
    Erase,

    /// Ask the device to read back its firmware.
    Read,

    /// Query bootloader, firmware and product versions.
    Info {
        /// Output the fields as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Upload a firmware image.
    Flash {
        /// Path to the raw firmware binary.
        firmware: PathBuf,

        /// Send one chunk per key press (Enter: next, q/Esc: abort).
        #[arg(long)]
        step: bool,

        /// Do not send Connect before the upload.
        #[arg(long)]
        no_connect: bool,
    },

    /// Show size, chunking and checksum of a firmware image.
    Image {
        /// Path to the raw firmware binary.
        firmware: PathBuf,

        /// Print the image as hex, 16 bytes per line, to stdout.
        #[arg(long)]
        dump: bool,

        /// Output the summary as JSON to stdout.
        #[arg(long, conflicts_with = "dump")]
        json: bool,
    },

    /// Print the frame for a command without sending it.
    Encode {
        /// Command name, e.g. `connect` or `write_firmware`.
        command: String,

        /// Payload bytes as hex, e.g. `DEADBEEF` or `de ad be ef`.
        #[arg(long)]
        payload: Option<String>,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Failures with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad invocation or environment (exit 2).
    #[error("{0}")]
    Usage(String),
    /// Invalid configuration value (exit 3).
    #[error("{0}")]
    Config(String),
    /// The device refused, did not answer, or the port failed (exit 4).
    #[error("{0}")]
    Device(String),
    /// Stopped by the operator (exit 130).
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    /// Process exit code for this class of failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Config(_) => 3,
            Self::Device(_) => 4,
            Self::Cancelled(_) => 130,
        }
    }
}

/// Exit code for any error; unclassified failures exit with 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>()
        .map_or(1, CliError::exit_code)
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&err))
        },
    }
}

fn run() -> Result<()> {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "bootlink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Connect => commands::device::cmd_connect(&cli, &config),
        Commands::Disconnect => commands::device::cmd_disconnect(&cli, &config),
        Commands::Reboot => commands::device::cmd_reboot(&cli, &config),
        Commands::Erase => commands::device::cmd_erase(&cli, &config),
        Commands::Read => commands::device::cmd_read(&cli, &config),
        Commands::Info { json } => commands::device::cmd_info(&cli, &config, *json),
        Commands::Flash {
            firmware,
            step,
            no_connect,
        } => commands::flash::cmd_flash(&cli, &config, firmware, *step, !*no_connect),
        Commands::Image {
            firmware,
            dump,
            json,
        } => commands::image::cmd_image(&cli, &config, firmware, *dump, *json),
        Commands::Encode { command, payload } => {
            commands::encode::cmd_encode(&cli, &config, command, payload.as_deref())
        },
        Commands::ListPorts { json } => {
            commands::ports::cmd_list_ports(&config, *json);
            Ok(())
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Serial settings after merging flags, environment and config.
fn serial_settings(cli: &Cli, config: &Config, port_name: String) -> SerialConfig {
    let baud = cli
        .baud
        .or(config.port.connection.baud)
        .unwrap_or(DEFAULT_BAUD);
    let mut settings = SerialConfig::new(port_name, baud);
    if let Some(ms) = cli.timeout_ms.or(config.port.connection.timeout_ms) {
        settings = settings.with_timeout(Duration::from_millis(ms));
    }
    settings
}

/// Select and open the port and wrap it in a session configured from
/// `config`.
fn open_session<S: EventSink>(
    cli: &Cli,
    config: &Config,
    sink: S,
) -> Result<Session<NativePort, S>> {
    let commands = config.command_table()?;
    let layout = config.frame_layout(cli.legacy_frame);

    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };
    let selected = select_serial_port(&options, config)?;
    debug!(
        "Selected {} (configured adapter: {})",
        selected.port.name, selected.is_known
    );
    let settings = serial_settings(cli, config, selected.port.name);

    if !cli.quiet {
        eprintln!(
            "{} Using {} at {} baud",
            style("🔌").cyan(),
            style(&settings.port_name).green(),
            settings.baud_rate
        );
    }

    let port = NativePort::open(&settings).map_err(|e| {
        CliError::Device(format!("Failed to open {}: {e}", settings.port_name))
    })?;

    Ok(Session::new(port)
        .with_layout(layout)
        .with_commands(commands)
        .with_sink(sink))
}

/// Map a library error raised while talking to the device.
fn device_err(err: bootlink::Error) -> anyhow::Error {
    match err {
        bootlink::Error::Config(msg) => CliError::Config(msg).into(),
        other @ (bootlink::Error::PayloadTooLarge { .. }
        | bootlink::Error::NoImageLoaded
        | bootlink::Error::ImageTooLarge(_)) => CliError::Usage(other.to_string()).into(),
        other => CliError::Device(other.to_string()).into(),
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["bootlink", "list-ports"]).unwrap();
        assert!(cli.baud.is_none());
        assert!(cli.timeout_ms.is_none());
        assert!(!cli.legacy_frame);
        assert!(!cli.quiet);
        assert!(cli.config_path.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "bootlink",
            "--port",
            "COM3",
            "--baud",
            "57600",
            "--timeout-ms",
            "250",
            "--legacy-frame",
            "-vv",
            "--quiet",
            "--non-interactive",
            "--config",
            "/tmp/bootlink.toml",
            "connect",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("COM3"));
        assert_eq!(cli.baud, Some(57600));
        assert_eq!(cli.timeout_ms, Some(250));
        assert!(cli.legacy_frame);
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert!(cli.non_interactive);
        assert!(matches!(cli.command, Commands::Connect));
    }

    #[test]
    fn test_cli_parse_device_commands() {
        for name in ["connect", "disconnect", "reboot", "erase", "read", "info"] {
            assert!(
                Cli::try_parse_from(["bootlink", name]).is_ok(),
                "{name} did not parse"
            );
        }
    }

    #[test]
    fn test_cli_parse_info_json() {
        let cli = Cli::try_parse_from(["bootlink", "info", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Info { json: true }));
    }

    #[test]
    fn test_cli_parse_flash() {
        let cli = Cli::try_parse_from(["bootlink", "flash", "app.bin", "--step"]).unwrap();
        if let Commands::Flash {
            firmware,
            step,
            no_connect,
        } = cli.command
        {
            assert_eq!(firmware.to_str().unwrap(), "app.bin");
            assert!(step);
            assert!(!no_connect);
        } else {
            panic!("Expected Flash command");
        }
    }

    #[test]
    fn test_cli_flash_requires_file() {
        assert!(Cli::try_parse_from(["bootlink", "flash"]).is_err());
    }

    #[test]
    fn test_cli_image_dump_conflicts_with_json() {
        assert!(Cli::try_parse_from(["bootlink", "image", "a.bin", "--dump", "--json"]).is_err());
    }

    #[test]
    fn test_cli_parse_encode() {
        let cli =
            Cli::try_parse_from(["bootlink", "encode", "write_firmware", "--payload", "0102"])
                .unwrap();
        if let Commands::Encode { command, payload } = cli.command {
            assert_eq!(command, "write_firmware");
            assert_eq!(payload.as_deref(), Some("0102"));
        } else {
            panic!("Expected Encode command");
        }
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["bootlink", "completions", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Zsh }
        ));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["bootlink"]).is_err());
    }

    #[test]
    fn test_serial_settings_precedence() {
        let mut config = Config::default();
        config.port.connection.baud = Some(9600);
        config.port.connection.timeout_ms = Some(300);

        let cli = Cli::try_parse_from(["bootlink", "connect"]).unwrap();
        let settings = serial_settings(&cli, &config, "COM1".into());
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.timeout, Duration::from_millis(300));

        let cli =
            Cli::try_parse_from(["bootlink", "-b", "230400", "--timeout-ms", "50", "connect"])
                .unwrap();
        let settings = serial_settings(&cli, &config, "COM1".into());
        assert_eq!(settings.baud_rate, 230400);
        assert_eq!(settings.timeout, Duration::from_millis(50));

        let settings = serial_settings(&cli, &Config::default(), "COM1".into());
        assert_eq!(settings.baud_rate, 230400);
        let cli = Cli::try_parse_from(["bootlink", "connect"]).unwrap();
        let settings = serial_settings(&cli, &Config::default(), "COM1".into());
        assert_eq!(settings.baud_rate, DEFAULT_BAUD);
        assert_eq!(settings.timeout, bootlink::port::DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_exit_codes() {
        let cases = [
            (CliError::Usage(String::new()), 2),
            (CliError::Config(String::new()), 3),
            (CliError::Device(String::new()), 4),
            (CliError::Cancelled(String::new()), 130),
        ];
        for (err, code) in cases {
            assert_eq!(exit_code(&anyhow::Error::from(err)), code);
        }
        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn test_exit_code_survives_context() {
        let err = anyhow::Error::from(CliError::Device("no reply".into())).context("flash failed");
        assert_eq!(exit_code(&err), 4);
    }

    #[test]
    fn test_device_err_classification() {
        assert_eq!(
            exit_code(&device_err(bootlink::Error::Config("bad".into()))),
            3
        );
        assert_eq!(exit_code(&device_err(bootlink::Error::NoImageLoaded)), 2);
        assert_eq!(exit_code(&device_err(bootlink::Error::PortClosed)), 4);
    }
}
