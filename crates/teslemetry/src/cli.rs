//! Clap derive structures for the `teslemetry` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// teslemetry -- Tesla vehicles and energy sites from the command line
#[derive(Debug, Parser)]
#[command(
    name = "teslemetry",
    version,
    about = "Monitor and control Tesla vehicles and energy sites via Teslemetry",
    long_about = "Polls the Tesla Fleet API through the Teslemetry proxy, merges the\n\
        streaming telemetry feed, and sends commands to vehicles and energy sites.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "TESLEMETRY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TESLEMETRY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "TESLEMETRY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OnOff {
    On,
    Off,
}

impl OnOff {
    pub fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show every entity and its current state
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Follow entity changes and vehicle alerts until interrupted
    Watch(WatchArgs),

    /// Send a command to a vehicle
    #[command(alias = "cmd")]
    Command(VehicleCommandArgs),

    /// Send a command to an energy site
    Energy(EnergyArgs),

    /// Wake a vehicle and wait until it is online
    Wake {
        /// Vehicle VIN
        vin: String,
    },

    /// Manage configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Status / Watch ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Only show entities of this device (VIN or site id)
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Hide entities with no value
    #[arg(long)]
    pub available: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only follow entities of this device (VIN or site id)
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Poll only, do not attach the telemetry stream
    #[arg(long)]
    pub no_stream: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VEHICLE COMMANDS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct VehicleCommandArgs {
    /// Vehicle VIN
    pub vin: String,

    #[command(subcommand)]
    pub action: VehicleAction,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TrunkArg {
    Front,
    Rear,
}

#[derive(Debug, Subcommand)]
pub enum VehicleAction {
    /// Start charging
    ChargeStart,
    /// Stop charging
    ChargeStop,
    /// Set the charge limit
    ChargeLimit {
        /// Percent (50-100)
        #[arg(value_parser = clap::value_parser!(u8).range(50..=100))]
        percent: u8,
    },
    /// Set the charging current
    ChargingAmps {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=48))]
        amps: u8,
    },
    /// Open or close the charge port door
    ChargePort { state: OnOff },
    /// Turn climate control on or off
    Climate { state: OnOff },
    /// Set cabin temperatures in Celsius
    SetTemps {
        driver: f64,
        /// Defaults to the driver temperature
        passenger: Option<f64>,
    },
    /// Lock the doors
    Lock,
    /// Unlock the doors
    Unlock,
    /// Sentry mode on or off
    Sentry { state: OnOff },
    /// Honk the horn
    Honk,
    /// Flash the lights
    Flash,
    /// Open or close a trunk
    Trunk { which: TrunkArg },
    /// Navigate to coordinates
    Navigate {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        #[arg(long, default_value = "1")]
        order: u32,
    },
    /// Schedule charging to start at a time of day
    ScheduledCharging {
        state: OnOff,
        /// Minutes after midnight, required when enabling
        #[arg(long)]
        time: Option<u32>,
    },
    /// Valet mode, optionally with a four digit PIN
    Valet {
        state: OnOff,
        #[arg(long)]
        pin: Option<String>,
    },
    /// Speed limit mode, with its four digit PIN
    SpeedLimit {
        state: OnOff,
        #[arg(long)]
        pin: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ENERGY COMMANDS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct EnergyArgs {
    /// Energy site id
    pub site_id: u64,

    #[command(subcommand)]
    pub action: EnergyAction,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OperationModeArg {
    SelfConsumption,
    Autonomous,
    Backup,
}

impl OperationModeArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfConsumption => "self_consumption",
            Self::Autonomous => "autonomous",
            Self::Backup => "backup",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum EnergyAction {
    /// Set the backup reserve
    BackupReserve {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },
    /// Set the Powerwall operation mode
    Mode { mode: OperationModeArg },
    /// Storm watch on or off
    Storm { state: OnOff },
    /// Allow or forbid charging from the grid
    GridCharging { state: OnOff },
    /// Set the off-grid vehicle charging reserve
    OffGridReserve {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },
    /// Replace time-of-use settings from a JSON file
    TimeOfUse {
        /// Path to the settings JSON
        file: std::path::PathBuf,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the loaded configuration
    Show,

    /// Set a profile value
    Set {
        /// Key, e.g. "streaming" or "vehicle_interval"
        key: String,

        /// Value to set
        value: String,
    },

    /// Prompt for an access token and store it in the system keyring
    SetToken {
        /// Save to the config file instead of the keyring
        #[arg(long)]
        plaintext: bool,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
