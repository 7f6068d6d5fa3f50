mod cli;
mod commands;
mod error;
mod output;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use teslemetry_core::{IntegrationConfig, Teslemetry};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // No account needed
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "teslemetry", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let mut config = build_integration_config(&cli.global)?;
            // Only `watch` benefits from the push feed
            config.streaming_enabled = match &cmd {
                Command::Watch(args) => config.streaming_enabled && !args.no_stream,
                _ => false,
            };

            let teslemetry = Teslemetry::setup(config).await?;
            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &teslemetry, &cli.global).await;
            teslemetry.unload().await;
            result
        }
    }
}

/// Resolve the active profile and apply CLI overrides.
fn build_integration_config(global: &GlobalOpts) -> Result<IntegrationConfig, CliError> {
    let cfg = teslemetry_config::load_config()?;
    let name = global
        .profile
        .as_deref()
        .or(cfg.default_profile.as_deref())
        .unwrap_or("default")
        .to_owned();

    let mut config = match cfg.profiles.get(&name) {
        Some(profile) => {
            teslemetry_config::profile_to_integration_config(profile, &name, &cfg.defaults)?
        }
        // No profile: the env var alone is enough
        None => {
            let token = teslemetry_config::resolve_access_token(&Default::default(), &name)?;
            IntegrationConfig::new(token)
        }
    };

    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    Ok(config)
}
