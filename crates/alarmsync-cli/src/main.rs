use std::path::PathBuf;
use std::time::Duration;

use alarmsync_core::{
    migrate, AccountOptions, CommandRequest, Coordinator, CoordinatorConfig, Credentials,
    FixtureClient, NormalizeOptions, Normalizer, RegistryState,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod output;
#[cfg(test)]
mod output_tests;

use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "alarmsyncd")]
#[command(about = "Alarm provider device sync engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Persisted account options (ConfigState JSON); migrated in memory.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Overrides `update_interval_seconds` from the options file.
    #[arg(long)]
    interval_s: Option<u64>,

    #[arg(long, default_value_t = 30)]
    fetch_timeout_s: u64,

    #[arg(long, default_value_t = 30)]
    command_timeout_s: u64,

    #[arg(long)]
    debug_entities: bool,

    #[arg(long, default_value = "")]
    username: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upgrade a ConfigState file to the current schema version.
    Migrate {
        path: PathBuf,
        /// Write the result back instead of printing it.
        #[arg(long)]
        write: bool,
    },
    Normalize {
        devices: PathBuf,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// List registry entries with no counterpart in the device file.
    Reconcile {
        devices: PathBuf,
        registry: PathBuf,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    Once {
        devices: PathBuf,
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    Watch {
        devices: PathBuf,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    Command {
        devices: PathBuf,
        device_id: String,
        /// disarm, arm_stay, arm_away, arm_night, lock, unlock, turn_on, ...
        action: String,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        brightness: Option<u8>,
        /// JSON value for set_value.
        #[arg(long)]
        value: Option<String>,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = coordinator_config(&cli)?;
    let credentials = Credentials {
        username: cli.username.clone(),
        ..Default::default()
    };

    match cli.command {
        Command::Migrate { path, write } => {
            let state = output::load_config_state(&path)?;
            let from = state.version;
            let migrated = migrate(state);
            info!(from, to = migrated.version, "config migrated");
            if write {
                output::write_json_atomic(&path, &migrated)?;
            } else {
                println!("{}", serde_json::to_string_pretty(&migrated)?);
            }
        }
        Command::Normalize { devices, format } => {
            let raw = FixtureClient::load(&devices).await?;
            let generation = Normalizer::new(config.normalize.clone()).normalize(&raw);
            output::print_generation(&generation, None, format)?;
        }
        Command::Reconcile {
            devices,
            registry,
            format,
        } => {
            let raw = FixtureClient::load(&devices).await?;
            let generation = Normalizer::new(config.normalize.clone()).normalize(&raw);
            let registry: RegistryState = output::load_json(&registry)?;
            let plan = alarmsync_core::reconcile(&generation.ids(), &registry);
            output::print_reconciliation(&plan, format)?;
        }
        Command::Once { devices, format } => {
            let coordinator = Coordinator::new(FixtureClient::new(devices), config);
            coordinator.start(&credentials).await?;
            output::print_published(&coordinator.published(), format)?;
            coordinator.shutdown().await;
        }
        Command::Watch { devices, format } => {
            let coordinator = Coordinator::new(FixtureClient::new(devices), config);
            coordinator.start(&credentials).await?;
            watch_loop(&coordinator, format).await?;
            coordinator.shutdown().await;
        }
        Command::Command {
            devices,
            device_id,
            action,
            code,
            brightness,
            value,
            format,
        } => {
            let command = output::parse_command(&action)?;
            let value = value
                .map(|text| output::parse_value(&text))
                .transpose()?;
            let request = CommandRequest {
                code,
                brightness,
                value,
            };

            let coordinator = Coordinator::new(FixtureClient::new(devices), config);
            coordinator.start(&credentials).await?;
            let sent = coordinator.dispatch_command(&device_id, command, request).await;
            coordinator.shutdown().await;
            sent.with_context(|| format!("{command} on {device_id}"))?;

            if let Some(entity) = coordinator.get_snapshot().get(&device_id) {
                output::print_entity(entity, format)?;
            }
        }
    }

    Ok(())
}

fn coordinator_config(cli: &Cli) -> Result<CoordinatorConfig> {
    let mut config = match &cli.options {
        Some(path) => {
            let state = migrate(output::load_config_state(path)?);
            CoordinatorConfig::from_options(&AccountOptions::from_state(&state))
        }
        None => CoordinatorConfig::default(),
    };

    if let Some(secs) = cli.interval_s.filter(|s| *s > 0) {
        config.update_interval = Duration::from_secs(secs);
    }
    config.fetch_timeout = Duration::from_secs(cli.fetch_timeout_s.max(1));
    config.command_timeout = Duration::from_secs(cli.command_timeout_s.max(1));
    config.normalize = NormalizeOptions {
        debug_entities: cli.debug_entities,
    };
    // File-backed runs have no session to keep alive.
    config.keep_alive_interval = None;
    Ok(config)
}

async fn watch_loop(coordinator: &Coordinator<FixtureClient>, format: OutputFormat) -> Result<()> {
    let mut updates = coordinator.on_update();
    let first = updates.borrow_and_update().clone();
    output::print_published(&first, format)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let published = updates.borrow_and_update().clone();
                output::print_published(&published, format)?;
                let stats = coordinator.stats();
                info!(
                    seq = published.seq,
                    entities = published.generation.len(),
                    fetches_ok = stats.fetches_ok,
                    fetches_err = stats.fetches_err,
                    "published"
                );
            }
        }
    }

    Ok(())
}
