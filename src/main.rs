// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, ProfileCommands, RepoCommands};
use commands::Environment;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        // No command provided, show help
        println!("Provisioner v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'provisioner --help' for usage information");
        return Ok(());
    };

    // Only commands that touch profiles load the configuration
    let load_env = || Environment::load(cli.config.as_deref(), cli.db_path.clone());

    match command {
        Commands::Install {
            profile,
            units,
            optional,
            source,
            apply,
        } => commands::cmd_install(&load_env()?, &profile, &units, optional, &source, &apply),
        Commands::Remove {
            profile,
            units,
            source,
            apply,
        } => commands::cmd_remove(&load_env()?, &profile, &units, &source, &apply),
        Commands::Update {
            profile,
            units,
            patches,
            source,
            apply,
        } => commands::cmd_update(&load_env()?, &profile, &units, patches, &source, &apply),
        Commands::Updates { profile, source } => {
            commands::cmd_updates(&load_env()?, &profile, &source)
        }
        Commands::Profile(profile_cmd) => {
            let env = load_env()?;
            match profile_cmd {
                ProfileCommands::Create { id, properties } => {
                    commands::cmd_profile_create(&env, &id, &properties)
                }
                ProfileCommands::List => commands::cmd_profile_list(&env),
                ProfileCommands::Show {
                    id,
                    timestamp,
                    roots,
                } => commands::cmd_profile_show(&env, &id, timestamp, roots),
                ProfileCommands::History { id } => commands::cmd_profile_history(&env, &id),
                ProfileCommands::Revert { id } => commands::cmd_profile_revert(&env, &id),
                ProfileCommands::Lock {
                    id,
                    unit,
                    uninstall,
                    update,
                    clear,
                } => commands::cmd_profile_lock(&env, &id, &unit, uninstall, update, clear),
                ProfileCommands::Delete { id } => commands::cmd_profile_delete(&env, &id),
            }
        }
        Commands::Repo(RepoCommands::List { repos, latest, id }) => {
            commands::cmd_repo_list(&repos, latest, id.as_deref())
        }
        Commands::Repo(RepoCommands::Show { repo, unit }) => commands::cmd_repo_show(&repo, &unit),
        Commands::Keygen { output, key_id } => commands::cmd_keygen(&output, key_id.as_deref()),
        Commands::Sign { key, artifacts } => commands::cmd_sign(&key, &artifacts),
    }
}
