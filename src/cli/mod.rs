// src/cli/mod.rs
//! CLI definitions for the provisioner
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations live in the `commands` module.
//!
//! Primary commands work on one profile:
//! - `install` - Add units (and whatever they require) to a profile
//! - `remove` - Remove units from a profile
//! - `update` - Replace installed units with their newest updates
//! - `updates` - List available updates without changing anything
//!
//! Management contexts:
//! - `profile` - Create, inspect, lock and revert profiles
//! - `repo` - Inspect repository files
//!
//! Signing:
//! - `keygen` / `sign` - Ed25519 keys and detached artifact signatures

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod profile;
mod repo;

pub use profile::ProfileCommands;
pub use repo::RepoCommands;

#[derive(Parser)]
#[command(name = "provisioner")]
#[command(author = "Provisioner Contributors")]
#[command(version)]
#[command(about = "Plan and apply changes to installable-unit profiles", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the profile database (overrides the configuration)
    #[arg(short, long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where units and their artifacts come from
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Repository file to search (may be repeated; earlier files win)
    #[arg(short, long = "repo", value_name = "FILE")]
    pub repos: Vec<PathBuf>,

    /// Directory holding artifacts and their signatures
    #[arg(short, long, value_name = "DIR")]
    pub artifacts: Option<PathBuf>,

    /// Environment property for requirement filters (key=value, may be repeated)
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    pub environment: Vec<String>,
}

/// How a plan gets carried out
#[derive(Args, Debug, Clone, Default)]
pub struct ApplyArgs {
    /// Directory units are installed into by the directory touchpoint
    #[arg(long, value_name = "DIR")]
    pub install_root: Option<PathBuf>,

    /// Show the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Answer yes to trust prompts
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    // =========================================================================
    // Primary Commands
    // =========================================================================
    /// Install units into a profile
    Install {
        /// Profile to change
        profile: String,

        /// Units to install: `id` for the newest version, or `id@version`
        #[arg(required = true)]
        units: Vec<String>,

        /// Install these only if they fit; drop them with a warning otherwise
        #[arg(long)]
        optional: bool,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Remove units from a profile
    Remove {
        /// Profile to change
        profile: String,

        /// Units to remove: `id` for every installed version, or `id@version`
        #[arg(required = true)]
        units: Vec<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Update installed units to their newest versions
    Update {
        /// Profile to change
        profile: String,

        /// Unit ids to update (all installed units when empty)
        units: Vec<String>,

        /// Also apply patches whose lifecycle the profile meets
        #[arg(long)]
        patches: bool,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// List available updates for a profile
    Updates {
        /// Profile to inspect
        profile: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    // =========================================================================
    // Management Contexts
    // =========================================================================
    /// Profile management
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Repository inspection
    #[command(subcommand)]
    Repo(RepoCommands),

    // =========================================================================
    // Signing
    // =========================================================================
    /// Generate an Ed25519 signing key pair
    Keygen {
        /// Output path for the private key (the public key gets `.pub`)
        #[arg(short, long, default_value = "provisioner-signing.key")]
        output: PathBuf,

        /// Key identifier recorded in signatures
        #[arg(long)]
        key_id: Option<String>,
    },

    /// Write detached signatures for artifacts
    Sign {
        /// Private key file produced by `keygen`
        #[arg(short, long)]
        key: PathBuf,

        /// Artifact files to sign
        #[arg(required = true)]
        artifacts: Vec<PathBuf>,
    },
}
