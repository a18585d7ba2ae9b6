// src/cli/repo.rs
//! Repository inspection commands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum RepoCommands {
    /// List the units in repository files
    List {
        /// Repository files
        #[arg(required = true)]
        repos: Vec<PathBuf>,

        /// Only show the newest version of each unit
        #[arg(long)]
        latest: bool,

        /// Only show units with this id
        #[arg(long)]
        id: Option<String>,
    },

    /// Show every field of one unit
    Show {
        /// Repository file
        repo: PathBuf,

        /// Unit as `id@version`
        unit: String,
    },
}
