// src/cli/profile.rs
//! Profile management commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Create an empty profile
    Create {
        /// Profile id
        id: String,

        /// Profile property (key=value, may be repeated)
        #[arg(short, long = "property", value_name = "KEY=VALUE")]
        properties: Vec<String>,
    },

    /// List profiles
    List,

    /// Show the units and properties of a profile
    Show {
        /// Profile id
        id: String,

        /// Show an older revision instead of the current one
        #[arg(short, long)]
        timestamp: Option<i64>,

        /// Only list units marked as explicitly requested
        #[arg(long)]
        roots: bool,
    },

    /// List the revisions of a profile
    History {
        /// Profile id
        id: String,
    },

    /// Go back to the revision before the current one
    Revert {
        /// Profile id
        id: String,
    },

    /// Set or clear the lock flags of an installed unit
    Lock {
        /// Profile id
        id: String,

        /// Installed unit as `id@version`
        unit: String,

        /// Forbid removing the unit
        #[arg(long)]
        uninstall: bool,

        /// Forbid replacing the unit with another version
        #[arg(long)]
        update: bool,

        /// Clear all lock flags
        #[arg(long, conflicts_with_all = ["uninstall", "update"])]
        clear: bool,
    },

    /// Delete a profile and its history
    Delete {
        /// Profile id
        id: String,
    },
}
