//! Command-line interface definition for Tallybot
//!
//! This module defines the CLI structure using clap's derive API,
//! providing the interactive bot loop and record administration commands.

use clap::{Parser, Subcommand};

/// Tallybot - conversational counter tracker
///
/// Track numeric counters that move on manual adjustment or accrue
/// automatically over elapsed calendar time.
#[derive(Parser, Debug, Clone)]
#[command(name = "tallybot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Data directory for counter record files
    #[arg(long, env = "TALLYBOT_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Tallybot
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the interactive console bot
    Run {
        /// Chat identity for this console session (overrides config)
        #[arg(long)]
        chat: Option<i64>,
    },

    /// Inspect and manage stored counter records
    Counters {
        /// Record management subcommand
        #[command(subcommand)]
        command: CounterCommand,
    },
}

/// Counter record management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum CounterCommand {
    /// List a chat's counters with accrual applied
    List {
        /// Chat to list counters for
        #[arg(long, default_value_t = 0)]
        chat: i64,

        /// Output as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Remove one counter record
    Remove {
        /// Chat the counter belongs to
        #[arg(long, default_value_t = 0)]
        chat: i64,

        /// Name of the counter to remove
        #[arg(long)]
        name: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            data_dir: None,
            verbose: false,
            command: Commands::Run { chat: None },
        }
    }
}
