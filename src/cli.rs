//! clap-based command line interface.
//!
//! Defines the [`Cli`] struct with the [`Command`] subcommands (serve,
//! trigger, validate) and the global `--verbose` flag.

use clap::{Parser, Subcommand};

/// stepflow — webhook-driven delayed multi-step workflow sequencer.
#[derive(Debug, Parser)]
#[command(name = "stepflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose (debug-level) logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the sequencer HTTP handler.
    Serve {
        /// Port to listen on, overriding the configured value.
        #[arg(long)]
        port: Option<u16>,

        /// Schedule ticks in-process instead of through QStash (development
        /// only, no durability).
        #[arg(long, default_value_t = false)]
        local: bool,
    },

    /// Validate a sequence file and publish it to the handler via the broker.
    Trigger {
        /// Path to a JSON file containing the sequence payload.
        file: String,

        /// Seconds to wait before the first tick is delivered.
        #[arg(long, default_value_t = 0)]
        delay: u64,
    },

    /// Parse a sequence file and report every validation violation.
    Validate {
        /// Path to a JSON file containing the sequence payload.
        file: String,
    },
}
