//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ecgfeed - simulated live ECG feed over HTTP
#[derive(Parser, Debug)]
#[command(
    name = "ef",
    about = "Serve a rolling window of CSV samples as a simulated live sensor feed",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the feed over HTTP
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Source directory (overrides source.directory)
        #[arg(short, long)]
        directory: Option<PathBuf>,
    },

    /// List eligible source files and show which one would be served
    Catalog {
        /// Source directory (overrides source.directory)
        #[arg(short, long)]
        directory: Option<PathBuf>,
    },

    /// Poll a running server and report heart rate per window
    Watch {
        /// Server base URL (overrides client.url)
        #[arg(short, long)]
        url: Option<String>,

        /// Stop after this many polls
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Overwrite this CSV file with each received window
        #[arg(short, long)]
        save: Option<PathBuf>,
    },

    /// Analyze the leading samples of a local CSV recording
    Analyze {
        /// CSV file to read
        file: PathBuf,

        /// Number of leading samples to analyze
        #[arg(
            short = 'n',
            long,
            default_value_t = 500,
            value_parser = clap::value_parser!(u64).range(100..=1000)
        )]
        samples: u64,

        /// Field to read from each line (overrides source.field-index)
        #[arg(short, long)]
        field: Option<usize>,

        /// Treat the first line as a column header
        #[arg(long)]
        header: bool,

        /// Write the analyzed samples to this CSV file
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
}
