//! Command line arguments.

use bucketfan_storage::ListOptions;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// List and audit S3-compatible buckets.
///
/// Connection details and pool sizes come from the configuration file
/// (`--config`, or `config.toml` in the platform configuration directory)
/// and `BUCKETFAN_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "bucketfan", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level, used when `RUST_LOG` is not set
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print every object key, one listing page at a time
    List(Target),
    /// Print the keys of publicly readable objects
    Public(Target),
}

#[derive(Debug, Clone, clap::Args)]
pub struct Target {
    /// Bucket to read
    #[arg(short, long)]
    pub bucket: String,

    /// Only consider keys starting with this prefix
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Objects to request per listing page
    #[arg(long)]
    pub page_size: Option<usize>,
}

impl Target {
    pub fn options(&self) -> ListOptions {
        let mut options = ListOptions::new(&self.bucket);
        if let Some(prefix) = &self.prefix {
            options = options.with_prefix(prefix);
        }
        if let Some(page_size) = self.page_size {
            options = options.with_page_size(page_size);
        }
        options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
