//! CLI argument definitions for trailmirror.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Mirror CloudTrail log archives from S3 into locally partitioned JSONL.
///
/// ## Examples
///
/// Generate a config from the trails visible to the current credentials:
///   trailmirror generate-config config.json
///
/// Run the pipeline:
///   trailmirror run --config config.json
#[derive(Parser, Debug)]
#[command(name = "trailmirror")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the mirroring pipeline
    Run {
        /// Path to the JSON config document
        #[arg(short, long, env = "TRAILMIRROR_CONFIG")]
        config: PathBuf,
    },

    /// Discover trails via the CloudTrail API and write a config document
    GenerateConfig {
        /// Output path for the generated config
        output: PathBuf,
    },
}

/// Log level for the tracing subscriber.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
