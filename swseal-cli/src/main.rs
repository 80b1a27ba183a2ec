use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod payload_cli;

/// Log levels
#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "swseal",
    about = "Sign, verify and install payloads for a self-verifying request interceptor",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[clap(long, global = true)]
    json_logs: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Generate a P-384 key pair
    Keygen {
        /// Directory receiving private.jwk and public.jwk
        #[clap(long, default_value = ".")]
        out: PathBuf,

        /// Overwrite an existing key pair
        #[clap(long)]
        force: bool,
    },

    /// Sign a script into a framed payload
    Sign {
        /// Private JWK
        #[clap(long)]
        key: PathBuf,

        /// Script identifier the loader expects
        #[clap(long, default_value = "sw.js")]
        name: String,

        /// Modification time recorded in the payload (defaults to now, in ms)
        #[clap(long)]
        modified: Option<i64>,

        /// Extra metadata, e.g. release notes (repeatable)
        #[clap(long = "note")]
        notes: Vec<String>,

        /// Script to sign
        script: PathBuf,

        /// Write the payload here instead of stdout
        #[clap(long)]
        out: Option<PathBuf>,
    },

    /// Verify a payload; exits non-zero when it is rejected
    Verify {
        /// Public JWK (defaults to the embedded key)
        #[clap(long)]
        key: Option<PathBuf>,

        /// Expected script identifier
        #[clap(long, default_value = "sw.js")]
        name: String,

        /// Reject payloads not strictly newer than this
        #[clap(long)]
        min_mod_time: Option<i64>,

        /// Payload file
        payload: PathBuf,
    },

    /// Show payload metadata without verifying
    Inspect {
        /// Payload file
        payload: PathBuf,

        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// Verify a payload and write it into the configured record store
    Install {
        /// Loader configuration (YAML or JSON)
        #[clap(long)]
        config: PathBuf,

        /// Payload file
        payload: PathBuf,
    },

    /// Print the watchdog snippet injected into HTML responses
    Snippet {
        /// Print its CSP source expression instead
        #[clap(long)]
        hash: bool,
    },
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr; stdout carries command output only.
fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.json_logs);

    match cli.command {
        Command::Keygen { out, force } => payload_cli::keygen(&out, force),
        Command::Sign {
            key,
            name,
            modified,
            notes,
            script,
            out,
        } => payload_cli::sign(&key, &name, modified, &notes, &script, out.as_deref()),
        Command::Verify {
            key,
            name,
            min_mod_time,
            payload,
        } => payload_cli::verify(key.as_deref(), &name, min_mod_time, &payload),
        Command::Inspect { payload, json } => payload_cli::inspect(&payload, json),
        Command::Install { config, payload } => payload_cli::install(&config, &payload).await,
        Command::Snippet { hash } => {
            payload_cli::snippet(hash);
            Ok(())
        }
    }
}
