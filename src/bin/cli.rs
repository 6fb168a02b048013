//! LedgerKV CLI Client
//!
//! Command-line interface for a running LedgerKV server, plus offline
//! inspection of a transaction log.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use ledgerkv::backend;
use ledgerkv::config::{BackendConfig, SyncStrategy};
use ledgerkv::translog::{self, LoggerOptions, TransactionLogger};
use ledgerkv::{LedgerError, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;

/// LedgerKV CLI
#[derive(Parser, Debug)]
#[command(name = "ledgerkv-cli")]
#[command(about = "CLI for the LedgerKV key-value store")]
struct Args {
    /// Server base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Print every event in a transaction log (server must be stopped)
    Dump {
        /// Backend holding the log
        #[arg(short, long, value_enum, default_value_t = DumpBackend::File)]
        backend: DumpBackend,

        /// Log file or database path
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DumpBackend {
    File,
    Sqlite,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = execute(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn execute(args: Args) -> Result<()> {
    let base = args.server.trim_end_matches('/').to_string();

    match args.command {
        Commands::Get { key } => {
            let response = Client::new().get(key_url(&base, &key)).send()?;
            match response.status() {
                StatusCode::OK => println!("{}", response.text()?),
                StatusCode::NOT_FOUND => println!("(nil)"),
                status => return Err(unexpected(status, response.text()?)),
            }
        }
        Commands::Set { key, value } => {
            let response = Client::new().put(key_url(&base, &key)).body(value).send()?;
            match response.status() {
                StatusCode::CREATED => println!("OK"),
                status => return Err(unexpected(status, response.text()?)),
            }
        }
        Commands::Del { key } => {
            let response = Client::new().delete(key_url(&base, &key)).send()?;
            match response.status() {
                StatusCode::OK => println!("OK"),
                status => return Err(unexpected(status, response.text()?)),
            }
        }
        Commands::Dump { backend, path } => dump(backend, path)?,
    }

    Ok(())
}

fn key_url(base: &str, key: &str) -> String {
    format!("{}/v1/{}", base, translog::escape_value(key).replace('+', "%20"))
}

fn unexpected(status: StatusCode, body: String) -> LedgerError {
    LedgerError::Network(format!("server returned {}: {}", status, body.trim()))
}

/// Stream a log through the replay reader and print each event
fn dump(kind: DumpBackend, path: PathBuf) -> Result<()> {
    let config = match kind {
        DumpBackend::File => BackendConfig::File {
            path,
            sync: SyncStrategy::EveryWrite,
        },
        DumpBackend::Sqlite => BackendConfig::Sqlite {
            path,
            busy_timeout_ms: 5_000,
        },
    };

    let logger =
        TransactionLogger::new(backend::open_backend_read_only(&config)?, LoggerOptions::default());
    let (events, errors) = logger.read_events();

    let count = translog::drain(events, errors, Duration::from_secs(3600), |event| {
        println!(
            "{:>10}  {:<6}  {}  {}",
            event.sequence(),
            event.event_type(),
            event.key(),
            event.value()
        );
        Ok(())
    })?;

    logger.close(Duration::from_secs(5))?;
    println!("{} events", count);
    Ok(())
}
