//! migrun CLI
//!
//! Command-line tools for inspecting and maintaining a migrun store.
//!
//! # Commands
//!
//! - `init` - Provision the lock and change log collections
//! - `status` - Show the change log and the current lock holder
//! - `lock` - Show the current lease
//! - `unlock` - Remove an expired (or, with `--force`, any) lease

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// migrun command-line tools.
#[derive(Parser)]
#[command(name = "migrun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Path to a JSON runner configuration
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the lock and change log collections
    Init,

    /// Show the change log and the current lock holder
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the current lease
    Lock {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove the lease
    Unlock {
        /// Remove the lease even if it has not expired
        #[arg(long)]
        force: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            let path = cli.path.ok_or("Store path required for init")?;
            commands::init::run(&path, &config)?;
        }
        Commands::Status { format } => {
            let path = cli.path.ok_or("Store path required for status")?;
            commands::status::run(&path, &config, &format)?;
        }
        Commands::Lock { format } => {
            let path = cli.path.ok_or("Store path required for lock")?;
            commands::lock::show(&path, &config, &format)?;
        }
        Commands::Unlock { force } => {
            let path = cli.path.ok_or("Store path required for unlock")?;
            commands::lock::unlock(&path, &config, force)?;
        }
        Commands::Version => {
            println!("migrun CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("migrun Core v{}", migrun_core::VERSION);
        }
    }

    Ok(())
}
