//! raidsim - RAID simulation over directory-backed drives
//!
//! Usage:
//!   raidsim init                          - Initialize RAID state
//!   raidsim list                          - List RAID configurations
//!   raidsim create --type T --name N      - Create a RAID configuration
//!   raidsim write <name> <key> --data S   - Store a value
//!   raidsim read <name> <key>             - Read a value back
//!   raidsim reconstruct <name> <key> <d>  - Rebuild a key onto a drive

use clap::{Parser, Subcommand};
use raidsim::{
    config::{default_config_path, Config},
    raid::RaidFactory,
    state::StateStore,
    Error, Result,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "raidsim")]
#[command(author = "raidsim Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Simulate RAID operations")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base directory of the RAID workspace (overrides the config file)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize RAID state
    Init,

    /// List RAID configurations
    #[command(alias = "l")]
    List,

    /// Create a new RAID configuration
    Create {
        /// RAID type (RAID0, RAID1, RAID5, RAID10)
        #[arg(short = 't', long = "type")]
        kind: String,

        /// RAID name
        #[arg(short, long)]
        name: String,
    },

    /// Write a value to a RAID configuration
    Write {
        /// RAID name
        name: String,

        /// Key to store the value under
        key: String,

        /// Value as a string
        #[arg(long, conflicts_with = "input")]
        data: Option<String>,

        /// Read the value from a file
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Read a value from a RAID configuration
    Read {
        /// RAID name
        name: String,

        /// Key to read
        key: String,

        /// Write the value to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild a key onto a failed or lost drive
    Reconstruct {
        /// RAID name
        name: String,

        /// Key to rebuild
        key: String,

        /// Drive to rebuild onto
        drive: String,
    },

    /// Show drive health of a RAID configuration
    Status {
        /// RAID name
        name: String,
    },

    /// Check that every drive of a RAID configuration exists
    Validate {
        /// RAID name
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run_command(cli.command, config) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let path = default_config_path();
            if path.exists() {
                Config::load(path)?
            } else {
                let mut config = Config::default();
                config.apply_env_overrides();
                config
            }
        }
    };

    if let Some(dir) = &cli.dir {
        config.base_dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run_command(command: Commands, config: Config) -> Result<()> {
    let store = Arc::new(StateStore::new(&config));
    let factory = RaidFactory::new(config, store);

    match command {
        Commands::Init => cmd_init(&factory),
        Commands::List => cmd_list(&factory),
        Commands::Create { kind, name } => cmd_create(&factory, &kind, &name),
        Commands::Write {
            name,
            key,
            data,
            input,
        } => cmd_write(&factory, &name, &key, data, input),
        Commands::Read { name, key, output } => cmd_read(&factory, &name, &key, output),
        Commands::Reconstruct { name, key, drive } => {
            cmd_reconstruct(&factory, &name, &key, &drive)
        }
        Commands::Status { name } => cmd_status(&factory, &name),
        Commands::Validate { name } => cmd_validate(&factory, &name),
    }
}

fn cmd_init(factory: &RaidFactory) -> Result<()> {
    factory.store().initialize()?;
    println!(
        "Initialized RAID state in directory: {}",
        factory.config().base_dir.display()
    );
    Ok(())
}

fn cmd_list(factory: &RaidFactory) -> Result<()> {
    let records = factory.store().list()?;

    if records.is_empty() {
        println!("No RAID configurations found.");
        return Ok(());
    }

    println!("RAID Configurations");
    println!("===================");

    for (i, record) in records.iter().enumerate() {
        println!();
        println!("[{}] {}", i + 1, record.name);
        println!("  Type: {}", record.kind);
        println!("  Drives: {}", record.drive_names.join(", "));
        if let Some(created_at) = record.created_at {
            println!("  Created: {}", created_at.to_rfc3339());
        }
    }

    Ok(())
}

fn cmd_create(factory: &RaidFactory, kind: &str, name: &str) -> Result<()> {
    let raid = factory.create_named(kind, name)?;

    println!(
        "Created new RAID configuration: {} of type {}",
        raid.name(),
        raid.kind()
    );
    Ok(())
}

fn cmd_write(
    factory: &RaidFactory,
    name: &str,
    key: &str,
    data: Option<String>,
    input: Option<PathBuf>,
) -> Result<()> {
    let bytes = match (data, input) {
        (Some(data), _) => data.into_bytes(),
        (None, Some(path)) => std::fs::read(path)?,
        (None, None) => {
            return Err(Error::InvalidConfig(
                "Either --data or --input is required".to_string(),
            ))
        }
    };

    let raid = factory.open(name)?;
    raid.write(key, &bytes)?;

    info!("Wrote {} ({} bytes) to {}", key, bytes.len(), name);
    Ok(())
}

fn cmd_read(factory: &RaidFactory, name: &str, key: &str, output: Option<PathBuf>) -> Result<()> {
    let raid = factory.open(name)?;
    let bytes = raid.read(key)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &bytes)?;
            info!("Wrote {} bytes to {:?}", bytes.len(), path);
        }
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

fn cmd_reconstruct(factory: &RaidFactory, name: &str, key: &str, drive: &str) -> Result<()> {
    let raid = factory.open(name)?;
    raid.reconstruct(key, drive)?;

    println!("Reconstructed {} on drive {}", key, drive);
    Ok(())
}

fn cmd_status(factory: &RaidFactory, name: &str) -> Result<()> {
    let raid = factory.open(name)?;
    let health = raid.health();

    println!("RAID Array Status");
    println!("=================");
    println!();
    println!("Name: {}", raid.name());
    println!("Type: {}", raid.kind());
    println!("Array Status: {:?}", health.status);
    println!(
        "Healthy drives: {}/{}",
        health.drives.len() - health.failed_count(),
        health.drives.len()
    );
    println!();

    for drive in &health.drives {
        let status = match (drive.failed, drive.present) {
            (_, false) => "missing",
            (true, true) => "failed",
            (false, true) => "ok",
        };
        println!("  {} - {}", drive.name, status);
    }

    Ok(())
}

fn cmd_validate(factory: &RaidFactory, name: &str) -> Result<()> {
    let record = factory
        .store()
        .get(name)?
        .ok_or_else(|| Error::NotFound(format!("RAID configuration {}", name)))?;

    factory.store().validate_drives(&record)?;
    println!("All {} drives of {} are present", record.drive_names.len(), name);
    Ok(())
}
