//! VaultKV CLI
//!
//! Offline administration of a data directory while the server is down.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use vaultkv::config::{ConfigHandle, DEFAULT_CONFIG_FILE};
use vaultkv::{Dispatcher, Registry, Request};

/// VaultKV CLI
#[derive(Parser, Debug)]
#[command(name = "vaultkv-cli")]
#[command(about = "Offline tools for VaultKV data directories")]
struct Args {
    /// Config file of the data directory to operate on
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command, e.g. `exec --db shop "SELECT user:1"`
    Exec {
        /// Target database
        #[arg(long)]
        db: String,

        /// Query text: `<VERB> <ARGUMENT>`
        query: String,

        /// Auxiliary values as a JSON array
        #[arg(long, default_value = "[]")]
        values: String,
    },

    /// Show size statistics of a database
    Stats {
        #[arg(long)]
        db: String,
    },

    /// List databases on disk
    List,
}

fn main() {
    if let Err(e) = run(Args::parse()) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), String> {
    let config = Arc::new(ConfigHandle::open(&args.config).map_err(|e| e.to_string())?);
    let snapshot = config.snapshot();
    let registry = Arc::new(Registry::open(snapshot.databases_dir()).map_err(|e| e.to_string())?);

    let result = match args.command {
        Commands::Exec { db, query, values } => {
            let values: Vec<Value> =
                serde_json::from_str(&values).map_err(|e| format!("--values: {}", e))?;
            let request = Request::new(query, snapshot.apikey.clone(), db).with_values(values);

            let reply = Dispatcher::new(Arc::clone(&registry), Arc::clone(&config)).execute(&request);
            let body = serde_json::to_string_pretty(&reply.envelope).map_err(|e| e.to_string())?;
            println!("{}", body);
            if reply.is_success() {
                Ok(())
            } else {
                Err(format!("command failed with status {}", reply.code))
            }
        }
        Commands::Stats { db } => {
            registry.get_or_create(&db).map_err(|e| e.to_string())?;
            let stats = registry.stats(&db).map_err(|e| e.to_string())?;
            println!("database:         {}", db);
            println!("sstables:         {}", stats.sstable_count);
            println!("sstable bytes:    {}", stats.sstable_bytes);
            println!("wal bytes:        {}", stats.wal_bytes);
            println!("memtable bytes:   {}", stats.memtable_bytes);
            println!("memtable entries: {}", stats.memtable_entries);
            println!("read only:        {}", stats.read_only);
            Ok(())
        }
        Commands::List => {
            let root = registry.root();
            let mut names: Vec<String> = std::fs::read_dir(root)
                .map_err(|e| format!("read_dir {}: {}", root.display(), e))?
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect();
            names.sort();
            for name in names {
                println!("{}", name);
            }
            Ok(())
        }
    };

    registry.close_all();
    result
}
