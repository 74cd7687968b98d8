//! collection-store CLI
//!
//! Inspect and prune a collection store file.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use collection_store::{CollectionIdentifier, CollectionsStorage, Config, StoreError};
use tracing_subscriber::{fmt, EnvFilter};

/// collection-store CLI
#[derive(Parser, Debug)]
#[command(name = "collection-store-cli")]
#[command(about = "Inspect a package-collection cache")]
#[command(version)]
struct Args {
    /// Path to the store file
    #[arg(short, long, default_value = "./collections.db")]
    path: PathBuf,

    /// Keys per lookup when listing
    #[arg(short, long, default_value = "100")]
    batch_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every cached collection
    List,

    /// Show one collection in detail
    Show {
        /// Identifier, as printed by `list`
        identifier: String,
    },

    /// Remove a collection from the cache
    Remove {
        /// Identifier, as printed by `list`
        identifier: String,
    },

    /// Print size information about the store
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,collection_store=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .path(&args.path)
        .batch_size(args.batch_size)
        .build();

    let storage = match CollectionsStorage::open(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            process::exit(1);
        }
    };

    let outcome = run(&storage, args.command);
    let closed = storage.close();

    if let Err(e) = outcome.and(closed) {
        tracing::error!("{}", e);
        if e.is_corrupt() {
            tracing::error!(
                "The cache is unusable; delete {} and it will be rebuilt",
                args.path.display()
            );
        }
        process::exit(1);
    }
}

fn run(storage: &CollectionsStorage, command: Commands) -> Result<(), StoreError> {
    match command {
        Commands::List => {
            let collections = storage.list().wait()?;
            for collection in &collections {
                println!(
                    "{}\t{}\t{} packages",
                    collection.identifier,
                    collection.name,
                    collection.packages.len()
                );
            }
            tracing::info!("{} collections", collections.len());
        }
        Commands::Show { identifier } => {
            let identifier = CollectionIdentifier::from_key(identifier);
            let collection = storage.get(&identifier).wait()?;

            println!("Identifier: {}", collection.identifier);
            println!("Name:       {}", collection.name);
            if let Some(overview) = &collection.overview {
                println!("Overview:   {}", overview);
            }
            if !collection.keywords.is_empty() {
                println!("Keywords:   {}", collection.keywords.join(", "));
            }
            match &collection.signer {
                Some(signer) => println!(
                    "Signed by:  {} ({}, {})",
                    signer.common_name, signer.organization, signer.organizational_unit
                ),
                None => println!("Signed by:  -"),
            }
            println!(
                "Packages:   {} ({} versions)",
                collection.packages.len(),
                collection.version_count()
            );
            for package in &collection.packages {
                let versions: Vec<&str> = package.versions.iter().map(|v| v.version.as_str()).collect();
                println!("  {}  [{}]", package.repository_url, versions.join(", "));
            }
        }
        Commands::Remove { identifier } => {
            let identifier = CollectionIdentifier::from_key(identifier);
            storage.remove(&identifier).wait()?;
            tracing::info!("Removed {}", identifier);
        }
        Commands::Stats => {
            let stats = storage.stats().wait()?;
            println!("Location:    {}", storage.location());
            println!("Entries:     {}", stats.entry_count);
            println!("Live bytes:  {}", stats.live_bytes);
            println!("Total bytes: {}", stats.total_bytes);
            println!("Generation:  {}", stats.generation);
        }
    }

    Ok(())
}
