//! Cache CLI subcommands for inspecting the library cache.
//!
//! Provides commands to:
//! - `list`: Show every cached library with its digest
//! - `evict`: Remove one library so the next compile fetches it again

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::domain::LibraryIdentifier;
use crate::library::LibraryStore;

/// Cache-related subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List cached libraries
    List,

    /// Remove a library from the cache
    Evict {
        /// Library, e.g. "H5P.Column 1.18" or "H5P.Column-1.18"
        library: String,
    },
}

pub async fn execute(command: CacheCommands, store: Arc<LibraryStore>) -> Result<()> {
    match command {
        CacheCommands::List => list(&store).await,
        CacheCommands::Evict { library } => evict(&store, &library).await,
    }
}

async fn list(store: &LibraryStore) -> Result<()> {
    let entries = store.list().await?;

    if entries.is_empty() {
        println!("Cache is empty ({})", store.root().display());
        return Ok(());
    }

    println!("{:<32} {:<6} {:<20} {:<12}", "LIBRARY", "FILES", "STORED", "SHA256");
    println!("{}", "-".repeat(74));

    for entry in &entries {
        let digest = entry
            .sha256
            .as_deref()
            .map(|d| &d[..d.len().min(12)])
            .unwrap_or("-");
        println!(
            "{:<32} {:<6} {:<20} {:<12}",
            entry.identifier.to_string(),
            entry.files,
            entry.stored_at.format("%Y-%m-%d %H:%M:%S"),
            digest
        );
    }

    println!("\nTotal: {} libraries in {}", entries.len(), store.root().display());
    Ok(())
}

async fn evict(store: &LibraryStore, library: &str) -> Result<()> {
    let id: LibraryIdentifier = library
        .parse()
        .with_context(|| format!("Cannot evict '{}'", library))?;

    if store.evict(&id).await? {
        println!("Evicted {}", id.library_string());
    } else {
        println!("{} is not cached", id.library_string());
    }
    Ok(())
}
