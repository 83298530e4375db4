//! Command-line interface for h5pack.
//!
//! Provides commands for compiling documents into packages, managing the
//! library cache, and showing the resolved configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::build_generator;
use crate::config::{self, ResolvedConfig};
use crate::core::{CompileOptions, Compiler};
use crate::domain::Document;
use crate::handlers::HandlerRegistry;
use crate::library::{HttpLibrarySource, LibraryResolver, LibraryStore};

pub mod cache;

/// h5pack - compile content documents into H5P packages
#[derive(Parser, Debug)]
#[command(name = "h5pack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a document into a package
    Compile {
        /// Document file (YAML)
        input: PathBuf,

        /// Package file to write (.h5p)
        output: PathBuf,

        /// AI provider override (none, openai, fabric)
        #[arg(long)]
        ai_provider: Option<String>,
    },

    /// Manage the library cache
    Cache {
        #[command(subcommand)]
        command: cache::CacheCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Compile {
                input,
                output,
                ai_provider,
            } => compile(&input, &output, ai_provider).await,
            Commands::Cache { command } => {
                let store = library_store(config::config()?)?;
                cache::execute(command, store).await
            }
            Commands::Config => show_config(),
        }
    }
}

/// Library store over the configured cache and remote source
fn library_store(cfg: &ResolvedConfig) -> Result<Arc<LibraryStore>> {
    let source = HttpLibrarySource::new(
        cfg.library.url_template.clone(),
        Duration::from_secs(cfg.library.timeout_seconds),
    )
    .context("Failed to build HTTP client for the library source")?;

    Ok(Arc::new(LibraryStore::new(cfg.libraries_dir(), Arc::new(source))))
}

async fn compile(input: &Path, output: &Path, ai_provider: Option<String>) -> Result<()> {
    let cfg = config::config()?;

    let mut ai = cfg.ai.clone();
    if let Some(provider) = ai_provider {
        ai.provider = provider;
    }

    let document = Document::from_file(input)?;
    let registry = Arc::new(HandlerRegistry::with_builtin_handlers()?);
    let generator = build_generator(&ai)?;

    let compiler = Compiler::new(
        registry,
        LibraryResolver::new(library_store(cfg)?),
        generator,
    )
    .with_options(CompileOptions {
        column_library: cfg.package.column_library.clone(),
    });

    let package = compiler
        .package(&document, output)
        .await
        .with_context(|| format!("Failed to compile {}", input.display()))?;

    eprintln!(
        "Wrote {} ({} content items, {} libraries, {} media files)",
        output.display(),
        package.tree.nodes.len(),
        package.dependencies.len(),
        package.media.len()
    );
    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("h5pack configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Cache:     {}", cfg.cache.display());
    println!("  Libraries: {}", cfg.libraries_dir().display());
    println!();
    println!("Library source:");
    println!("  URL template: {}", cfg.library.url_template);
    println!("  Timeout:      {}s", cfg.library.timeout_seconds);
    println!();
    println!("AI generation:");
    println!("  Provider:    {}", cfg.ai.provider);
    println!("  Model:       {}", cfg.ai.model.as_deref().unwrap_or("(default)"));
    println!("  Endpoint:    {}", cfg.ai.endpoint.as_deref().unwrap_or("(default)"));
    println!("  API key env: {}", cfg.ai.api_key_env);
    println!("  Timeout:     {}s", cfg.ai.timeout_seconds);
    println!();
    println!("Package:");
    println!("  Column library: {}", cfg.package.column_library.library_string());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_compile_flags() {
        let cli = Cli::parse_from([
            "h5pack",
            "compile",
            "course.yaml",
            "course.h5p",
            "--verbose",
            "--ai-provider",
            "openai",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Compile {
                input,
                output,
                ai_provider,
            } => {
                assert_eq!(input, PathBuf::from("course.yaml"));
                assert_eq!(output, PathBuf::from("course.h5p"));
                assert_eq!(ai_provider.as_deref(), Some("openai"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_cache_evict() {
        let cli = Cli::parse_from(["h5pack", "cache", "evict", "H5P.Column 1.18"]);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                command: cache::CacheCommands::Evict { ref library }
            } if library == "H5P.Column 1.18"
        ));
    }
}
