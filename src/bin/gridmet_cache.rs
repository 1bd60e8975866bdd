//! gridmet-cache - inspect and clear the local forecast cache.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gridmet_cfsv2::cache::default_cache_dir;
use gridmet_cfsv2::{clear_cache, init_tracing, list_cache, log_timed_operation, VariableName};

#[derive(Parser, Debug)]
#[command(name = "gridmet-cache")]
#[command(author, version, about = "Manage the gridmet-cfsv2 forecast cache", long_about = None)]
struct Args {
    /// Cache directory [default: ~/.gridmet]
    #[arg(long, global = true, env = "GRIDMET_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List valid cache entries
    List {
        /// Only entries for this variable
        #[arg(long)]
        var: Option<String>,
    },
    /// Delete every valid cache entry
    Clear,
}

fn main() -> Result<()> {
    init_tracing("warn");
    let args = Args::parse();
    let cache_dir = args.cache_dir.unwrap_or_else(default_cache_dir);

    match args.command {
        Command::List { var } => {
            let variable = var
                .as_deref()
                .map(str::parse::<VariableName>)
                .transpose()?;
            let entries = list_cache(&cache_dir, variable)
                .with_context(|| format!("listing {}", cache_dir.display()))?;
            for entry in entries {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.variable,
                    entry.range.start(),
                    entry.range.end(),
                    entry.path.display()
                );
            }
        }
        Command::Clear => {
            let removed = log_timed_operation("clear_cache", || clear_cache(&cache_dir))
                .with_context(|| format!("clearing {}", cache_dir.display()))?;
            println!("Removed {} cache entries from {}", removed, cache_dir.display());
        }
    }

    Ok(())
}
