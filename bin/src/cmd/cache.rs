//! Cache command implementation.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use valuation::{ReportCache, SqliteReportStore};

#[derive(Subcommand, Debug)]
pub(crate) enum CacheAction {
    /// Remove expired reports
    Purge {
        /// SQLite report cache file
        #[arg(long)]
        cache: PathBuf,
    },

    /// Remove every report
    Clear {
        /// SQLite report cache file
        #[arg(long)]
        cache: PathBuf,
    },
}

fn open(path: &Path) -> Result<ReportCache> {
    let store = SqliteReportStore::open(path)
        .with_context(|| format!("opening report cache {}", path.display()))?;
    Ok(ReportCache::new(Arc::new(store)))
}

/// Run a cache maintenance action.
pub(crate) async fn run(action: CacheAction) -> Result<()> {
    match action {
        CacheAction::Purge { cache } => {
            let purged = open(&cache)?.purge_expired().await?;
            println!("Purged {purged} expired report(s)");
        }
        CacheAction::Clear { cache } => {
            open(&cache)?.clear().await?;
            println!("Cleared {}", cache.display());
        }
    }
    Ok(())
}
