//! Cache command implementation

use anyhow::{Context, Result};
use apk_triage_core::cache::DecompilationCache;
use apk_triage_core::ScanConfig;
use apk_triage_core::tools::Jadx;
use colored::Colorize;
use std::sync::Arc;

use super::banner;

fn open(config: &ScanConfig) -> Result<DecompilationCache> {
    let decompiler = Arc::new(Jadx::new(
        config.tools.jadx.clone(),
        config.tools.jadx_args.clone(),
    ));
    DecompilationCache::new(config.cache.directory.clone(), decompiler).with_context(|| {
        format!(
            "Failed to open cache at {}",
            config.cache.directory.display()
        )
    })
}

/// Print the cache directory and its entries
pub fn path(config: &ScanConfig) -> Result<()> {
    let cache = open(config)?;
    let entries = cache.entries().context("Failed to list cache entries")?;

    println!("{}", cache.root().display());
    for entry in &entries {
        println!("  {}", entry.dimmed());
    }
    println!("{} cached decompilation(s)", entries.len());
    Ok(())
}

/// Remove every cached decompilation
pub fn clear(config: &ScanConfig) -> Result<()> {
    let cache = open(config)?;
    let removed = cache.clear().context("Failed to clear cache")?;
    println!(
        "{} Removed {} entr{} from {}",
        banner::status_ok(),
        removed,
        if removed == 1 { "y" } else { "ies" },
        cache.root().display()
    );
    Ok(())
}
