// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! bpbridge cache administration CLI
//!
//! Operates directly on the cache store, independent of the running
//! bridge process (SQLite handles the cross-process locking).
//!
//! # Usage
//!
//! ```bash
//! # Delete expired cache entries
//! bpbridge-admin cleanup
//!
//! # List expired entries without deleting them
//! bpbridge-admin scan
//!
//! # Show how many cache-miss reservations are queued
//! bpbridge-admin reservations
//!
//! # Drop every entry and reservation
//! bpbridge-admin flush --yes
//! ```

use anyhow::{bail, Context, Result};
use bpbridge::cache::BundleCache;
use bpbridge::SqliteCache;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// bpbridge cache administration CLI
#[derive(Parser, Debug)]
#[command(name = "bpbridge-admin")]
#[command(about = "bpbridge cache administration CLI")]
#[command(version)]
struct Args {
    /// SQLite database path for the cache index
    #[arg(long, default_value = "./tmp/bp_cache/index.db")]
    db: PathBuf,

    /// Directory holding cached response bodies
    #[arg(long, default_value = "./tmp/bp_cache")]
    cache_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Delete expired cache entries (index rows and body files)
    Cleanup,

    /// List expired entries without deleting them
    Scan,

    /// Show the number of queued cache-miss reservations
    Reservations,

    /// Remove every cache entry and reservation
    Flush {
        /// Confirm the destructive flush
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cache = SqliteCache::open(&args.db, &args.cache_dir)
        .with_context(|| format!("opening cache store at {}", args.db.display()))?;

    match args.command {
        Commands::Cleanup => {
            let removed = cache
                .delete_expired()
                .context("deleting expired entries")?;
            println!("removed {} expired entr{}", removed, plural_y(removed));
        }
        Commands::Scan => {
            let expired = cache.scan_expired().context("scanning expired entries")?;
            if expired.is_empty() {
                println!("no expired entries");
            } else {
                for item in &expired {
                    let body = item
                        .body_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(inline)".to_string());
                    println!("{}  expired_at={}  body={}", item.key, item.expires_at, body);
                }
                println!("{} expired entr{}", expired.len(), plural_y(expired.len()));
            }
        }
        Commands::Reservations => {
            let count = cache
                .reservation_count()
                .context("counting reservations")?;
            println!("{} queued reservation(s)", count);
        }
        Commands::Flush { yes } => {
            if !yes {
                bail!("refusing to flush without --yes");
            }
            cache.clear().context("flushing cache store")?;
            println!("cache store flushed");
        }
    }
    Ok(())
}

fn plural_y(n: usize) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}
