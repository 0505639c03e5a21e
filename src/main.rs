//! Asset Cache CLI
//!
//! Inspect and maintain an on-disk asset cache.
//!
//! ```text
//! asset-cache --cache-dir DIR stats
//! asset-cache --cache-dir DIR put props/crate.ydr crate.bin --vertex-count 24
//! asset-cache --cache-dir DIR get props/crate.ydr --out crate.bin
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use asset_cache::store::CompressionConfig;
use asset_cache::{
    AssetCache, CacheConfig, CacheEntryInput, FileStore, FileStoreConfig, MeshMetadata,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Asset Cache - inspect and maintain a decoded-asset cache directory
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache root directory
    #[arg(long, env = "ASSET_CACHE_DIR", default_value = ".asset-cache")]
    cache_dir: PathBuf,

    /// Capacity in MiB
    #[arg(long, env = "ASSET_CACHE_CAPACITY_MB", default_value = "500")]
    capacity_mb: u64,

    /// Fraction of capacity eviction drives the total down to
    #[arg(long, env = "ASSET_CACHE_HEADROOM", default_value = "0.8")]
    headroom: f64,

    /// Entries older than this many hours read as absent
    #[arg(long, env = "ASSET_CACHE_STALENESS_HOURS", default_value = "168")]
    staleness_hours: u64,

    /// Payload format tag
    #[arg(long, env = "ASSET_CACHE_SCHEMA_VERSION", default_value = "mesh-v1")]
    schema_version: String,

    /// Store payloads uncompressed
    #[arg(long, env = "ASSET_CACHE_NO_COMPRESSION")]
    no_compression: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ASSET_CACHE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "ASSET_CACHE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print entry stats and session metrics as JSON
    Stats,

    /// Look up an entry
    Get {
        key: String,

        /// Expected content hash; a mismatch reads as a miss
        #[arg(long)]
        hash: Option<String>,

        /// Write the payload to this file instead of printing a summary
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Store a file's bytes under a key
    Put {
        key: String,
        file: PathBuf,

        #[arg(long, default_value = "0")]
        vertex_count: u32,

        #[arg(long, default_value = "0")]
        face_count: u32,

        #[arg(long)]
        has_normals: bool,

        #[arg(long)]
        has_uvs: bool,
    },

    /// Remove an entry
    Delete { key: String },

    /// Remove every entry
    Clear,

    /// Remove entries past the staleness window
    Purge,
}

impl Args {
    fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity_bytes: self.capacity_mb.saturating_mul(1024 * 1024),
            headroom: self.headroom,
            staleness_window: Duration::from_secs(self.staleness_hours.saturating_mul(3600)),
            schema_version: self.schema_version.clone(),
        }
    }

    fn store_config(&self) -> FileStoreConfig {
        let mut config = FileStoreConfig::new(&self.cache_dir);
        if self.no_compression {
            config.compression = CompressionConfig::disabled();
        }
        config
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let store = Arc::new(FileStore::with_config(args.store_config()));
    let cache = AssetCache::with_config(store, args.cache_config())
        .context("invalid cache configuration")?;

    cache
        .init()
        .await
        .with_context(|| format!("cache at {} is unavailable", args.cache_dir.display()))?;

    match args.command {
        Command::Stats => {
            let report = serde_json::json!({
                "stats": cache.stats().await?,
                "metrics": cache.metrics(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Get { key, hash, out } => {
            let Some(entry) = cache.get(&key, hash.as_deref()).await? else {
                bail!("no usable entry for {}", key);
            };
            match out {
                Some(path) => {
                    tokio::fs::write(&path, &entry.payload)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("Wrote {} bytes to {}", entry.size_bytes, path.display());
                }
                None => {
                    let summary = serde_json::json!({
                        "identityKey": entry.identity_key,
                        "contentHash": entry.content_hash,
                        "sizeBytes": entry.size_bytes,
                        "createdAt": entry.created_at,
                        "schemaVersion": entry.schema_version,
                        "metadata": entry.metadata,
                    });
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
            }
        }

        Command::Put {
            key,
            file,
            vertex_count,
            face_count,
            has_normals,
            has_uvs,
        } => {
            let payload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let metadata = MeshMetadata {
                vertex_count,
                face_count,
                has_normals,
                has_uvs,
                ..MeshMetadata::default()
            };
            let input = CacheEntryInput::new(key, payload.into(), metadata);
            println!("{}", input.content_hash);
            cache.set(input).await?;
        }

        Command::Delete { key } => cache.delete(&key).await?,

        Command::Clear => cache.clear().await?,

        Command::Purge => {
            let purged = cache.purge_expired().await?;
            println!("{}", purged);
        }
    }

    let metrics = cache.metrics();
    if metrics.read_failures > 0 || metrics.write_failures > 0 {
        warn!(
            "Session saw {} read and {} write failures",
            metrics.read_failures, metrics.write_failures
        );
    }

    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so command output stays machine-readable
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
