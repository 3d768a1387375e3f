//! rawdb Tool Binary
//!
//! Bulk-loads a directory tree into a LevelDB-format database, or checks
//! one that was built earlier.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use crossbeam::channel;
use rawdb::{BlockPackingPolicy, Database, Options, RawDb};
use tracing_subscriber::{fmt, EnvFilter};

/// rawdb Tool
#[derive(Parser, Debug)]
#[command(name = "rawdb-tool")]
#[command(about = "Build and verify LevelDB-format databases offline")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load every file under SOURCE: relative path → key, contents → value
    Import {
        /// Directory tree to load
        source: PathBuf,

        /// Output database directory
        output: PathBuf,

        /// Producer threads and table builders
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Target table size in KB of compressed values
        #[arg(short = 't', long, default_value = "64")]
        table_kb: u64,

        /// Data block packing
        #[arg(short, long, value_enum, default_value = "record")]
        packing: Packing,
    },

    /// Open a database, read every entry and check ordering and checksums
    Verify {
        /// Database directory
        path: PathBuf,

        /// Also look up one key and print its value length
        #[arg(short, long)]
        key: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Packing {
    /// One compressed block per record
    Record,
    /// Many records per block
    Batched,
}

impl From<Packing> for BlockPackingPolicy {
    fn from(packing: Packing) -> Self {
        match packing {
            Packing::Record => BlockPackingPolicy::RecordPerBlock,
            Packing::Batched => BlockPackingPolicy::Batched,
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rawdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::info!("rawdb-tool v{}", rawdb::VERSION);

    let outcome = match args.command {
        Commands::Import {
            source,
            output,
            concurrency,
            table_kb,
            packing,
        } => {
            let mut builder = Options::builder()
                .max_table_size(table_kb * 1024)
                .block_packing(packing.into());
            if let Some(n) = concurrency {
                builder = builder.concurrency(n);
            }
            import(&source, &output, builder.build())
        }
        Commands::Verify { path, key } => verify(&path, key.as_deref()),
    };

    if let Err(e) = outcome {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn import(source: &Path, output: &Path, options: Options) -> rawdb::Result<()> {
    let started = Instant::now();
    let files = collect_files(source)?;
    tracing::info!("Importing {} files from {}", files.len(), source.display());

    let concurrency = options.concurrency;
    let db = RawDb::open(output, options)?;

    let (tx, rx) = channel::bounded::<&PathBuf>(concurrency + 1);
    crossbeam::thread::scope(|s| {
        for _ in 0..concurrency {
            let rx = rx.clone();
            let db = &db;
            s.spawn(move |_| {
                for path in rx {
                    let Ok(relative) = path.strip_prefix(source) else {
                        continue;
                    };
                    match fs::read(path) {
                        Ok(value) => db.put(relative.to_string_lossy().as_bytes(), &value),
                        Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
                    }
                }
            });
        }
        for path in &files {
            if tx.send(path).is_err() {
                break;
            }
        }
        drop(tx);
    })
    .map_err(|_| rawdb::RawDbError::IngestFailed)?;

    tracing::info!("Ingested {} records, building tables", db.sequence());

    let mut reported = 0;
    db.close_with_progress(|fraction| {
        let percent = (fraction * 100.0) as u32;
        if percent >= reported + 10 || percent == 100 {
            reported = percent;
            tracing::info!("Close progress: {}%", percent);
        }
    })?;

    tracing::info!(
        "Built {} in {:.2?}",
        output.display(),
        started.elapsed()
    );
    Ok(())
}

/// Every regular file under `root`, sorted for a stable walk order
fn collect_files(root: &Path) -> rawdb::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn verify(path: &Path, key: Option<&str>) -> rawdb::Result<()> {
    let db = Database::open(path)?;
    let report = db.verify()?;

    tracing::info!("Manifest: {}", db.manifest());
    tracing::info!(
        "Tables: {}, blocks: {}, entries: {}, distinct keys: {}, bytes: {}",
        report.tables,
        report.blocks,
        report.entries,
        report.distinct_keys,
        report.bytes
    );
    tracing::info!(
        "Last sequence: {}, next file: {}, log: {}",
        db.last_sequence(),
        db.next_file_number(),
        db.log_number()
    );

    if let Some(key) = key {
        match db.get(key.as_bytes())? {
            Some(value) => println!("{}: {} bytes", key, value.len()),
            None => println!("{}: (not found)", key),
        }
    }
    Ok(())
}
