//! slotdb - page-based heap storage engine tools

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use slotdb::access::Value;
use slotdb::config::StorageConfig;
use slotdb::database::Database;
use slotdb::storage::page::Page;
use slotdb::storage::{PageFileManager, PageId, ReplacerKind, WriterConfig};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header and records of a page in a heap file
    Inspect {
        /// Heap file to read
        file: PathBuf,

        /// Page number to print; every page when omitted
        #[arg(short, long)]
        page: Option<u32>,
    },

    /// Insert rows into a demo table with background flushing enabled
    Load {
        /// Data directory
        #[arg(short = 'D', long, default_value = "./slotdb_data")]
        data_dir: PathBuf,

        /// Number of rows to insert
        #[arg(
            short,
            long,
            default_value = "1000",
            value_parser = clap::value_parser!(u32).range(..=i32::MAX as i64)
        )]
        rows: u32,

        /// Buffer pool capacity in pages
        #[arg(short = 'c', long, default_value = "64")]
        capacity: usize,

        /// Page replacement policy
        #[arg(long, value_enum, default_value_t = ReplacerKind::Clock)]
        replacer: ReplacerKind,

        /// Background writer interval in milliseconds
        #[arg(long, default_value = "1000")]
        writer_interval_ms: u64,

        /// Checkpoint interval in milliseconds
        #[arg(long, default_value = "10000")]
        checkpoint_interval_ms: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Inspect { file, page } => inspect(&file, page),
        Command::Load {
            data_dir,
            rows,
            capacity,
            replacer,
            writer_interval_ms,
            checkpoint_interval_ms,
        } => {
            let config = StorageConfig {
                pool_capacity: capacity,
                replacer,
                writer: WriterConfig {
                    writer_interval: Duration::from_millis(writer_interval_ms),
                    checkpoint_interval: Duration::from_millis(checkpoint_interval_ms),
                    ..WriterConfig::default()
                },
            };
            load(data_dir, rows, config)
        }
    }
}

fn inspect(file: &Path, page: Option<u32>) -> Result<()> {
    let manager = PageFileManager::new();
    let num_pages = manager
        .num_pages(file)
        .with_context(|| format!("Failed to stat {:?}", file))?;

    let pages: Vec<u32> = match page {
        Some(n) if n >= num_pages => bail!("{:?} has {} pages, no page {}", file, num_pages, n),
        Some(n) => vec![n],
        None => (0..num_pages).collect(),
    };

    println!("{}: {} pages", file.display(), num_pages);
    for n in pages {
        let heap_page = manager.read(PageId(n), file)?;
        println!(
            "page {}: size={} lower={} upper={} free={}",
            n,
            heap_page.size(),
            heap_page.lower(),
            heap_page.upper(),
            heap_page.free_space()?
        );
        for (index, record) in heap_page.records().enumerate() {
            println!("  [{}] {} bytes: {:02x?}", index, record.len(), record);
        }
    }
    Ok(())
}

fn load(data_dir: PathBuf, rows: u32, config: StorageConfig) -> Result<()> {
    let db = Database::open(&data_dir, config)?;
    // Earlier runs in the same directory left rows behind; keep appending
    let existing = if db.catalog().table("demo").is_ok() {
        db.select("demo", &["id"])?.len()
    } else {
        db.create_table(
            "demo",
            &[
                ("id", "integer"),
                ("score", "bigint"),
                ("even", "boolean"),
                ("label", "varchar"),
            ],
        )?;
        0
    };

    let started = Instant::now();
    for n in 0..rows as usize {
        let i = existing + n;
        let id = i32::try_from(i).context("Row id does not fit an integer column")?;
        db.insert(
            "demo",
            &[
                Value::Integer(id),
                Value::Long(i64::from(id) * 1_000),
                Value::Boolean(i % 2 == 0),
                Value::Text(format!("row-{}", i)),
            ],
        )?;
    }
    info!("inserted {} rows in {:?}", rows, started.elapsed());

    let selected = db.select("demo", &["id", "label"])?;
    if selected.len() != existing + rows as usize {
        bail!(
            "Selected {} rows, expected {}",
            selected.len(),
            existing + rows as usize
        );
    }
    if let Some(last) = selected.last() {
        let rendered: Vec<String> = last.iter().map(Value::to_string).collect();
        println!("last row: {}", rendered.join(", "));
    }

    let pages = db.catalog().table("demo")?.pages_count;
    let flushed = db.close()?;
    println!(
        "{} rows across {} pages, final drain wrote {} pages",
        selected.len(),
        pages,
        flushed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_must_fit_integer_ids() {
        let args = Args::try_parse_from(["slotdb", "load", "--rows", "2147483647"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Load { rows: 2147483647, .. }
        ));

        assert!(Args::try_parse_from(["slotdb", "load", "--rows", "2147483648"]).is_err());
        assert!(Args::try_parse_from(["slotdb", "load", "--rows", "-1"]).is_err());
    }

    #[test]
    fn test_inspect_page_flag() {
        let args = Args::try_parse_from(["slotdb", "inspect", "heap.dat", "--page", "3"]).unwrap();
        match args.command {
            Command::Inspect { file, page } => {
                assert_eq!(file, PathBuf::from("heap.dat"));
                assert_eq!(page, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
