//! CLI driver: replay a SQLite feed log into depth quotes.
//!
//! Reads the `messages` table of a log database, reconstructs order books,
//! and writes the `orders` mirror and `quotes` rows back into the same
//! database (created when missing).
//!
//! # Usage
//!
//! ```bash
//! # Replay one pair with defaults (one-minute buckets, standard sizes)
//! cargo run --release --bin replay_quotes -- \
//!     --db data/app.db --venue "Mango Markets" --instrument SOL/USDC
//!
//! # Custom buckets and target sizes
//! cargo run --release --bin replay_quotes -- \
//!     --db data/app.db --bucket-secs 30 --sizes 1000,5000,20000
//!
//! # Keep a JSON report of data-quality warnings
//! cargo run --release --bin replay_quotes -- \
//!     --db data/app.db --warnings-out warnings.json
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use l3_depth_quoter::{Pipeline, QuoterConfig, Pair, SqliteLogSource, SqliteStore};

/// Command-line arguments
struct Args {
    /// SQLite database holding the messages log (also receives output)
    db: PathBuf,
    /// Venue filter (requires --instrument)
    venue: Option<String>,
    /// Instrument filter (requires --venue)
    instrument: Option<String>,
    /// Bucket width in seconds
    bucket_secs: Option<i64>,
    /// Target notional sizes
    sizes: Option<Vec<f64>>,
    /// Where to write the warning report, if requested
    warnings_out: Option<PathBuf>,
}

fn parse_args() -> std::result::Result<Args, String> {
    let args: Vec<String> = env::args().collect();

    let mut db: Option<PathBuf> = None;
    let mut venue: Option<String> = None;
    let mut instrument: Option<String> = None;
    let mut bucket_secs: Option<i64> = None;
    let mut sizes: Option<Vec<f64>> = None;
    let mut warnings_out: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                i += 1;
                if i >= args.len() {
                    return Err("--db requires a path".to_string());
                }
                db = Some(PathBuf::from(&args[i]));
            }
            "--venue" => {
                i += 1;
                if i >= args.len() {
                    return Err("--venue requires a value".to_string());
                }
                venue = Some(args[i].clone());
            }
            "--instrument" => {
                i += 1;
                if i >= args.len() {
                    return Err("--instrument requires a value".to_string());
                }
                instrument = Some(args[i].clone());
            }
            "--bucket-secs" => {
                i += 1;
                if i >= args.len() {
                    return Err("--bucket-secs requires a value".to_string());
                }
                let secs = args[i]
                    .parse()
                    .map_err(|_| format!("invalid bucket width: {}", args[i]))?;
                bucket_secs = Some(secs);
            }
            "--sizes" => {
                i += 1;
                if i >= args.len() {
                    return Err("--sizes requires a comma-separated list".to_string());
                }
                let parsed: std::result::Result<Vec<f64>, _> =
                    args[i].split(',').map(str::parse).collect();
                sizes = Some(parsed.map_err(|_| format!("invalid sizes: {}", args[i]))?);
            }
            "--warnings-out" => {
                i += 1;
                if i >= args.len() {
                    return Err("--warnings-out requires a path".to_string());
                }
                warnings_out = Some(PathBuf::from(&args[i]));
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg => {
                // Positional argument: the database path
                if db.is_none() {
                    db = Some(PathBuf::from(arg));
                } else {
                    return Err(format!("Unknown argument: {}", arg));
                }
            }
        }
        i += 1;
    }

    if venue.is_some() != instrument.is_some() {
        return Err("--venue and --instrument must be given together".to_string());
    }

    let db = db.ok_or("Database path is required")?;

    Ok(Args {
        db,
        venue,
        instrument,
        bucket_secs,
        sizes,
        warnings_out,
    })
}

fn print_help() {
    eprintln!(
        r#"
Replay Depth Quotes

Replays the `messages` feed log of a SQLite database into reconstructed
order books and bucketed liquidity-depth quotes (`orders` and `quotes`
tables in the same database).

USAGE:
    replay_quotes [OPTIONS] --db <PATH>
    replay_quotes <DB>

OPTIONS:
    -d, --db <PATH>           SQLite database with the messages log
        --venue <NAME>        Process only this venue (with --instrument)
        --instrument <NAME>   Process only this instrument (with --venue)
        --bucket-secs <N>     Quote bucket width in seconds (default: 60)
        --sizes <LIST>        Comma-separated target notional sizes
                              (default: 1000,10000,25000,50000,100000)
        --warnings-out <PATH> Write a JSON report of data-quality warnings
    -h, --help                Print this help message

EXAMPLES:
    replay_quotes --db data/app.db --venue "Mango Markets" --instrument SOL/USDC
    replay_quotes data/app.db --bucket-secs 30 --sizes 1000,5000
"#
    );
}

fn run(args: Args) -> l3_depth_quoter::Result<()> {
    let filter = match (args.venue, args.instrument) {
        (Some(venue), Some(instrument)) => Some(Pair::new(venue, instrument)),
        _ => None,
    };

    let mut config = QuoterConfig::new();
    if let Some(secs) = args.bucket_secs {
        config = config.with_bucket_secs(secs);
    }
    if let Some(sizes) = args.sizes {
        config = config.with_target_sizes(sizes);
    }
    if let Some(pair) = filter.clone() {
        config = config.with_pair_filter(pair);
    }

    let store = SqliteStore::open(&args.db)?;
    let source = SqliteLogSource::new(&store, filter.as_ref())?;
    let mut pipeline = Pipeline::new(config, store)?;

    let start = Instant::now();
    let stats = pipeline.run(source)?;
    let elapsed = start.elapsed().as_secs_f64();

    println!("Replay complete in {:.1}s", elapsed);
    println!("  messages:        {}", stats.messages_seen);
    println!("  batches applied: {}", stats.batches_applied);
    println!("  snapshots:       {}", stats.snapshots_applied);
    println!("  quotes written:  {}", stats.quotes_written);
    println!("  commits:         {}", stats.commits);
    if stats.malformed_dropped > 0 || stats.batches_rejected > 0 {
        println!(
            "  dropped:         {} malformed, {} rejected batches",
            stats.malformed_dropped, stats.batches_rejected
        );
    }

    if let Some(path) = args.warnings_out {
        pipeline.warnings().export_to_file(&path)?;
        println!("Warning report written to {}", path.display());
    }

    Ok(())
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Replay failed: {}", e);
        std::process::exit(1);
    }
}
