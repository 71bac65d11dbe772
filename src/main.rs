//! Value Cache Workload Runner
//!
//! Replays a deterministic collection and query workload against a value
//! cache backed by an in-memory history store, then prints the cache
//! statistics.
//!
//! ```text
//! ┌────────────┐  add_value   ┌────────────┐  backfill  ┌──────────────────┐
//! │  Workload  │─────────────▶│ ValueCache │───────────▶│ In-memory store  │
//! │  (rounds)  │◀─────────────│            │            │ (seeded history) │
//! └────────────┘  get_values  └────────────┘            └──────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use valuecache::cache::{Clock, ManualClock, SystemClock};
use valuecache::config::parse_size;
use valuecache::{
    CacheConfig, CacheStats, Error, HistoryRecord, HistoryStore, InMemoryHistoryStore, ItemId,
    Result, Timespec, ValueCache, ValueType,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Output format for the final statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Prometheus,
}

/// Value cache workload runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML cache configuration file
    #[arg(long, env = "VALUECACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Cache size (e.g. 8M); overrides the config file, 0 disables the cache
    #[arg(long, env = "VALUECACHE_SIZE")]
    cache_size: Option<String>,

    /// Number of items to simulate
    #[arg(long, env = "VALUECACHE_ITEMS", default_value = "100")]
    items: u64,

    /// Seeded history per item (values)
    #[arg(long, env = "VALUECACHE_HISTORY", default_value = "600")]
    history: i64,

    /// Collection interval in seconds
    #[arg(long, env = "VALUECACHE_INTERVAL", default_value = "10")]
    interval: i64,

    /// Number of collection rounds
    #[arg(long, env = "VALUECACHE_ROUNDS", default_value = "360")]
    rounds: u64,

    /// Time window of the by-time queries in seconds
    #[arg(long, env = "VALUECACHE_WINDOW", default_value = "3600")]
    window: i64,

    /// Number of values requested by the by-count queries
    #[arg(long, env = "VALUECACHE_COUNT", default_value = "10")]
    count: usize,

    /// Cross-check every cached answer against the history store
    #[arg(long, env = "VALUECACHE_VERIFY")]
    verify: bool,

    /// Output format
    #[arg(long, value_enum, env = "VALUECACHE_OUTPUT", default_value = "text")]
    output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = load_config(&args)?;
    info!("Starting value cache workload");
    info!("  Cache size: {} bytes", config.size);
    info!("  Items: {}", args.items);
    info!("  Rounds: {}", args.rounds);
    info!("  Interval: {}s", args.interval);

    if args.interval <= 0 {
        return Err(Error::Config("interval must be positive".to_string()));
    }

    let start = SystemClock.now();
    let clock = Arc::new(ManualClock::new(start));
    let store = Arc::new(InMemoryHistoryStore::new());
    seed_history(&store, &args, start);

    let cache = ValueCache::with_clock(&config, store.clone(), clock.clone());
    let mut workload = Workload {
        args: &args,
        cache: &cache,
        store: &store,
        report: WorkloadReport::default(),
    };

    for round in 1..=args.rounds {
        clock.advance(args.interval);
        workload.run_round(round, clock.now())?;
    }

    workload.report.stats = match cache.statistics() {
        Ok(stats) => Some(stats),
        Err(Error::Disabled) => None,
        Err(e) => return Err(e),
    };

    if workload.report.mismatches > 0 {
        warn!(
            mismatches = workload.report.mismatches,
            "cached answers differ from the history store"
        );
    }

    print_report(&workload.report, args.output)?;

    if cache.is_enabled() {
        cache.clear()?;
    }

    info!("Workload complete");
    Ok(())
}

fn load_config(args: &Args) -> Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_yaml_file(path)?,
        None => CacheConfig::default(),
    };

    if let Some(size) = &args.cache_size {
        config.size = usize::try_from(parse_size(size)?)
            .map_err(|_| Error::SizeParse(format!("size too large: {}", size)))?;
    }

    config.validate()?;
    Ok(config)
}

fn seed_history(store: &InMemoryHistoryStore, args: &Args, start: i64) {
    for itemid in 0..args.items {
        store.insert_many(
            itemid,
            (0..args.history).map(|i| {
                let sec = start - (args.history - i) * args.interval;
                HistoryRecord::float(sec, 0, sample(itemid, sec))
            }),
        );
    }
}

/// Deterministic sample value of an item at a second
fn sample(itemid: ItemId, sec: i64) -> f64 {
    ((itemid as i64 * 31 + sec) % 1000) as f64 / 10.0
}

// =============================================================================
// Workload
// =============================================================================

#[derive(Debug, Default, Serialize)]
struct WorkloadReport {
    rounds: u64,
    values_added: u64,
    queries: u64,
    /// Requests answered from the store because the cache could not serve them
    fallbacks: u64,
    /// Cached answers that differed from the store
    mismatches: u64,
    stats: Option<CacheStats>,
}

struct Workload<'a> {
    args: &'a Args,
    cache: &'a ValueCache,
    store: &'a InMemoryHistoryStore,
    report: WorkloadReport,
}

impl Workload<'_> {
    fn run_round(&mut self, round: u64, now: i64) -> Result<()> {
        let cache = self.cache;
        let batch = cache.lock().ok();

        for itemid in 0..self.args.items {
            let record = HistoryRecord::float(now, 0, sample(itemid, now));
            self.store.insert(itemid, record.clone());
            self.report.values_added += 1;

            if let Err(e) = cache.add_value(itemid, ValueType::Float, record) {
                self.fallback_or(e)?;
            }
        }

        drop(batch);

        for itemid in 0..self.args.items {
            self.query_by_time(itemid, now)?;

            if (itemid + round) % 10 == 0 {
                self.query_by_count(itemid, now)?;
            }
            if (itemid + round) % 25 == 0 {
                let ts = Timespec::new(now - self.args.window / 2, 0);
                self.query_point(itemid, ts)?;
            }
        }

        self.report.rounds = round;
        Ok(())
    }

    fn fallback_or(&mut self, e: Error) -> Result<()> {
        if e.is_fallback() {
            self.report.fallbacks += 1;
            Ok(())
        } else {
            Err(e)
        }
    }

    fn query_by_time(&mut self, itemid: ItemId, now: i64) -> Result<()> {
        self.report.queries += 1;
        let window = self.args.window;

        let values = match self
            .cache
            .get_values_by_time(itemid, ValueType::Float, window, now)
        {
            Ok(values) => values,
            Err(e) => return self.fallback_or(e),
        };

        if self.args.verify {
            let mut expected = self
                .store
                .read_by_time(itemid, ValueType::Float, window, now)?;
            expected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            self.check(itemid, &values, &expected);
        }
        Ok(())
    }

    fn query_by_count(&mut self, itemid: ItemId, now: i64) -> Result<()> {
        self.report.queries += 1;
        let count = self.args.count;

        let values = match self
            .cache
            .get_values_by_count(itemid, ValueType::Float, count, now)
        {
            Ok(values) => values,
            Err(e) => return self.fallback_or(e),
        };

        if self.args.verify {
            let mut expected = self
                .store
                .read_by_count(itemid, ValueType::Float, count, now, now)?;
            expected.truncate(count);
            self.check(itemid, &values, &expected);
        }
        Ok(())
    }

    fn query_point(&mut self, itemid: ItemId, ts: Timespec) -> Result<()> {
        self.report.queries += 1;

        let value = match self.cache.get_value(itemid, ValueType::Float, ts) {
            Ok(value) => Some(value),
            Err(Error::NotFound) => None,
            Err(e) => return self.fallback_or(e),
        };

        if self.args.verify {
            let expected = self
                .store
                .read_point_or_before(itemid, ValueType::Float, ts)?;
            self.check(itemid, value.as_slice(), expected.as_slice());
        }
        Ok(())
    }

    fn check(&mut self, itemid: ItemId, cached: &[HistoryRecord], expected: &[HistoryRecord]) {
        if cached != expected {
            self.report.mismatches += 1;
            warn!(
                itemid,
                cached = cached.len(),
                expected = expected.len(),
                "cached answer differs from the history store"
            );
        }
    }
}

// =============================================================================
// Output
// =============================================================================

fn print_report(report: &WorkloadReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Prometheus => match &report.stats {
            Some(stats) => print!("{}", stats.render_prometheus()?),
            None => println!("# value cache disabled"),
        },
        OutputFormat::Text => {
            println!("rounds:        {}", report.rounds);
            println!("values added:  {}", report.values_added);
            println!("queries:       {}", report.queries);
            println!("fallbacks:     {}", report.fallbacks);
            println!("mismatches:    {}", report.mismatches);
            match &report.stats {
                Some(stats) => {
                    println!("hits:          {}", stats.hits);
                    println!("misses:        {}", stats.misses);
                    println!("hit ratio:     {:.3}", stats.hit_ratio());
                    println!("low memory:    {}", stats.low_memory);
                    println!("items:         {}", stats.items);
                    println!(
                        "memory:        {} / {} bytes ({} free)",
                        stats.used_size,
                        stats.total_size,
                        stats.free_size()
                    );
                }
                None => println!("cache:         disabled"),
            }
        }
    }
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // logs go to stderr so the report on stdout stays parseable
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
