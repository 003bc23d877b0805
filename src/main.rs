mod batch;
mod database;
mod discovery;
mod inventory;
mod reconcile;
mod registry;
mod subnet;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;

use batch::BatchRunner;
use batch::cache::{NoCache, ResultCache, SqliteCache};
use reconcile::Reconciler;
use registry::SqliteRegistry;

const DEFAULT_REGISTRY_PATH: &str = "/var/lib/subnet-feed/dhcp.sqlite";
const DEFAULT_CACHE_TTL_SECS: u64 = batch::cache::DEFAULT_CACHE_TTL.as_secs();
const DEFAULT_WORKERS: usize = batch::DEFAULT_WORKERS;
const DEFAULT_RETRY_PAUSE_MS: u64 = reconcile::DEFAULT_RETRY_PAUSE.as_millis() as u64;
const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 3;

#[derive(Parser, Debug)]
struct Args {
    // JSON device inventory, or a directory of <hostname>.cfg files.
    #[arg(long)]
    inventory: PathBuf,

    // DHCP registry snapshot, opened read-only.
    #[arg(long, default_value = DEFAULT_REGISTRY_PATH)]
    registry_db: PathBuf,

    // Result cache database. Caching is off when unset.
    #[arg(long)]
    cache_db: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_CACHE_TTL_SECS)]
    cache_ttl_secs: u64,

    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    #[arg(long, default_value_t = DEFAULT_RETRY_PAUSE_MS)]
    retry_pause_ms: u64,

    #[arg(long, default_value_t = DEFAULT_REGISTRY_TIMEOUT_SECS)]
    registry_timeout_secs: u64,

    // Where the JSON feed goes. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    std_logger::Config::logfmt().init();
    let args = Args::parse();

    let samples = inventory::load(&args.inventory).await?;

    let timeout = Duration::from_secs(args.registry_timeout_secs);
    let registry_conn = database::open_registry(&args.registry_db, timeout)?;
    let registry = SqliteRegistry::new(Arc::new(Mutex::new(registry_conn)), timeout);
    let reconciler =
        Reconciler::new(registry).retry_pause(Duration::from_millis(args.retry_pause_ms));

    match &args.cache_db {
        Some(path) => {
            let cache = SqliteCache::new(Arc::new(Mutex::new(database::open(path)?)));
            let purged = cache.purge_expired().await?;
            log::debug!("Purged {purged} expired cache entries");
            run(&args, reconciler, cache, samples).await
        }
        None => run(&args, reconciler, NoCache, samples).await,
    }
}

async fn run<C: ResultCache + 'static>(
    args: &Args,
    reconciler: Reconciler<SqliteRegistry>,
    cache: C,
    samples: Vec<inventory::DeviceConfigSample>,
) -> Result<()> {
    let runner = BatchRunner::new(reconciler, cache)
        .workers(args.workers)
        .cache_ttl(Duration::from_secs(args.cache_ttl_secs));

    let outcome = runner.run(samples).await;

    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Couldn't create feed {}", path.display()))?;
            outcome.write_feed(std::io::BufWriter::new(file))?;
            log::info!("Wrote feed to {}", path.display());
        }
        None => outcome.write_feed(std::io::stdout().lock())?,
    }

    Ok(())
}
