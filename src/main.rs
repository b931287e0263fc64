use anyhow::{Context, Result};
use clap::Parser;
use common::cli::{CommonArgs, utils};
use sweeper::{ReferenceDb, Sweeper};

#[derive(Parser, Debug)]
#[command(name = "blobsweep")]
#[command(about = "Reconciles the content-addressed store against the reference database")]
#[command(version)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Execute deletions instead of the default dry run
    #[arg(long)]
    live: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    utils::init_logging(&args.common);

    let mut config = utils::load_config(args.common.config.as_ref())?;
    if args.live {
        config.sweep.dry_run = false;
    }

    // Unusable configuration aborts before anything has started.
    utils::validate_config(&config).context("Invalid configuration")?;

    log::info!("Loaded configuration:");
    log::info!("  Database DSN: {}", config.database.dsn);
    log::info!("  Storage DSN: {}", config.storage.dsn);
    log::info!(
        "  Inventory: {} (prefix '{}')",
        config.inventory.dsn,
        config.inventory.prefix
    );
    log::info!(
        "  Mode: {}, grace period {:?}",
        if config.sweep.dry_run { "dry run" } else { "live" },
        config.sweep.grace_period
    );

    let db = ReferenceDb::connect(&config.database.dsn)
        .await
        .context("Failed to connect to reference database")?;

    let data_store = common::storage::object_store_from_dsn(&config.storage.dsn)
        .context("Failed to initialize data object store")?;
    let inventory_store = common::storage::object_store_from_dsn(&config.inventory.dsn)
        .context("Failed to initialize inventory object store")?;

    let sweeper = Sweeper::new(
        db,
        data_store,
        inventory_store,
        config.inventory.prefix.clone(),
        config.sweep.clone(),
    )
    .await
    .context("Failed to initialize sweeper")?;

    let summary = sweeper.run().await?;
    summary.log();

    Ok(())
}
