mod coupons;
mod db;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::coupons::CouponCommands;
use crate::db::DbCommands;

#[derive(Debug, Parser)]
#[command(name = "shopfront-cli")]
#[command(about = "Shopfront command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Coupon management
    Coupons {
        #[command(subcommand)]
        command: CouponCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("shopfront-cli: run with --help to list commands");
        return Ok(());
    };

    let config = shopfront_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // A dry-run seed only reads the catalog file.
    if let Commands::Db {
        command: DbCommands::Seed {
            catalog,
            dry_run: true,
        },
    } = &command
    {
        return db::run_db_seed_dry_run(&catalog_path(catalog.as_ref(), &config));
    }

    let pool_config = shopfront_db::PoolConfig::from_app_config(&config);
    let pool = shopfront_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => db::run_db_ping(&pool).await?,
            DbCommands::Migrate => db::run_db_migrate(&pool).await?,
            DbCommands::Seed { catalog, .. } => {
                db::run_db_seed(&pool, &catalog_path(catalog.as_ref(), &config)).await?;
            }
        },
        Commands::Coupons { command } => match command {
            CouponCommands::Seed { num } => coupons::run_coupons_seed(&pool, num).await?,
        },
    }

    Ok(())
}

fn catalog_path(flag: Option<&PathBuf>, config: &shopfront_core::AppConfig) -> PathBuf {
    flag.cloned().unwrap_or_else(|| config.catalog_path.clone())
}

#[cfg(test)]
mod tests;
