//! `coupons` command handlers.

use clap::Subcommand;

/// Sub-commands available under `coupons`.
#[derive(Debug, Subcommand)]
pub enum CouponCommands {
    /// Create sample 10%-off coupons with generated codes
    Seed {
        /// Number of coupons to create
        #[arg(long, default_value = "10")]
        num: usize,
    },
}

pub(crate) async fn run_coupons_seed(pool: &sqlx::PgPool, num: usize) -> anyhow::Result<()> {
    if num == 0 {
        anyhow::bail!("--num must be at least 1");
    }
    let codes = shopfront_db::seed_coupons(pool, num).await?;
    tracing::info!(created = codes.len(), "coupons seeded");
    for code in &codes {
        println!("{code}");
    }
    Ok(())
}
