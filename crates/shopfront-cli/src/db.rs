//! `db` command handlers: connectivity check, migrations, and catalog seeding.
//!
//! Called from `main` after the pool is established, except the dry-run seed
//! which never touches the database.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use shopfront_core::CatalogSchema;
use shopfront_db::SeedSummary;

/// Sub-commands available under `db`.
#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Load the seed catalog (attributes, categories, collections, products)
    Seed {
        /// Catalog YAML file; defaults to SHOPFRONT_CATALOG_PATH
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Validate the catalog and print what would be created
        #[arg(long)]
        dry_run: bool,
    },
}

pub(crate) async fn run_db_ping(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    shopfront_db::health_check(pool).await?;
    println!("database reachable");
    Ok(())
}

pub(crate) async fn run_db_migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let applied = shopfront_db::run_migrations(pool).await?;
    tracing::info!(applied, "migrations complete");
    println!("applied {applied} migration(s)");
    Ok(())
}

/// Seed the catalog. Titles that already exist are reused, so running the
/// seed twice does not duplicate attributes, categories, or collections.
///
/// # Errors
///
/// Returns an error if the catalog file is invalid or any insert fails; the
/// whole seed is rolled back in that case.
pub(crate) async fn run_db_seed(pool: &sqlx::PgPool, catalog: &Path) -> anyhow::Result<()> {
    let schema = shopfront_core::load_catalog_schema(catalog)?;
    let summary = shopfront_db::seed_catalog(pool, &schema).await?;
    tracing::info!(
        catalog = %catalog.display(),
        products = summary.products,
        variants = summary.variants,
        "catalog seeded"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub(crate) fn run_db_seed_dry_run(catalog: &Path) -> anyhow::Result<()> {
    let schema = shopfront_core::load_catalog_schema(catalog)?;
    let plan = plan_seed(&schema);
    println!("[dry-run] {} would seed:", catalog.display());
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// Counts a seed of `schema` would create on an empty database.
pub(crate) fn plan_seed(schema: &CatalogSchema) -> SeedSummary {
    let value_counts: HashMap<&str, usize> = schema
        .attributes
        .iter()
        .map(|a| (a.title.as_str(), a.values.len()))
        .collect();

    let mut summary = SeedSummary {
        attributes: schema.attributes.len(),
        categories: schema.categories.len(),
        collections: schema.collections.len(),
        product_types: schema.product_types.len(),
        ..SeedSummary::default()
    };

    for product_type in &schema.product_types {
        // No combinations still yields one default variant per product.
        let combinations = if product_type.has_variants
            && !product_type.variant_attributes.is_empty()
        {
            product_type
                .variant_attributes
                .iter()
                .map(|title| value_counts.get(title.as_str()).copied().unwrap_or(0))
                .product::<usize>()
        } else {
            0
        };
        let per_product = combinations.max(1);
        summary.products += product_type.products.len();
        summary.variants += product_type.products.len() * per_product;
    }

    summary
}
