use std::path::Path;

use super::*;

#[test]
fn parses_db_ping_command() {
    let cli =
        Cli::try_parse_from(["shopfront-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["shopfront-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_db_seed_defaults() {
    let cli =
        Cli::try_parse_from(["shopfront-cli", "db", "seed"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Seed {
                catalog: None,
                dry_run: false
            }
        })
    ));
}

#[test]
fn parses_db_seed_with_catalog_and_dry_run() {
    let cli = Cli::try_parse_from([
        "shopfront-cli",
        "db",
        "seed",
        "--catalog",
        "/tmp/catalog.yaml",
        "--dry-run",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Seed {
                catalog: Some(ref path),
                dry_run: true
            }
        }) if path == Path::new("/tmp/catalog.yaml")
    ));
}

#[test]
fn coupons_seed_defaults_to_ten() {
    let cli = Cli::try_parse_from(["shopfront-cli", "coupons", "seed"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Coupons {
            command: CouponCommands::Seed { num: 10 }
        })
    ));
}

#[test]
fn coupons_seed_accepts_num() {
    let cli = Cli::try_parse_from(["shopfront-cli", "coupons", "seed", "--num", "3"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Coupons {
            command: CouponCommands::Seed { num: 3 }
        })
    ));
}

#[test]
fn coupons_seed_rejects_non_numeric_num() {
    let result = Cli::try_parse_from(["shopfront-cli", "coupons", "seed", "--num", "many"]);
    assert!(result.is_err());
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["shopfront-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn plan_seed_counts_shipped_catalog() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/catalog.yaml");
    let schema = shopfront_core::load_catalog_schema(&path).expect("shipped catalog loads");

    let plan = db::plan_seed(&schema);

    assert_eq!(plan.attributes, 12);
    assert_eq!(plan.categories, 6);
    assert_eq!(plan.collections, 2);
    assert_eq!(plan.product_types, 6);
    assert_eq!(plan.products, 11);
    // 3 shirts x 6 sizes, 2 mugs, 2 coffees x 4 boxes, 2 candies x 3 boxes,
    // 1 e-book, 1 book x 2 covers.
    assert_eq!(plan.variants, 18 + 2 + 8 + 6 + 1 + 2);
}
