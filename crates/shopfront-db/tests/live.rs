//! Live integration tests for shopfront-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/shopfront-db/`), so `"../../migrations"` resolves to the
//! workspace migration directory.

use std::collections::HashMap;

use rust_decimal::Decimal;
use shopfront_core::forms::{
    AddressForm, AttributeForm, CategoryForm, CouponForm, ProductForm, ProductTypeForm,
    SiteSettingsForm, UserForm,
};
use shopfront_core::{
    AttributeMap, CoreError, CouponRejection, DiscountKind, ListingParams, OrderStatus,
    MAX_LINE_QUANTITY,
};
use shopfront_db::{
    add_to_cart, cancel_order, category_scope_ids, create_address, create_attribute,
    create_category, create_coupon, create_product, create_product_type, create_user,
    delete_address, get_coupon_by_code, get_site_settings, get_user_address, get_variant,
    list_cart_lines, list_scoped_products, list_user_addresses, list_variants, place_order,
    send_order, update_address, update_category, update_site_settings, CheckoutItem, DbError,
    ListingScope,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_test_user(pool: &sqlx::PgPool, name: &str) -> i64 {
    let form = UserForm {
        username: name.to_string(),
        email: format!("{name}@example.com"),
        is_active: true,
        is_admin: false,
    };
    create_user(pool, &form)
        .await
        .unwrap_or_else(|e| panic!("create_user failed for '{name}': {e}"))
        .id
}

/// A type with a two-value "Size" variant axis and one product of it.
/// Returns the product id.
async fn insert_sized_product(pool: &sqlx::PgPool, price: Decimal) -> i64 {
    let attribute = create_attribute(
        pool,
        &AttributeForm {
            title: "Size".to_string(),
            values: vec!["S".to_string(), "M".to_string()],
            product_type_ids: vec![],
        },
    )
    .await
    .expect("create attribute");

    let product_type = create_product_type(
        pool,
        &ProductTypeForm {
            title: "Shirt".to_string(),
            has_variants: true,
            is_shipping_required: true,
            product_attributes: vec![],
            variant_attributes: vec![attribute.id],
        },
    )
    .await
    .expect("create product type");

    create_product(pool, &product_form("Linen Shirt", price, product_type.id))
        .await
        .expect("create product")
        .id
}

fn product_form(title: &str, price: Decimal, product_type_id: i64) -> ProductForm {
    ProductForm {
        title: title.to_string(),
        description: String::new(),
        price,
        on_sale: true,
        is_featured: false,
        rating: Decimal::new(5, 0),
        sold_count: 0,
        review_count: 0,
        category_id: None,
        product_type_id,
        attributes: AttributeMap::new(),
    }
}

/// A type without variant axes; each product gets one default variant.
async fn insert_plain_type(pool: &sqlx::PgPool) -> i64 {
    create_product_type(
        pool,
        &ProductTypeForm {
            title: "Plain".to_string(),
            has_variants: false,
            is_shipping_required: true,
            product_attributes: vec![],
            variant_attributes: vec![],
        },
    )
    .await
    .expect("create product type")
    .id
}

async fn insert_category(pool: &sqlx::PgPool, title: &str, parent_id: Option<i64>) -> i64 {
    create_category(
        pool,
        &CategoryForm {
            title: title.to_string(),
            parent_id,
            background_img: None,
        },
    )
    .await
    .unwrap_or_else(|e| panic!("create_category failed for '{title}': {e}"))
    .id
}

async fn set_stock(pool: &sqlx::PgPool, variant_id: i64, quantity: i32) {
    sqlx::query("UPDATE product_variants SET quantity = $2 WHERE id = $1")
        .bind(variant_id)
        .bind(quantity)
        .execute(pool)
        .await
        .expect("set stock");
}

fn coupon_form(code: &str, usage_limit: Option<i32>) -> CouponForm {
    CouponForm {
        title: format!("Coupon {code}"),
        code: Some(code.to_string()),
        kind: DiscountKind::Fixed,
        value: Decimal::new(10, 0),
        usage_limit,
        min_amount: None,
        not_before: None,
        not_after: None,
        enabled: true,
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn create_product_expands_variant_combinations(pool: sqlx::PgPool) {
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;

    let variants = list_variants(&pool, product_id).await.expect("list variants");
    let skus: Vec<&str> = variants.iter().map(|v| v.sku.as_str()).collect();
    assert_eq!(
        skus,
        vec![
            format!("{product_id}-1337").as_str(),
            format!("{product_id}-1338").as_str()
        ]
    );
    assert_eq!(variants[0].title.as_deref(), Some("S"));
    assert_eq!(variants[1].title.as_deref(), Some("M"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn category_cannot_move_under_its_descendant(pool: sqlx::PgPool) {
    let root = create_category(
        &pool,
        &CategoryForm {
            title: "Clothing".to_string(),
            parent_id: None,
            background_img: None,
        },
    )
    .await
    .expect("create root");
    let child = create_category(
        &pool,
        &CategoryForm {
            title: "Shirts".to_string(),
            parent_id: Some(root.id),
            background_img: None,
        },
    )
    .await
    .expect("create child");

    let err = update_category(
        &pool,
        root.id,
        &CategoryForm {
            title: "Clothing".to_string(),
            parent_id: Some(child.id),
            background_img: None,
        },
    )
    .await
    .expect_err("cycle must be rejected");
    match err {
        DbError::Form(errors) => assert_eq!(errors.fields[0].field, "parent_id"),
        other => panic!("expected form error, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn category_listing_applies_exclusive_price_bounds_and_sort(pool: sqlx::PgPool) {
    let type_id = insert_plain_type(&pool).await;
    let parent = insert_category(&pool, "Coffee", None).await;
    let child = insert_category(&pool, "Espresso", Some(parent)).await;
    let elsewhere = insert_category(&pool, "Tea", None).await;

    for (title, price, category) in [
        ("P1", 10, parent),
        ("P2", 20, parent),
        ("P3", 45, child),
        ("P4", 50, child),
        ("P5", 60, parent),
        ("P6", 30, elsewhere),
    ] {
        let mut form = product_form(title, Decimal::new(price, 0), type_id);
        form.category_id = Some(category);
        create_product(&pool, &form).await.expect("create product");
    }

    let query: HashMap<String, String> = [
        ("price_from", "10"),
        ("price_to", "50"),
        ("sort_by", "-price"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let params = ListingParams::from_query(&query, &[]);
    let scope = ListingScope::Categories(
        category_scope_ids(&pool, parent).await.expect("scope ids"),
    );

    let page = list_scoped_products(&pool, &scope, &params, 16)
        .await
        .expect("listing");
    let found: Vec<(&str, Decimal)> = page
        .items
        .iter()
        .map(|p| (p.title.as_str(), p.price))
        .collect();
    assert_eq!(
        found,
        vec![("P3", Decimal::new(45, 0)), ("P2", Decimal::new(20, 0))]
    );
    assert_eq!(page.total, 2);
}

// ---------------------------------------------------------------------------
// Cart and checkout
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn adding_same_variant_twice_merges_lines(pool: sqlx::PgPool) {
    let user_id = insert_test_user(&pool, "merge").await;
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;

    add_to_cart(&pool, user_id, variant_id, 2).await.expect("add 2");
    let line = add_to_cart(&pool, user_id, variant_id, 3).await.expect("add 3");
    assert_eq!(line.quantity, 5);

    let lines = list_cart_lines(&pool, user_id).await.expect("lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 5);
}

#[sqlx::test(migrations = "../../migrations")]
async fn adding_zero_quantity_is_rejected(pool: sqlx::PgPool) {
    let user_id = insert_test_user(&pool, "zero").await;
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;

    let err = add_to_cart(&pool, user_id, variant_id, 0)
        .await
        .expect_err("zero quantity");
    assert!(matches!(err, DbError::Validation(_)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_adds_of_one_variant_share_a_line(pool: sqlx::PgPool) {
    let user_id = insert_test_user(&pool, "rush").await;
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { add_to_cart(&pool, user_id, variant_id, 1).await })
        })
        .collect();
    let mut added = 0;
    for task in tasks {
        match task.await.expect("join") {
            Ok(_) => added += 1,
            Err(DbError::Conflict) => {}
            Err(other) => panic!("unexpected cart error: {other:?}"),
        }
    }

    let lines = list_cart_lines(&pool, user_id).await.expect("lines");
    assert_eq!(lines.len(), 1);
    assert!(added > 0);
    assert_eq!(lines[0].quantity, added);
}

#[sqlx::test(migrations = "../../migrations")]
async fn line_quantity_past_the_cap_is_a_validation_error(pool: sqlx::PgPool) {
    let user_id = insert_test_user(&pool, "bulk").await;
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;

    let err = add_to_cart(&pool, user_id, variant_id, i32::MAX)
        .await
        .expect_err("oversized add");
    assert!(matches!(
        err,
        DbError::Validation(CoreError::QuantityTooLarge { .. })
    ));

    add_to_cart(&pool, user_id, variant_id, MAX_LINE_QUANTITY)
        .await
        .expect("fill to the cap");
    let err = add_to_cart(&pool, user_id, variant_id, 1)
        .await
        .expect_err("past the cap");
    assert!(matches!(
        err,
        DbError::Validation(CoreError::QuantityTooLarge { .. })
    ));

    let lines = list_cart_lines(&pool, user_id).await.expect("lines");
    assert_eq!(lines[0].quantity, MAX_LINE_QUANTITY);
}

#[sqlx::test(migrations = "../../migrations")]
async fn single_use_coupon_is_redeemed_once_under_concurrent_checkouts(pool: sqlx::PgPool) {
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;
    set_stock(&pool, variant_id, 100).await;
    create_coupon(&pool, &coupon_form("ONCEONLY", Some(1)))
        .await
        .expect("create coupon");

    let mut users = Vec::new();
    for i in 0..8 {
        let user_id = insert_test_user(&pool, &format!("racer{i}")).await;
        add_to_cart(&pool, user_id, variant_id, 1).await.expect("add");
        users.push(user_id);
    }

    let tasks: Vec<_> = users
        .into_iter()
        .map(|user_id| {
            let pool = pool.clone();
            tokio::spawn(async move {
                place_order(&pool, user_id, None, Some("ONCEONLY"), None).await
            })
        })
        .collect();
    let mut placed = 0;
    let mut exhausted = 0;
    for task in tasks {
        match task.await.expect("join") {
            Ok(_) => placed += 1,
            Err(DbError::CouponRejected(CouponRejection::Exhausted)) => exhausted += 1,
            Err(other) => panic!("unexpected checkout error: {other:?}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(exhausted, 7);
    let coupon = get_coupon_by_code(&pool, "ONCEONLY")
        .await
        .expect("get coupon")
        .expect("coupon exists");
    assert_eq!(coupon.used, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_allocates_stock_and_redeems_coupon(pool: sqlx::PgPool) {
    let user_id = insert_test_user(&pool, "buyer").await;
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;
    set_stock(&pool, variant_id, 10).await;
    create_coupon(&pool, &coupon_form("TENOFF", Some(1)))
        .await
        .expect("create coupon");

    add_to_cart(&pool, user_id, variant_id, 3).await.expect("add");
    let (order, lines) = place_order(&pool, user_id, None, Some("TENOFF"), None)
        .await
        .expect("place order");

    assert_eq!(order.status(), Some(OrderStatus::Unfulfilled));
    assert_eq!(order.subtotal, Decimal::new(120, 0));
    assert_eq!(order.discount_amount, Decimal::new(10, 0));
    assert_eq!(order.total, Decimal::new(110, 0));
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);

    let variant = get_variant(&pool, variant_id)
        .await
        .expect("get variant")
        .expect("variant exists");
    assert_eq!(variant.quantity_allocated, 3);
    assert!(list_cart_lines(&pool, user_id).await.expect("lines").is_empty());

    let coupon = get_coupon_by_code(&pool, "tenoff")
        .await
        .expect("get coupon")
        .expect("coupon exists");
    assert_eq!(coupon.used, 1);

    // Single-use coupon is now exhausted.
    add_to_cart(&pool, user_id, variant_id, 1).await.expect("add again");
    let err = place_order(&pool, user_id, None, Some("TENOFF"), None)
        .await
        .expect_err("exhausted coupon");
    assert!(matches!(
        err,
        DbError::CouponRejected(CouponRejection::Exhausted)
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_rejects_more_than_available_stock(pool: sqlx::PgPool) {
    let user_id = insert_test_user(&pool, "greedy").await;
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;
    set_stock(&pool, variant_id, 2).await;

    add_to_cart(&pool, user_id, variant_id, 5).await.expect("add");
    let err = place_order(&pool, user_id, None, None, None)
        .await
        .expect_err("not enough stock");
    assert!(matches!(
        err,
        DbError::InsufficientStock {
            requested: 5,
            available: 2,
            ..
        }
    ));
    // Nothing was committed.
    assert_eq!(list_cart_lines(&pool, user_id).await.expect("lines").len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn partial_checkout_keeps_remaining_quantity_in_cart(pool: sqlx::PgPool) {
    let user_id = insert_test_user(&pool, "partial").await;
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;
    set_stock(&pool, variant_id, 10).await;

    add_to_cart(&pool, user_id, variant_id, 4).await.expect("add");
    let items = [CheckoutItem {
        variant_id,
        quantity: 1,
    }];
    place_order(&pool, user_id, Some(items.as_slice()), None, None)
        .await
        .expect("place order");

    let lines = list_cart_lines(&pool, user_id).await.expect("lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancel_releases_allocation_and_send_consumes_it(pool: sqlx::PgPool) {
    let user_id = insert_test_user(&pool, "lifecycle").await;
    let product_id = insert_sized_product(&pool, Decimal::new(40, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;
    set_stock(&pool, variant_id, 10).await;

    add_to_cart(&pool, user_id, variant_id, 2).await.expect("add");
    let (first, _) = place_order(&pool, user_id, None, None, None)
        .await
        .expect("order 1");
    add_to_cart(&pool, user_id, variant_id, 3).await.expect("add");
    let (second, _) = place_order(&pool, user_id, None, None, None)
        .await
        .expect("order 2");

    let cancelled = cancel_order(&pool, first.id).await.expect("cancel");
    assert_eq!(cancelled.status(), Some(OrderStatus::Cancelled));
    let sent = send_order(&pool, second.id).await.expect("send");
    assert_eq!(sent.status(), Some(OrderStatus::Fulfilled));

    let variant = get_variant(&pool, variant_id)
        .await
        .expect("get variant")
        .expect("variant exists");
    assert_eq!(variant.quantity, 7);
    assert_eq!(variant.quantity_allocated, 0);

    let err = cancel_order(&pool, second.id).await.expect_err("already sent");
    assert!(matches!(err, DbError::InvalidOrderTransition { .. }));
}

fn address_form(street: &str) -> AddressForm {
    AddressForm {
        contact_name: "Ada Lovelace".to_string(),
        contact_phone: "555-0100".to_string(),
        province: String::new(),
        city: "London".to_string(),
        district: String::new(),
        address: street.to_string(),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn addresses_are_scoped_to_their_owner(pool: sqlx::PgPool) {
    let owner = insert_test_user(&pool, "owner").await;
    let other = insert_test_user(&pool, "other").await;
    let address = create_address(&pool, owner, &address_form("1 Main St"))
        .await
        .expect("create address");

    assert!(matches!(
        get_user_address(&pool, other, address.id).await,
        Err(DbError::NotFound)
    ));
    assert!(matches!(
        update_address(&pool, other, address.id, &address_form("2 Side St")).await,
        Err(DbError::NotFound)
    ));
    assert!(matches!(
        delete_address(&pool, other, address.id).await,
        Err(DbError::NotFound)
    ));

    let updated = update_address(&pool, owner, address.id, &address_form("2 Side St"))
        .await
        .expect("update own address");
    assert_eq!(updated.address, "2 Side St");
    assert!(list_user_addresses(&pool, other)
        .await
        .expect("list")
        .is_empty());

    delete_address(&pool, owner, address.id)
        .await
        .expect("delete own address");
    assert!(list_user_addresses(&pool, owner)
        .await
        .expect("list")
        .is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_records_only_the_shoppers_own_address(pool: sqlx::PgPool) {
    let buyer = insert_test_user(&pool, "buyer").await;
    let stranger = insert_test_user(&pool, "stranger").await;
    let product_id = insert_sized_product(&pool, Decimal::new(15, 0)).await;
    let variant_id = list_variants(&pool, product_id).await.expect("variants")[0].id;
    set_stock(&pool, variant_id, 5).await;
    let theirs = create_address(&pool, stranger, &address_form("9 Elsewhere"))
        .await
        .expect("stranger address");
    let mine = create_address(&pool, buyer, &address_form("1 Main St"))
        .await
        .expect("buyer address");
    add_to_cart(&pool, buyer, variant_id, 1).await.expect("add");

    let err = place_order(&pool, buyer, None, None, Some(theirs.id))
        .await
        .expect_err("foreign address must be rejected");
    assert!(matches!(err, DbError::Form(ref errors) if errors.fields[0].field == "address_id"));
    assert_eq!(list_cart_lines(&pool, buyer).await.expect("lines").len(), 1);

    let (order, _) = place_order(&pool, buyer, None, None, Some(mine.id))
        .await
        .expect("place order");
    assert_eq!(order.shipping_address_id, Some(mine.id));

    // Deleting the address keeps the order.
    delete_address(&pool, buyer, mine.id).await.expect("delete");
    let order = shopfront_db::get_order(&pool, order.id)
        .await
        .expect("get order")
        .expect("order exists");
    assert_eq!(order.shipping_address_id, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn site_settings_start_seeded_and_can_be_replaced(pool: sqlx::PgPool) {
    let seeded = get_site_settings(&pool).await.expect("seeded settings");
    assert_eq!(seeded.header_text, "Shopfront");

    let form = SiteSettingsForm {
        header_text: "Summer sale".to_string(),
        description: "Everything must go".to_string(),
    };
    update_site_settings(&pool, &form).await.expect("update");

    let current = get_site_settings(&pool).await.expect("settings");
    assert_eq!(current.header_text, "Summer sale");
    assert_eq!(current.description, "Everything must go");
}
