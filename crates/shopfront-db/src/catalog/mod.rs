//! Database operations for the catalog tables: categories, attributes,
//! product types, products, variants, images, and collections.

pub mod attributes;
pub mod categories;
pub mod collections;
pub mod images;
pub mod product_types;
pub mod products;
pub mod variants;

use shopfront_core::FormErrors;

use crate::DbError;

/// Turn a foreign-key violation into a field error; pass anything else through.
pub(crate) fn map_foreign_key(err: sqlx::Error, field: &str, message: &str) -> DbError {
    let err = DbError::from(err);
    if err.is_foreign_key_violation() {
        DbError::Form(FormErrors::single(field, message))
    } else {
        err
    }
}

/// Check that every id in `ids` exists in `table`.
pub(crate) async fn ensure_ids_exist(
    conn: &mut sqlx::PgConnection,
    table: &'static str,
    ids: &[i64],
    field: &str,
) -> Result<(), DbError> {
    if ids.is_empty() {
        return Ok(());
    }
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ANY($1)");
    let found: i64 = sqlx::query_scalar(&sql)
        .bind(ids)
        .fetch_one(&mut *conn)
        .await?;
    if usize::try_from(found).unwrap_or(0) == ids.len() {
        Ok(())
    } else {
        Err(DbError::Form(FormErrors::single(
            field,
            "contains an id that does not exist",
        )))
    }
}
