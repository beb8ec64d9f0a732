//! Database operations for the `categories` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfront_core::{forms::CategoryForm, FormErrors, Hierarchy, TreeNode};
use sqlx::PgPool;

use crate::{DbError, Page};

/// Serializes re-parenting so two concurrent moves cannot close a loop
/// that neither would create alone.
const HIERARCHY_LOCK_KEY: i64 = 0x5348_4f50_4341_5447;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub title: String,
    pub parent_id: Option<i64>,
    pub background_img: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TreeNode for CategoryRow {
    fn node_id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }
}

const CATEGORY_COLUMNS: &str = "id, title, parent_id, background_img, created_at, updated_at";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// All categories ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY id");
    let rows = sqlx::query_as::<_, CategoryRow>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_categories_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<CategoryRow>, DbError> {
    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY id LIMIT $1 OFFSET $2");
    let items = sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_category(pool: &PgPool, id: i64) -> Result<Option<CategoryRow>, DbError> {
    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1");
    let row = sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Direct children of `parent_id`, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_category_children(
    pool: &PgPool,
    parent_id: i64,
) -> Result<Vec<CategoryRow>, DbError> {
    let sql =
        format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE parent_id = $1 ORDER BY id");
    let rows = sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Every category arranged as a [`Hierarchy`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn load_category_tree(pool: &PgPool) -> Result<Hierarchy<CategoryRow>, DbError> {
    Ok(Hierarchy::new(list_categories(pool).await?))
}

/// Ids a category listing covers: the category itself and all descendants.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the category does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn category_scope_ids(pool: &PgPool, id: i64) -> Result<Vec<i64>, DbError> {
    let tree = load_category_tree(pool).await?;
    if tree.get(id).is_none() {
        return Err(DbError::NotFound);
    }
    Ok(tree.descendants(id))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Form`] when the parent does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn create_category(pool: &PgPool, form: &CategoryForm) -> Result<CategoryRow, DbError> {
    let sql = format!(
        "INSERT INTO categories (title, parent_id, background_img) \
         VALUES ($1, $2, $3) \
         RETURNING {CATEGORY_COLUMNS}"
    );
    sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(&form.title)
        .bind(form.parent_id)
        .bind(form.background_img.as_deref())
        .fetch_one(pool)
        .await
        .map_err(|e| super::map_foreign_key(e, "parent_id", "unknown category"))
}

/// Update a category, rejecting a parent that would make it its own ancestor.
///
/// Returns the updated row and the parent it had before the update.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the category does not exist,
/// [`DbError::Form`] for an unknown parent or a cycle, or [`DbError::Sqlx`]
/// on query failure.
pub async fn update_category(
    pool: &PgPool,
    id: i64,
    form: &CategoryForm,
) -> Result<(CategoryRow, Option<i64>), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(HIERARCHY_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY id");
    let tree = Hierarchy::new(
        sqlx::query_as::<_, CategoryRow>(&sql)
            .fetch_all(&mut *tx)
            .await?,
    );
    let previous_parent = tree.get(id).ok_or(DbError::NotFound)?.parent_id;

    if let Some(parent) = form.parent_id {
        if tree.get(parent).is_none() {
            return Err(DbError::Form(FormErrors::single(
                "parent_id",
                "unknown category",
            )));
        }
    }
    tree.check_parent(id, form.parent_id)
        .map_err(|e| DbError::Form(FormErrors::single("parent_id", e.to_string())))?;

    let sql = format!(
        "UPDATE categories \
         SET title = $2, parent_id = $3, background_img = $4, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {CATEGORY_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(id)
        .bind(&form.title)
        .bind(form.parent_id)
        .bind(form.background_img.as_deref())
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok((row, previous_parent))
}

/// Delete a category. Children are detached (their parent becomes null) and
/// products keep existing without a category.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the category does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn delete_category(pool: &PgPool, id: i64) -> Result<CategoryRow, DbError> {
    let sql = format!("DELETE FROM categories WHERE id = $1 RETURNING {CATEGORY_COLUMNS}");
    sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}
