//! Database operations for content `pages` and navigation `menu_items`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfront_core::{
    forms::{MenuItemForm, MenuPlacement, PageForm, SiteSettingsForm},
    FormErrors, Hierarchy, TreeNode,
};
use sqlx::PgPool;

use crate::catalog::map_foreign_key;
use crate::{DbError, Page};

const MENU_LOCK_KEY: i64 = 0x5348_4f50_4d45_4e55;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageRow {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MenuItemRow {
    pub id: i64,
    pub title: String,
    pub menu: String,
    pub position: i32,
    pub parent_id: Option<i64>,
    pub url: Option<String>,
    pub category_id: Option<i64>,
    pub collection_id: Option<i64>,
    pub page_id: Option<i64>,
    /// Where the item points: its own url, or the API path of its target.
    pub link: Option<String>,
}

impl TreeNode for MenuItemRow {
    fn node_id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }
}

const PAGE_COLUMNS: &str = "id, title, slug, content, is_visible, created_at, updated_at";
const MENU_COLUMNS: &str = "id, title, menu, position, parent_id, url, category_id, \
     collection_id, page_id, \
     COALESCE(url, \
              '/api/v1/categories/' || category_id || '/products', \
              '/api/v1/collections/' || collection_id || '/products', \
              '/api/v1/pages/' || page_id) AS link";

fn map_slug_conflict(err: sqlx::Error) -> DbError {
    let err = DbError::from(err);
    if err.is_unique_violation() {
        DbError::Form(FormErrors::single("slug", "is already taken"))
    } else {
        err
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_pages_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<PageRow>, DbError> {
    let sql = format!("SELECT {PAGE_COLUMNS} FROM pages ORDER BY id LIMIT $1 OFFSET $2");
    let items = sqlx::query_as::<_, PageRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages")
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_page(pool: &PgPool, id: i64) -> Result<Option<PageRow>, DbError> {
    let sql = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = $1");
    let row = sqlx::query_as::<_, PageRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Form`] when the slug is taken, or [`DbError::Sqlx`] on
/// query failure.
pub async fn create_page(pool: &PgPool, form: &PageForm) -> Result<PageRow, DbError> {
    let sql = format!(
        "INSERT INTO pages (title, slug, content, is_visible) VALUES ($1, $2, $3, $4) \
         RETURNING {PAGE_COLUMNS}"
    );
    sqlx::query_as::<_, PageRow>(&sql)
        .bind(&form.title)
        .bind(form.slug.as_deref().unwrap_or_default())
        .bind(&form.content)
        .bind(form.is_visible)
        .fetch_one(pool)
        .await
        .map_err(map_slug_conflict)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the page does not exist,
/// [`DbError::Form`] when the slug is taken, or [`DbError::Sqlx`] on query
/// failure.
pub async fn update_page(pool: &PgPool, id: i64, form: &PageForm) -> Result<PageRow, DbError> {
    let sql = format!(
        "UPDATE pages SET title = $2, slug = $3, content = $4, is_visible = $5, \
         updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {PAGE_COLUMNS}"
    );
    sqlx::query_as::<_, PageRow>(&sql)
        .bind(id)
        .bind(&form.title)
        .bind(form.slug.as_deref().unwrap_or_default())
        .bind(&form.content)
        .bind(form.is_visible)
        .fetch_optional(pool)
        .await
        .map_err(map_slug_conflict)?
        .ok_or(DbError::NotFound)
}

/// Delete a page. Menu items linking to it lose their target.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the page does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn delete_page(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM pages WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Menu items
// ---------------------------------------------------------------------------

/// Items of one menu as a hierarchy, siblings ordered by position.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_menu(
    pool: &PgPool,
    placement: MenuPlacement,
) -> Result<Hierarchy<MenuItemRow>, DbError> {
    let sql = format!("SELECT {MENU_COLUMNS} FROM menu_items WHERE menu = $1 ORDER BY position, id");
    let rows = sqlx::query_as::<_, MenuItemRow>(&sql)
        .bind(placement.as_str())
        .fetch_all(pool)
        .await?;
    Ok(Hierarchy::new(rows))
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_menu_items_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<MenuItemRow>, DbError> {
    let sql = format!(
        "SELECT {MENU_COLUMNS} FROM menu_items ORDER BY menu, position, id LIMIT $1 OFFSET $2"
    );
    let items = sqlx::query_as::<_, MenuItemRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_items")
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_menu_item(pool: &PgPool, id: i64) -> Result<Option<MenuItemRow>, DbError> {
    let sql = format!("SELECT {MENU_COLUMNS} FROM menu_items WHERE id = $1");
    let row = sqlx::query_as::<_, MenuItemRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

fn map_link_error(err: sqlx::Error) -> DbError {
    map_foreign_key(err, "url", "links to a category, collection, or page that does not exist")
}

/// # Errors
///
/// Returns [`DbError::Form`] for an unknown parent or link target, or
/// [`DbError::Sqlx`] on query failure.
pub async fn create_menu_item(pool: &PgPool, form: &MenuItemForm) -> Result<MenuItemRow, DbError> {
    let mut tx = pool.begin().await?;
    if let Some(parent) = form.parent_id {
        let menu: Option<String> = sqlx::query_scalar("SELECT menu FROM menu_items WHERE id = $1")
            .bind(parent)
            .fetch_optional(&mut *tx)
            .await?;
        check_parent_menu(menu.as_deref(), form.menu)?;
    }

    let sql = format!(
        "INSERT INTO menu_items \
         (title, menu, position, parent_id, url, category_id, collection_id, page_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {MENU_COLUMNS}"
    );
    let row = sqlx::query_as::<_, MenuItemRow>(&sql)
        .bind(&form.title)
        .bind(form.menu.as_str())
        .bind(form.position)
        .bind(form.parent_id)
        .bind(form.url.as_deref())
        .bind(form.category_id)
        .bind(form.collection_id)
        .bind(form.page_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_link_error)?;

    tx.commit().await?;
    Ok(row)
}

/// Update a menu item, rejecting a parent that would make it its own ancestor.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the item does not exist,
/// [`DbError::Form`] for an unknown parent, a cycle, or an unknown link
/// target, or [`DbError::Sqlx`] on query failure.
pub async fn update_menu_item(
    pool: &PgPool,
    id: i64,
    form: &MenuItemForm,
) -> Result<MenuItemRow, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MENU_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let sql = format!("SELECT {MENU_COLUMNS} FROM menu_items ORDER BY position, id");
    let tree = Hierarchy::new(
        sqlx::query_as::<_, MenuItemRow>(&sql)
            .fetch_all(&mut *tx)
            .await?,
    );
    if tree.get(id).is_none() {
        return Err(DbError::NotFound);
    }
    if let Some(parent) = form.parent_id {
        check_parent_menu(tree.get(parent).map(|p| p.menu.as_str()), form.menu)?;
    }
    tree.check_parent(id, form.parent_id)
        .map_err(|e| DbError::Form(FormErrors::single("parent_id", e.to_string())))?;

    let sql = format!(
        "UPDATE menu_items SET \
         title = $2, menu = $3, position = $4, parent_id = $5, url = $6, category_id = $7, \
         collection_id = $8, page_id = $9, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {MENU_COLUMNS}"
    );
    let row = sqlx::query_as::<_, MenuItemRow>(&sql)
        .bind(id)
        .bind(&form.title)
        .bind(form.menu.as_str())
        .bind(form.position)
        .bind(form.parent_id)
        .bind(form.url.as_deref())
        .bind(form.category_id)
        .bind(form.collection_id)
        .bind(form.page_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_link_error)?;

    tx.commit().await?;
    Ok(row)
}

/// Delete a menu item together with its sub-items.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the item does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn delete_menu_item(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM menu_items WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// A parent must exist and sit in the same menu.
fn check_parent_menu(parent_menu: Option<&str>, menu: MenuPlacement) -> Result<(), DbError> {
    match parent_menu {
        None => Err(DbError::Form(FormErrors::single(
            "parent_id",
            "unknown menu item",
        ))),
        Some(found) if found != menu.as_str() => Err(DbError::Form(FormErrors::single(
            "parent_id",
            "parent belongs to a different menu",
        ))),
        Some(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Site settings
// ---------------------------------------------------------------------------

/// The single row of storewide text shown in headers and meta tags.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SiteSettingsRow {
    pub header_text: String,
    pub description: String,
    pub updated_at: DateTime<Utc>,
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the settings row was never seeded, or
/// [`DbError::Sqlx`] on query failure.
pub async fn get_site_settings(pool: &PgPool) -> Result<SiteSettingsRow, DbError> {
    sqlx::query_as::<_, SiteSettingsRow>(
        "SELECT header_text, description, updated_at FROM site_settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Overwrite the settings row, creating it if a deployment deleted it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn update_site_settings(
    pool: &PgPool,
    form: &SiteSettingsForm,
) -> Result<SiteSettingsRow, DbError> {
    let row = sqlx::query_as::<_, SiteSettingsRow>(
        "INSERT INTO site_settings (id, header_text, description) VALUES (1, $1, $2) \
         ON CONFLICT (id) DO UPDATE \
         SET header_text = EXCLUDED.header_text, description = EXCLUDED.description, \
             updated_at = NOW() \
         RETURNING header_text, description, updated_at",
    )
    .bind(&form.header_text)
    .bind(&form.description)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_must_exist_in_the_same_menu() {
        assert!(check_parent_menu(Some("top"), MenuPlacement::Top).is_ok());
        assert!(matches!(
            check_parent_menu(Some("bottom"), MenuPlacement::Top),
            Err(DbError::Form(_))
        ));
        assert!(matches!(
            check_parent_menu(None, MenuPlacement::Bottom),
            Err(DbError::Form(_))
        ));
    }
}
