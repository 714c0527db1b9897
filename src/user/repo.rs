use anyhow::Context;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{PriceAlert, PriceAlertUpdate, RecentSearch, SearchHistoryEntry, WishlistItem};

#[derive(Debug, Clone, FromRow)]
pub struct WishlistRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub created_at: OffsetDateTime,
}

impl From<WishlistRow> for WishlistItem {
    fn from(r: WishlistRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            product_id: r.product_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AlertRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub target_price: f64,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_checked: Option<OffsetDateTime>,
}

impl From<AlertRow> for PriceAlert {
    fn from(r: AlertRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            product_id: r.product_id,
            target_price: r.target_price,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
            last_checked: r.last_checked,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub query: String,
    pub results_count: i64,
    pub created_at: OffsetDateTime,
}

impl From<HistoryRow> for SearchHistoryEntry {
    fn from(r: HistoryRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            query: r.query,
            results_count: r.results_count,
            created_at: r.created_at,
        }
    }
}

impl From<HistoryRow> for RecentSearch {
    fn from(r: HistoryRow) -> Self {
        Self {
            query: r.query,
            results_count: r.results_count,
            created_at: r.created_at,
        }
    }
}

const ALERT_COLUMNS: &str =
    "id, user_id, product_id, target_price, is_active, created_at, updated_at, last_checked";

// ---- wishlist ----

pub async fn wishlist(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<WishlistItem>> {
    let rows = sqlx::query_as::<_, WishlistRow>(
        r#"
        SELECT id, user_id, product_id, created_at
          FROM wishlists
         WHERE user_id = $1
         ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list wishlist")?;
    Ok(rows.into_iter().map(WishlistItem::from).collect())
}

/// `None` when the product is already on the list.
pub async fn add_to_wishlist(
    db: &PgPool,
    user_id: Uuid,
    product_id: Uuid,
) -> anyhow::Result<Option<WishlistItem>> {
    let row = sqlx::query_as::<_, WishlistRow>(
        r#"
        INSERT INTO wishlists (user_id, product_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, product_id) DO NOTHING
        RETURNING id, user_id, product_id, created_at
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_optional(db)
    .await
    .context("add wishlist item")?;
    Ok(row.map(WishlistItem::from))
}

pub async fn remove_from_wishlist(
    db: &PgPool,
    user_id: Uuid,
    product_id: Uuid,
) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM wishlists WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(db)
        .await
        .context("remove wishlist item")?;
    Ok(res.rows_affected() > 0)
}

// ---- price alerts ----

pub async fn alerts(
    db: &PgPool,
    user_id: Uuid,
    active_only: bool,
) -> anyhow::Result<Vec<PriceAlert>> {
    let rows = sqlx::query_as::<_, AlertRow>(&format!(
        r#"
        SELECT {ALERT_COLUMNS}
          FROM price_alerts
         WHERE user_id = $1 AND (NOT $2 OR is_active)
         ORDER BY created_at DESC
        "#
    ))
    .bind(user_id)
    .bind(active_only)
    .fetch_all(db)
    .await
    .context("list price alerts")?;
    Ok(rows.into_iter().map(PriceAlert::from).collect())
}

pub async fn has_active_alert(
    db: &PgPool,
    user_id: Uuid,
    product_id: Uuid,
) -> anyhow::Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM price_alerts
             WHERE user_id = $1 AND product_id = $2 AND is_active)
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(db)
    .await
    .context("check active alert")?;
    Ok(exists)
}

/// Whether another active alert exists for the same user and product as `alert_id`.
pub async fn has_other_active_alert(
    db: &PgPool,
    user_id: Uuid,
    alert_id: Uuid,
) -> anyhow::Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
              FROM price_alerts a
              JOIN price_alerts o
                ON o.user_id = a.user_id AND o.product_id = a.product_id
             WHERE a.id = $1 AND a.user_id = $2 AND o.id <> a.id AND o.is_active)
        "#,
    )
    .bind(alert_id)
    .bind(user_id)
    .fetch_one(db)
    .await
    .context("check other active alert")?;
    Ok(exists)
}

pub async fn create_alert(
    db: &PgPool,
    user_id: Uuid,
    product_id: Uuid,
    target_price: f64,
) -> anyhow::Result<PriceAlert> {
    let row = sqlx::query_as::<_, AlertRow>(&format!(
        r#"
        INSERT INTO price_alerts (user_id, product_id, target_price)
        VALUES ($1, $2, $3)
        RETURNING {ALERT_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(product_id)
    .bind(target_price)
    .fetch_one(db)
    .await
    .context("create price alert")?;
    Ok(row.into())
}

/// `None` when the alert does not exist or belongs to someone else.
pub async fn update_alert(
    db: &PgPool,
    user_id: Uuid,
    alert_id: Uuid,
    update: &PriceAlertUpdate,
) -> anyhow::Result<Option<PriceAlert>> {
    let row = sqlx::query_as::<_, AlertRow>(&format!(
        r#"
        UPDATE price_alerts
           SET target_price = COALESCE($3, target_price),
               is_active    = COALESCE($4, is_active),
               updated_at   = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {ALERT_COLUMNS}
        "#
    ))
    .bind(alert_id)
    .bind(user_id)
    .bind(update.target_price)
    .bind(update.is_active)
    .fetch_optional(db)
    .await
    .context("update price alert")?;
    Ok(row.map(PriceAlert::from))
}

pub async fn delete_alert(db: &PgPool, user_id: Uuid, alert_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM price_alerts WHERE id = $1 AND user_id = $2")
        .bind(alert_id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete price alert")?;
    Ok(res.rows_affected() > 0)
}

// ---- search history ----

pub async fn history(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<SearchHistoryEntry>> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT id, user_id, query, results_count, created_at
          FROM search_history
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("list search history")?;
    Ok(rows.into_iter().map(SearchHistoryEntry::from).collect())
}

/// Stores a search unless the same query was recorded in the last hour.
/// Returns whether a row was written.
pub async fn record_search(
    db: &PgPool,
    user_id: Uuid,
    query: &str,
    results_count: i64,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        INSERT INTO search_history (user_id, query, results_count)
        SELECT $1, $2, $3
         WHERE NOT EXISTS (
            SELECT 1 FROM search_history
             WHERE user_id = $1 AND query = $2
               AND created_at >= now() - interval '1 hour')
        "#,
    )
    .bind(user_id)
    .bind(query)
    .bind(results_count)
    .execute(db)
    .await
    .context("record search")?;
    Ok(res.rows_affected() > 0)
}

pub async fn delete_history_entry(
    db: &PgPool,
    user_id: Uuid,
    entry_id: Uuid,
) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM search_history WHERE id = $1 AND user_id = $2")
        .bind(entry_id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete search history entry")?;
    Ok(res.rows_affected() > 0)
}

pub async fn clear_history(db: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM search_history WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await
        .context("clear search history")?;
    Ok(res.rows_affected())
}

// ---- dashboard ----

#[derive(Debug, FromRow)]
pub struct DashboardCounts {
    pub wishlist_count: i64,
    pub active_alerts_count: i64,
    pub search_history_count: i64,
}

pub async fn dashboard_counts(db: &PgPool, user_id: Uuid) -> anyhow::Result<DashboardCounts> {
    let counts = sqlx::query_as::<_, DashboardCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM wishlists WHERE user_id = $1) AS wishlist_count,
            (SELECT COUNT(*) FROM price_alerts
              WHERE user_id = $1 AND is_active) AS active_alerts_count,
            (SELECT COUNT(*) FROM search_history WHERE user_id = $1) AS search_history_count
        "#,
    )
    .bind(user_id)
    .fetch_one(db)
    .await
    .context("dashboard counts")?;
    Ok(counts)
}

pub async fn recent_searches(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<RecentSearch>> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT id, user_id, query, results_count, created_at
          FROM search_history
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("recent searches")?;
    Ok(rows.into_iter().map(RecentSearch::from).collect())
}
