//! Persistence bootstrap: schema migrations and a post-migration sanity check.

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};

/// Every table the application expects after bootstrap.
pub const COLLECTIONS: [&str; 8] = [
    "users",
    "products",
    "offers",
    "reviews",
    "price_alerts",
    "wishlists",
    "search_history",
    "user_preferences",
];

/// Index name and the table it belongs to.
pub const INDEXES: &[(&str, &str)] = &[
    ("products_search_idx", "products"),
    ("users_username_key", "users"),
    ("users_email_key", "users"),
    ("products_category_idx", "products"),
    ("products_brand_idx", "products"),
    ("offers_product_id_idx", "offers"),
    ("offers_platform_idx", "offers"),
    ("offers_price_idx", "offers"),
    ("reviews_product_id_idx", "reviews"),
    ("reviews_rating_idx", "reviews"),
    ("reviews_sentiment_label_idx", "reviews"),
    ("reviews_user_product_key", "reviews"),
    ("price_alerts_user_id_idx", "price_alerts"),
    ("price_alerts_product_id_idx", "price_alerts"),
    ("price_alerts_is_active_idx", "price_alerts"),
    ("price_alerts_one_active_idx", "price_alerts"),
    ("wishlists_user_id_idx", "wishlists"),
    ("search_history_user_id_idx", "search_history"),
    ("search_history_created_at_idx", "search_history"),
];

/// Apply pending migrations, then confirm the schema is complete.
pub async fn bootstrap(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;

    let missing = verify_schema(db).await?;
    if missing.is_empty() {
        info!(tables = COLLECTIONS.len(), indexes = INDEXES.len(), "database bootstrapped");
    } else {
        warn!(?missing, "schema incomplete after migrations");
        anyhow::bail!("missing schema objects: {}", missing.join(", "));
    }
    Ok(())
}

/// Names of expected tables and indexes that are absent from the public schema.
pub async fn verify_schema(db: &PgPool) -> anyhow::Result<Vec<String>> {
    let tables: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT table_name::text
          FROM information_schema.tables
         WHERE table_schema = 'public'
        "#,
    )
    .fetch_all(db)
    .await
    .context("list tables")?;

    let indexes: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT indexname::text
          FROM pg_indexes
         WHERE schemaname = 'public'
        "#,
    )
    .fetch_all(db)
    .await
    .context("list indexes")?;

    Ok(missing_objects(&tables, &indexes))
}

fn missing_objects(tables: &[String], indexes: &[String]) -> Vec<String> {
    let mut missing: Vec<String> = COLLECTIONS
        .iter()
        .filter(|t| !tables.iter().any(|have| have == *t))
        .map(|t| format!("table {t}"))
        .collect();
    missing.extend(
        INDEXES
            .iter()
            .filter(|(idx, _)| !indexes.iter().any(|have| have == idx))
            .map(|(idx, table)| format!("index {idx} on {table}")),
    );
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn complete_schema_reports_nothing_missing() {
        let tables = owned(&COLLECTIONS);
        let indexes: Vec<String> = INDEXES.iter().map(|(i, _)| i.to_string()).collect();
        assert!(missing_objects(&tables, &indexes).is_empty());
    }

    #[test]
    fn missing_table_and_index_are_named() {
        let tables = owned(&COLLECTIONS[1..]);
        let indexes: Vec<String> = INDEXES
            .iter()
            .filter(|(i, _)| *i != "users_email_key")
            .map(|(i, _)| i.to_string())
            .collect();
        let missing = missing_objects(&tables, &indexes);
        assert_eq!(
            missing,
            vec![
                "table users".to_string(),
                "index users_email_key on users".to_string()
            ]
        );
    }

    #[test]
    fn every_index_targets_a_declared_collection() {
        for (_, table) in INDEXES {
            assert!(COLLECTIONS.contains(table), "{table} is not declared");
        }
    }
}
