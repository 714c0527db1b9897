use std::collections::HashMap;

use anyhow::Context;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{
    NewProduct, Offer, Platform, Product, ProductSummary, ProductUpdate, SentimentSummary,
};

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.description, p.category, p.brand, p.image_url, \
     p.created_at, p.updated_at";

const OFFER_COLUMNS: &str = "id, product_id, platform, url, price, original_price, \
     discount_percentage, availability, seller_name, shipping_cost, created_at, updated_at";

/// Shared WHERE clause for full-text search with filters.
/// Binds: $1 query, $2 category, $3 brand, $4 platform, $5 min price, $6 max price.
const SEARCH_FILTER: &str = r#"
    ($1 = '' OR p.search_vector @@ plainto_tsquery('english', $1))
    AND ($2::text IS NULL OR p.category = $2)
    AND ($3::text IS NULL OR p.brand = $3)
    AND ($4::text IS NULL OR EXISTS (
        SELECT 1 FROM offers o WHERE o.product_id = p.id AND o.platform = $4))
    AND (($5::float8 IS NULL AND $6::float8 IS NULL) OR EXISTS (
        SELECT 1 FROM offers o
         WHERE o.product_id = p.id
           AND ($5::float8 IS NULL OR o.price >= $5)
           AND ($6::float8 IS NULL OR o.price <= $6)))
"#;

#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            category: r.category,
            brand: r.brand,
            image_url: r.image_url,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OfferRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub platform: String,
    pub url: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub discount_percentage: Option<f64>,
    pub availability: String,
    pub seller_name: Option<String>,
    pub shipping_cost: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<OfferRow> for Offer {
    type Error = anyhow::Error;

    fn try_from(r: OfferRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            product_id: r.product_id,
            platform: r.platform.parse()?,
            url: r.url,
            price: r.price,
            original_price: r.original_price,
            discount_percentage: r.discount_percentage,
            availability: r.availability,
            seller_name: r.seller_name,
            shipping_cost: r.shipping_cost,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct ProductStatsRow {
    product_id: Uuid,
    min_price: Option<f64>,
    max_price: Option<f64>,
    avg_rating: f64,
    total_reviews: i64,
    positive: i64,
    negative: i64,
    neutral: i64,
}

impl ProductStatsRow {
    fn empty(product_id: Uuid) -> Self {
        Self {
            product_id,
            min_price: None,
            max_price: None,
            avg_rating: 0.0,
            total_reviews: 0,
            positive: 0,
            negative: 0,
            neutral: 0,
        }
    }
}

/// Filters accepted by [`search`].
#[derive(Debug, Default, Clone)]
pub struct SearchFilter<'a> {
    pub query: &'a str,
    pub category: Option<&'a str>,
    pub brand: Option<&'a str>,
    pub platform: Option<Platform>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

pub async fn find_product(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .context("find product")?;
    Ok(row.map(Product::from))
}

pub async fn product_exists(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
        .bind(id)
        .fetch_one(db)
        .await
        .context("product exists")?;
    Ok(exists)
}

pub async fn list_products(
    db: &PgPool,
    category: Option<&str>,
    brand: Option<&str>,
    text: Option<&str>,
    skip: i64,
    limit: i64,
) -> anyhow::Result<Vec<Product>> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        r#"
        SELECT {PRODUCT_COLUMNS}
          FROM products p
         WHERE ($1::text IS NULL OR p.category = $1)
           AND ($2::text IS NULL OR p.brand = $2)
           AND ($3::text IS NULL OR p.search_vector @@ plainto_tsquery('english', $3))
         ORDER BY p.created_at DESC
         LIMIT $4 OFFSET $5
        "#
    ))
    .bind(category)
    .bind(brand)
    .bind(text)
    .bind(limit)
    .bind(skip)
    .fetch_all(db)
    .await
    .context("list products")?;
    Ok(rows.into_iter().map(Product::from).collect())
}

pub async fn create_product(db: &PgPool, new: &NewProduct) -> anyhow::Result<Product> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        r#"
        INSERT INTO products AS p (name, description, category, brand, image_url)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {PRODUCT_COLUMNS}
        "#
    ))
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.category)
    .bind(&new.brand)
    .bind(&new.image_url)
    .fetch_one(db)
    .await
    .context("insert product")?;
    Ok(row.into())
}

/// Applies the set fields of `update`; `None` when the product is gone.
pub async fn update_product(
    db: &PgPool,
    id: Uuid,
    update: &ProductUpdate,
) -> anyhow::Result<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        r#"
        UPDATE products AS p
           SET name = COALESCE($2, p.name),
               description = COALESCE($3, p.description),
               category = COALESCE($4, p.category),
               brand = COALESCE($5, p.brand),
               image_url = COALESCE($6, p.image_url),
               updated_at = now()
         WHERE p.id = $1
        RETURNING {PRODUCT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&update.name)
    .bind(&update.description)
    .bind(&update.category)
    .bind(&update.brand)
    .bind(&update.image_url)
    .fetch_optional(db)
    .await
    .context("update product")?;
    Ok(row.map(Product::from))
}

/// Offers and reviews go with it through the foreign-key cascade.
pub async fn delete_product(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .context("delete product")?;
    Ok(res.rows_affected() > 0)
}

/// One page of matching products, ranked, plus the total match count.
pub async fn search(
    db: &PgPool,
    filter: &SearchFilter<'_>,
    skip: i64,
    limit: i64,
) -> anyhow::Result<(Vec<Product>, i64)> {
    let platform = filter.platform.map(|p| p.as_str());

    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        r#"
        SELECT {PRODUCT_COLUMNS}
          FROM products p
         WHERE {SEARCH_FILTER}
         ORDER BY ts_rank(p.search_vector, plainto_tsquery('english', $1)) DESC, p.name ASC
         LIMIT $7 OFFSET $8
        "#
    ))
    .bind(filter.query)
    .bind(filter.category)
    .bind(filter.brand)
    .bind(platform)
    .bind(filter.min_price)
    .bind(filter.max_price)
    .bind(limit)
    .bind(skip)
    .fetch_all(db)
    .await
    .context("search products")?;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM products p WHERE {SEARCH_FILTER}"
    ))
    .bind(filter.query)
    .bind(filter.category)
    .bind(filter.brand)
    .bind(platform)
    .bind(filter.min_price)
    .bind(filter.max_price)
    .fetch_one(db)
    .await
    .context("count search matches")?;

    Ok((rows.into_iter().map(Product::from).collect(), total))
}

pub async fn offers_for_product(db: &PgPool, product_id: Uuid) -> anyhow::Result<Vec<Offer>> {
    let rows = sqlx::query_as::<_, OfferRow>(&format!(
        "SELECT {OFFER_COLUMNS} FROM offers WHERE product_id = $1 ORDER BY price ASC"
    ))
    .bind(product_id)
    .fetch_all(db)
    .await
    .context("list offers")?;
    rows.into_iter().map(Offer::try_from).collect()
}

pub async fn summarize(db: &PgPool, product: Product) -> anyhow::Result<ProductSummary> {
    let mut out = summarize_many(db, vec![product]).await?;
    out.pop().context("summary for product")
}

/// Summaries for a page of products in two round trips, keeping input order.
pub async fn summarize_many(
    db: &PgPool,
    products: Vec<Product>,
) -> anyhow::Result<Vec<ProductSummary>> {
    if products.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();

    let stats = sqlx::query_as::<_, ProductStatsRow>(
        r#"
        SELECT ids.id AS product_id,
               o.min_price,
               o.max_price,
               COALESCE(r.avg_rating, 0) AS avg_rating,
               COALESCE(r.total_reviews, 0) AS total_reviews,
               COALESCE(r.positive, 0) AS positive,
               COALESCE(r.negative, 0) AS negative,
               COALESCE(r.neutral, 0) AS neutral
          FROM UNNEST($1::uuid[]) AS ids(id)
          LEFT JOIN (
                SELECT product_id, MIN(price) AS min_price, MAX(price) AS max_price
                  FROM offers
                 WHERE product_id = ANY($1)
                 GROUP BY product_id
               ) o ON o.product_id = ids.id
          LEFT JOIN (
                SELECT product_id,
                       AVG(rating)::float8 AS avg_rating,
                       COUNT(*) AS total_reviews,
                       COUNT(*) FILTER (WHERE sentiment_label = 'positive') AS positive,
                       COUNT(*) FILTER (WHERE sentiment_label = 'negative') AS negative,
                       COUNT(*) FILTER (WHERE sentiment_label = 'neutral') AS neutral
                  FROM reviews
                 WHERE product_id = ANY($1)
                 GROUP BY product_id
               ) r ON r.product_id = ids.id
        "#,
    )
    .bind(&ids)
    .fetch_all(db)
    .await
    .context("product stats")?;

    // cheapest once shipping is included
    let offers = sqlx::query_as::<_, OfferRow>(&format!(
        r#"
        SELECT DISTINCT ON (product_id) {OFFER_COLUMNS}
          FROM offers
         WHERE product_id = ANY($1)
         ORDER BY product_id, price + shipping_cost ASC, price ASC
        "#
    ))
    .bind(&ids)
    .fetch_all(db)
    .await
    .context("best offers")?
    .into_iter()
    .map(Offer::try_from)
    .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(build_summaries(products, stats, offers))
}

fn build_summaries(
    products: Vec<Product>,
    stats: Vec<ProductStatsRow>,
    offers: Vec<Offer>,
) -> Vec<ProductSummary> {
    let mut stats: HashMap<Uuid, ProductStatsRow> =
        stats.into_iter().map(|s| (s.product_id, s)).collect();
    let mut offers: HashMap<Uuid, Offer> = offers.into_iter().map(|o| (o.product_id, o)).collect();

    products
        .into_iter()
        .map(|product| {
            let s = stats
                .remove(&product.id)
                .unwrap_or_else(|| ProductStatsRow::empty(product.id));
            ProductSummary {
                best_offer: offers.remove(&product.id),
                id: product.id,
                name: product.name,
                description: product.description,
                brand: product.brand,
                image_url: product.image_url,
                min_price: s.min_price,
                max_price: s.max_price,
                avg_rating: s.avg_rating,
                total_reviews: s.total_reviews,
                sentiment_summary: SentimentSummary {
                    positive: s.positive,
                    negative: s.negative,
                    neutral: s.neutral,
                },
            }
        })
        .collect()
}

/// Name/category/brand triples whose fields contain `q`.
pub async fn suggestion_candidates(
    db: &PgPool,
    q: &str,
    limit: i64,
) -> anyhow::Result<Vec<(String, Option<String>, Option<String>)>> {
    let pattern = format!("%{}%", escape_like(q));
    let rows = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(
        r#"
        SELECT name, category, brand
          FROM products
         WHERE name ILIKE $1 OR category ILIKE $1 OR brand ILIKE $1
         ORDER BY name ASC
         LIMIT $2
        "#,
    )
    .bind(pattern)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("suggestion candidates")?;
    Ok(rows)
}

pub async fn distinct_categories(db: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT category FROM products WHERE category IS NOT NULL ORDER BY category",
    )
    .fetch_all(db)
    .await
    .context("list categories")?;
    Ok(rows)
}

pub async fn distinct_brands(db: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT brand FROM products WHERE brand IS NOT NULL ORDER BY brand",
    )
    .fetch_all(db)
    .await
    .context("list brands")?;
    Ok(rows)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("iphone"), "iphone");
    }

    fn product(name: &str) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            category: Some("Smartphones".into()),
            brand: Some("Apple".into()),
            image_url: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn offer_for(product_id: Uuid, price: f64) -> Offer {
        Offer {
            id: Uuid::new_v4(),
            product_id,
            platform: Platform::Flipkart,
            url: "https://flipkart.com/x".into(),
            price,
            original_price: None,
            discount_percentage: None,
            availability: "in_stock".into(),
            seller_name: None,
            shipping_cost: 0.0,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn summaries_keep_page_order_and_zero_missing_stats() {
        let reviewed = product("iPhone 15");
        let bare = product("iPhone 15 Pro");
        let stats = vec![ProductStatsRow {
            product_id: reviewed.id,
            min_price: Some(69900.0),
            max_price: Some(72900.0),
            avg_rating: 4.5,
            total_reviews: 3,
            positive: 2,
            negative: 1,
            neutral: 0,
        }];
        let offers = vec![offer_for(reviewed.id, 69900.0)];

        let out = build_summaries(vec![reviewed.clone(), bare.clone()], stats, offers);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, reviewed.id);
        assert_eq!(out[0].total_reviews, 3);
        assert_eq!(out[0].sentiment_summary.positive, 2);
        assert_eq!(out[0].best_offer.as_ref().unwrap().price, 69900.0);

        assert_eq!(out[1].id, bare.id);
        assert_eq!(out[1].total_reviews, 0);
        assert_eq!(out[1].avg_rating, 0.0);
        assert!(out[1].min_price.is_none());
        assert!(out[1].best_offer.is_none());
    }

    #[test]
    fn offer_row_rejects_unknown_platform() {
        let row = OfferRow {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            platform: "ebay".into(),
            url: "https://example.com".into(),
            price: 10.0,
            original_price: None,
            discount_percentage: None,
            availability: "in_stock".into(),
            seller_name: None,
            shipping_cost: 0.0,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        assert!(Offer::try_from(row.clone()).is_err());
        let ok = Offer::try_from(OfferRow {
            platform: "amazon".into(),
            ..row
        })
        .unwrap();
        assert_eq!(ok.platform, Platform::Amazon);
    }
}
