use anyhow::Context;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{NewReview, Review, ReviewSummary, SentimentLabel, SentimentSummary};

const REVIEW_COLUMNS: &str = "id, product_id, user_id, platform, reviewer_name, rating, title, \
     content, helpful_votes, verified_purchase, sentiment_score, sentiment_label, review_date, \
     created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct ReviewRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Option<Uuid>,
    pub platform: String,
    pub reviewer_name: Option<String>,
    pub rating: i32,
    pub title: Option<String>,
    pub content: String,
    pub helpful_votes: i32,
    pub verified_purchase: bool,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<String>,
    pub review_date: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<ReviewRow> for Review {
    type Error = anyhow::Error;

    fn try_from(r: ReviewRow) -> Result<Self, Self::Error> {
        let sentiment_label = r
            .sentiment_label
            .as_deref()
            .map(str::parse::<SentimentLabel>)
            .transpose()?;
        Ok(Self {
            id: r.id,
            product_id: r.product_id,
            user_id: r.user_id,
            platform: r.platform.parse()?,
            reviewer_name: r.reviewer_name,
            rating: r.rating,
            title: r.title,
            content: r.content,
            helpful_votes: r.helpful_votes,
            verified_purchase: r.verified_purchase,
            sentiment_score: r.sentiment_score,
            sentiment_label,
            review_date: r.review_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn into_reviews(rows: Vec<ReviewRow>) -> anyhow::Result<Vec<Review>> {
    rows.into_iter().map(Review::try_from).collect()
}

pub async fn list_for_product(
    db: &PgPool,
    product_id: Uuid,
    rating: Option<i32>,
    sentiment: Option<SentimentLabel>,
    skip: i64,
    limit: i64,
) -> anyhow::Result<Vec<Review>> {
    let rows = sqlx::query_as::<_, ReviewRow>(&format!(
        r#"
        SELECT {REVIEW_COLUMNS}
          FROM reviews
         WHERE product_id = $1
           AND ($2::int4 IS NULL OR rating = $2)
           AND ($3::text IS NULL OR sentiment_label = $3)
         ORDER BY created_at DESC
         LIMIT $4 OFFSET $5
        "#
    ))
    .bind(product_id)
    .bind(rating)
    .bind(sentiment.map(|s| s.as_str()))
    .bind(limit)
    .bind(skip)
    .fetch_all(db)
    .await
    .context("list reviews")?;
    into_reviews(rows)
}

pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Review>> {
    let row = sqlx::query_as::<_, ReviewRow>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .context("find review")?;
    row.map(Review::try_from).transpose()
}

pub async fn user_has_reviewed(
    db: &PgPool,
    user_id: Uuid,
    product_id: Uuid,
) -> anyhow::Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM reviews WHERE user_id = $1 AND product_id = $2)",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(db)
    .await
    .context("check existing review")?;
    Ok(exists)
}

pub async fn create(db: &PgPool, user_id: Uuid, new: &NewReview) -> anyhow::Result<Review> {
    let row = sqlx::query_as::<_, ReviewRow>(&format!(
        r#"
        INSERT INTO reviews (product_id, user_id, platform, reviewer_name, rating, title,
                             content, verified_purchase, review_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
        RETURNING {REVIEW_COLUMNS}
        "#
    ))
    .bind(new.product_id)
    .bind(user_id)
    .bind(new.platform.as_str())
    .bind(new.reviewer_name.as_deref())
    .bind(new.rating)
    .bind(new.title.as_deref())
    .bind(&new.content)
    .bind(new.verified_purchase)
    .fetch_one(db)
    .await
    .context("insert review")?;
    Review::try_from(row)
}

/// Returns the new vote count, or `None` when the review does not exist.
pub async fn mark_helpful(db: &PgPool, id: Uuid) -> anyhow::Result<Option<i32>> {
    let votes = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE reviews
           SET helpful_votes = helpful_votes + 1, updated_at = now()
         WHERE id = $1
        RETURNING helpful_votes
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("mark review helpful")?;
    Ok(votes)
}

pub async fn summary(db: &PgPool, product_id: Uuid) -> anyhow::Result<ReviewSummary> {
    let ratings = sqlx::query_as::<_, (i32, i64)>(
        "SELECT rating, COUNT(*) FROM reviews WHERE product_id = $1 GROUP BY rating",
    )
    .bind(product_id)
    .fetch_all(db)
    .await
    .context("rating distribution")?;

    let labels = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT sentiment_label, COUNT(*)
          FROM reviews
         WHERE product_id = $1 AND sentiment_label IS NOT NULL
         GROUP BY sentiment_label
        "#,
    )
    .bind(product_id)
    .fetch_all(db)
    .await
    .context("sentiment distribution")?;

    Ok(build_summary(product_id, &ratings, &labels))
}

fn build_summary(
    product_id: Uuid,
    ratings: &[(i32, i64)],
    labels: &[(String, i64)],
) -> ReviewSummary {
    let mut rating_distribution = [0i64; 5];
    let mut total = 0i64;
    let mut weighted = 0i64;
    for &(rating, count) in ratings {
        if (1..=5).contains(&rating) {
            rating_distribution[(rating - 1) as usize] += count;
            total += count;
            weighted += rating as i64 * count;
        }
    }

    let mut sentiment = SentimentSummary::default();
    for (label, count) in labels {
        match label.parse::<SentimentLabel>() {
            Ok(SentimentLabel::Positive) => sentiment.positive += count,
            Ok(SentimentLabel::Negative) => sentiment.negative += count,
            Ok(SentimentLabel::Neutral) => sentiment.neutral += count,
            Err(_) => {}
        }
    }

    let average_rating = if total == 0 {
        0.0
    } else {
        ((weighted as f64 / total as f64) * 100.0).round() / 100.0
    };

    ReviewSummary {
        product_id,
        total_reviews: total,
        average_rating,
        rating_distribution,
        sentiment,
    }
}
