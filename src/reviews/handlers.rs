use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::services::CurrentUser,
    catalog::{self, dto::page},
    error::{AppError, AppResult},
    models::{
        Message, NewReview, Review, ReviewSummary, SentimentLabel, SentimentPrediction,
        SentimentRequest, SentimentResponse,
    },
    reviews::{
        dto::{ReviewListParams, MAX_SENTIMENT_BATCH},
        repo,
    },
    state::AppState,
};

const ALREADY_REVIEWED: &str = "You have already reviewed this product";

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/reviews", post(create_review))
        .route("/reviews/sentiment/analyze", post(analyze_sentiment))
        .route("/reviews/product/:id", get(product_reviews))
        .route("/reviews/product/:id/summary", get(product_summary))
        .route("/reviews/:id", get(get_review))
        .route("/reviews/:id/helpful", patch(mark_helpful))
}

async fn require_product(state: &AppState, product_id: Uuid) -> AppResult<()> {
    if !catalog::repo::product_exists(&state.db, product_id).await? {
        return Err(AppError::NotFound("Product not found".into()));
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn product_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(params): Query<ReviewListParams>,
) -> AppResult<Json<Vec<Review>>> {
    if let Some(r) = params.rating_filter {
        if !(1..=5).contains(&r) {
            return Err(AppError::BadRequest("rating_filter must be between 1 and 5".into()));
        }
    }
    require_product(&state, product_id).await?;

    let (skip, limit) = page(params.skip, params.limit);
    let reviews = repo::list_for_product(
        &state.db,
        product_id,
        params.rating_filter,
        params.sentiment_filter,
        skip,
        limit,
    )
    .await?;
    Ok(Json(reviews))
}

#[instrument(skip(state, user, payload))]
pub async fn create_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<NewReview>,
) -> AppResult<(StatusCode, Json<Review>)> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5".into()));
    }
    if payload.content.trim().is_empty() {
        return Err(AppError::BadRequest("Review content is required".into()));
    }
    require_product(&state, payload.product_id).await?;

    if repo::user_has_reviewed(&state.db, user.id, payload.product_id).await? {
        warn!(user_id = %user.id, product_id = %payload.product_id, "duplicate review");
        return Err(AppError::BadRequest(ALREADY_REVIEWED.into()));
    }

    let review = repo::create(&state.db, user.id, &payload)
        .await
        .map_err(|e| AppError::duplicate(e, ALREADY_REVIEWED))?;
    info!(review_id = %review.id, user_id = %user.id, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

#[instrument(skip(state))]
pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Review>> {
    let review = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".into()))?;
    Ok(Json(review))
}

#[instrument(skip(state, _user))]
pub async fn mark_helpful(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    let votes = repo::mark_helpful(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".into()))?;
    info!(review_id = %id, votes, "review marked helpful");
    Ok(Json(Message::new("Review marked as helpful")))
}

#[instrument(skip(state))]
pub async fn product_summary(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ReviewSummary>> {
    require_product(&state, product_id).await?;
    Ok(Json(repo::summary(&state.db, product_id).await?))
}

#[derive(Serialize)]
struct ModelRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct ModelResponse {
    results: Vec<Value>,
}

/// Forwards the batch to the sentiment model service.
#[instrument(skip(state, payload), fields(batch = payload.reviews.len()))]
pub async fn analyze_sentiment(
    State(state): State<AppState>,
    Json(payload): Json<SentimentRequest>,
) -> AppResult<Json<SentimentResponse>> {
    if payload.reviews.is_empty() {
        return Err(AppError::BadRequest("No reviews provided".into()));
    }
    if payload.reviews.len() > MAX_SENTIMENT_BATCH {
        return Err(AppError::BadRequest(format!(
            "At most {MAX_SENTIMENT_BATCH} reviews per request"
        )));
    }

    let Some(base) = state.config.sentiment_service_url.as_deref() else {
        return Err(AppError::Unavailable(
            "Sentiment analysis service is not configured".into(),
        ));
    };
    let url = format!("{}/predict_baseline", base.trim_end_matches('/'));

    let unavailable = |e: reqwest::Error| {
        error!(error = %e, "sentiment service call failed");
        AppError::Unavailable("Sentiment analysis service unavailable".into())
    };

    let response = state
        .http
        .post(&url)
        .json(&ModelRequest {
            texts: &payload.reviews,
        })
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(unavailable)?;
    let body: ModelResponse = response.json().await.map_err(unavailable)?;
    if body.results.len() != payload.reviews.len() {
        error!(
            sent = payload.reviews.len(),
            received = body.results.len(),
            "sentiment service returned a partial batch"
        );
        return Err(AppError::Unavailable(
            "Sentiment analysis service returned incomplete results".into(),
        ));
    }

    let predictions = payload
        .reviews
        .into_iter()
        .zip(body.results)
        .map(|(text, raw)| to_prediction(text, &raw))
        .collect();

    Ok(Json(SentimentResponse { predictions }))
}

/// Accepts either a bare label or a `{label, score}` object from the model.
fn to_prediction(text: String, raw: &Value) -> SentimentPrediction {
    let (label, confidence) = match raw {
        Value::String(s) => (s.as_str(), 1.0),
        Value::Object(o) => (
            o.get("label").and_then(Value::as_str).unwrap_or(""),
            o.get("score").and_then(Value::as_f64).unwrap_or(0.0),
        ),
        _ => ("", 0.0),
    };
    let sentiment = label
        .to_lowercase()
        .parse::<SentimentLabel>()
        .unwrap_or(SentimentLabel::Neutral);
    SentimentPrediction {
        text,
        sentiment,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::routing::post;
    use serde_json::json;

    use super::*;
    use crate::config::AppConfig;

    /// State pointed at a model service that labels the first `labelled` texts only.
    async fn with_model(labelled: usize) -> AppState {
        let app = Router::new().route(
            "/predict_baseline",
            post(move |Json(body): Json<Value>| async move {
                let results: Vec<Value> = body["texts"]
                    .as_array()
                    .map(|texts| texts.iter().take(labelled).map(|_| json!("positive")).collect())
                    .unwrap_or_default();
                Json(json!({ "results": results }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut state = AppState::fake();
        state.config = Arc::new(AppConfig {
            sentiment_service_url: Some(format!("http://{addr}")),
            ..(*state.config).clone()
        });
        state
    }

    fn batch() -> SentimentRequest {
        SentimentRequest {
            reviews: vec![
                "Battery life is excellent".into(),
                "Camera is average".into(),
                "Stopped charging after a week".into(),
            ],
        }
    }

    #[tokio::test]
    async fn analyze_labels_every_review() {
        let state = with_model(usize::MAX).await;
        let Json(out) = analyze_sentiment(State(state), Json(batch())).await.unwrap();
        assert_eq!(out.predictions.len(), 3);
        assert_eq!(out.predictions[2].text, "Stopped charging after a week");
        assert_eq!(out.predictions[0].sentiment, SentimentLabel::Positive);
    }

    #[tokio::test]
    async fn short_model_batch_is_unavailable() {
        let state = with_model(1).await;
        let err = analyze_sentiment(State(state), Json(batch())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn model_labels_are_normalized() {
        let p = to_prediction("great".into(), &json!("POSITIVE"));
        assert_eq!(p.sentiment, SentimentLabel::Positive);
        assert_eq!(p.confidence, 1.0);

        let p = to_prediction("meh".into(), &json!({"label": "negative", "score": 0.82}));
        assert_eq!(p.sentiment, SentimentLabel::Negative);
        assert_eq!(p.confidence, 0.82);

        let p = to_prediction("??".into(), &json!(3));
        assert_eq!(p.sentiment, SentimentLabel::Neutral);
    }

    #[tokio::test]
    async fn analyze_without_service_is_unavailable() {
        let state = AppState::fake();
        let err = analyze_sentiment(
            State(state),
            Json(SentimentRequest {
                reviews: vec!["Battery life is excellent".into()],
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn analyze_rejects_empty_batch() {
        let state = AppState::fake();
        let err = analyze_sentiment(State(state), Json(SentimentRequest { reviews: vec![] }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
