use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::services::{CurrentUser, MaybeAuthUser},
    catalog,
    error::{AppError, AppResult},
    models::{
        DashboardStats, Message, NewPriceAlert, NewSearchHistoryEntry, NewWishlistItem,
        PriceAlert, PriceAlertUpdate, SearchHistoryEntry, WishlistItem,
    },
    state::AppState,
    user::{
        dto::{AlertListParams, HistoryParams, RECENT_SEARCHES},
        repo,
    },
};

const ACTIVE_ALERT_EXISTS: &str = "Active price alert already exists for this product";

pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/user/wishlist", get(get_wishlist).post(add_to_wishlist))
        .route("/user/wishlist/:product_id", delete(remove_from_wishlist))
}

pub fn alert_routes() -> Router<AppState> {
    Router::new()
        .route("/user/alerts", get(get_alerts).post(create_alert))
        .route("/user/alerts/:id", patch(update_alert).delete(delete_alert))
}

pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/user/search-history",
            get(get_history).post(add_history).delete(clear_history),
        )
        .route("/user/search-history/:id", delete(delete_history_entry))
        .route("/user/dashboard/stats", get(dashboard_stats))
}

fn check_price(price: f64) -> AppResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::BadRequest("Target price must be positive".into()));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_wishlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<WishlistItem>>> {
    Ok(Json(repo::wishlist(&state.db, user.id).await?))
}

#[instrument(skip(state, user))]
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(item): Json<NewWishlistItem>,
) -> AppResult<(StatusCode, Json<WishlistItem>)> {
    if !catalog::repo::product_exists(&state.db, item.product_id).await? {
        return Err(AppError::NotFound("Product not found".into()));
    }
    let Some(added) = repo::add_to_wishlist(&state.db, user.id, item.product_id).await? else {
        warn!(user_id = %user.id, product_id = %item.product_id, "already in wishlist");
        return Err(AppError::BadRequest("Product already in wishlist".into()));
    };
    info!(user_id = %user.id, product_id = %item.product_id, "wishlist item added");
    Ok((StatusCode::CREATED, Json(added)))
}

#[instrument(skip(state, user))]
pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    if !repo::remove_from_wishlist(&state.db, user.id, product_id).await? {
        return Err(AppError::NotFound("Product not found in wishlist".into()));
    }
    info!(user_id = %user.id, %product_id, "wishlist item removed");
    Ok(Json(Message::new("Product removed from wishlist")))
}

#[instrument(skip(state, user))]
pub async fn get_alerts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<AlertListParams>,
) -> AppResult<Json<Vec<PriceAlert>>> {
    Ok(Json(
        repo::alerts(&state.db, user.id, params.active_only).await?,
    ))
}

#[instrument(skip(state, user))]
pub async fn create_alert(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(alert): Json<NewPriceAlert>,
) -> AppResult<(StatusCode, Json<PriceAlert>)> {
    check_price(alert.target_price)?;
    if !catalog::repo::product_exists(&state.db, alert.product_id).await? {
        return Err(AppError::NotFound("Product not found".into()));
    }
    if repo::has_active_alert(&state.db, user.id, alert.product_id).await? {
        return Err(AppError::BadRequest(ACTIVE_ALERT_EXISTS.into()));
    }
    let created = repo::create_alert(&state.db, user.id, alert.product_id, alert.target_price)
        .await
        .map_err(|e| AppError::duplicate(e, ACTIVE_ALERT_EXISTS))?;
    info!(user_id = %user.id, alert_id = %created.id, "price alert created");
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, user))]
pub async fn update_alert(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(update): Json<PriceAlertUpdate>,
) -> AppResult<Json<Message>> {
    if let Some(price) = update.target_price {
        check_price(price)?;
    }
    if update.is_active == Some(true)
        && repo::has_other_active_alert(&state.db, user.id, id).await?
    {
        return Err(AppError::BadRequest(ACTIVE_ALERT_EXISTS.into()));
    }
    repo::update_alert(&state.db, user.id, id, &update)
        .await
        .map_err(|e| AppError::duplicate(e, ACTIVE_ALERT_EXISTS))?
        .ok_or_else(|| AppError::NotFound("Price alert not found".into()))?;
    info!(user_id = %user.id, alert_id = %id, "price alert updated");
    Ok(Json(Message::new("Price alert updated successfully")))
}

#[instrument(skip(state, user))]
pub async fn delete_alert(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    if !repo::delete_alert(&state.db, user.id, id).await? {
        return Err(AppError::NotFound("Price alert not found".into()));
    }
    info!(user_id = %user.id, alert_id = %id, "price alert deleted");
    Ok(Json(Message::new("Price alert deleted successfully")))
}

#[instrument(skip(state, user))]
pub async fn get_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<Vec<SearchHistoryEntry>>> {
    let limit = params.limit.clamp(1, 200);
    Ok(Json(repo::history(&state.db, user.id, limit).await?))
}

/// Anonymous callers get an acknowledgement and nothing is stored.
#[instrument(skip(state, viewer, entry))]
pub async fn add_history(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Json(entry): Json<NewSearchHistoryEntry>,
) -> AppResult<Json<Message>> {
    let MaybeAuthUser(Some(user_id)) = viewer else {
        return Ok(Json(Message::new("Search not saved - user not logged in")));
    };
    let query = entry.query.trim();
    if query.is_empty() {
        return Err(AppError::BadRequest("Query is required".into()));
    }
    let stored = repo::record_search(&state.db, user_id, query, entry.results_count.max(0)).await?;
    info!(%user_id, stored, "search history recorded");
    Ok(Json(Message::new("Search added to history")))
}

#[instrument(skip(state, user))]
pub async fn delete_history_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    if !repo::delete_history_entry(&state.db, user.id, id).await? {
        return Err(AppError::NotFound("Search history item not found".into()));
    }
    Ok(Json(Message::new("Search history item deleted")))
}

#[instrument(skip_all)]
pub async fn clear_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Message>> {
    let removed = repo::clear_history(&state.db, user.id).await?;
    info!(user_id = %user.id, removed, "search history cleared");
    Ok(Json(Message::new("Search history cleared")))
}

#[instrument(skip_all)]
pub async fn dashboard_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<DashboardStats>> {
    let counts = repo::dashboard_counts(&state.db, user.id).await?;
    let recent_searches = repo::recent_searches(&state.db, user.id, RECENT_SEARCHES).await?;
    Ok(Json(DashboardStats {
        wishlist_count: counts.wishlist_count,
        active_alerts_count: counts.active_alerts_count,
        search_history_count: counts.search_history_count,
        recent_searches,
    }))
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;
    use crate::error::test_support::db_error;

    #[tokio::test]
    async fn alert_lost_to_unique_index_is_a_400() {
        let res = AppError::duplicate(
            db_error(true, Some("price_alerts_one_active_idx")),
            ACTIVE_ALERT_EXISTS,
        )
        .into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], ACTIVE_ALERT_EXISTS);
    }

    #[test]
    fn target_price_must_be_positive() {
        assert!(check_price(199.0).is_ok());
        assert!(check_price(0.0).is_err());
        assert!(check_price(-3.5).is_err());
        assert!(check_price(f64::NAN).is_err());
    }

    #[tokio::test]
    async fn anonymous_history_is_acknowledged_not_stored() {
        let state = AppState::fake();
        let Json(msg) = add_history(
            State(state),
            MaybeAuthUser(None),
            Json(NewSearchHistoryEntry {
                query: "iPhone 15".into(),
                results_count: 3,
            }),
        )
        .await
        .unwrap();
        assert_eq!(msg.message, "Search not saved - user not logged in");
    }
}
