use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::services::{require_admin, CurrentUser, MaybeAuthUser},
    catalog::{
        dto::{page, ProductListParams, SearchParams, SuggestionParams},
        repo::{self, SearchFilter},
    },
    error::{AppError, AppResult},
    models::{
        Brands, Categories, Message, NewProduct, Offer, Product, ProductSummary, ProductUpdate,
        SearchResponse, Suggestions,
    },
    state::AppState,
    user,
};

pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(search))
        .route("/search/suggestions", get(suggestions))
}

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/search", get(search))
        .route("/products/categories/list", get(categories))
        .route("/products/brands/list", get(brands))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/:id/offers", get(product_offers))
}

#[instrument(skip(state, viewer))]
pub async fn search(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResponse>> {
    let query = params.q.trim().to_string();
    if let (Some(min), Some(max)) = (params.min_price, params.max_price) {
        if min > max {
            return Err(AppError::BadRequest(
                "min_price cannot be greater than max_price".into(),
            ));
        }
    }

    let (skip, limit) = page(params.skip, params.limit);
    let filter = SearchFilter {
        query: &query,
        category: params.category.as_deref(),
        brand: params.brand.as_deref(),
        platform: params.platform,
        min_price: params.min_price,
        max_price: params.max_price,
    };

    let (products, total_count) = repo::search(&state.db, &filter, skip, limit).await?;

    let summaries = repo::summarize_many(&state.db, products).await?;

    if let MaybeAuthUser(Some(user_id)) = viewer {
        if !query.is_empty() {
            // best effort
            if let Err(e) = user::repo::record_search(&state.db, user_id, &query, total_count).await
            {
                warn!(error = %e, %user_id, "search history not recorded");
            }
        }
    }

    info!(query = %query, total_count, returned = summaries.len(), "search served");
    Ok(Json(SearchResponse {
        products: summaries,
        total_count,
        query,
    }))
}

#[instrument(skip(state))]
pub async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> AppResult<Json<Suggestions>> {
    let q = params.q.trim();
    if q.chars().count() < 2 {
        return Ok(Json(Suggestions {
            suggestions: Vec::new(),
        }));
    }
    let limit = params.limit.clamp(1, 20);
    let rows = repo::suggestion_candidates(&state.db, q, limit).await?;
    Ok(Json(Suggestions {
        suggestions: collect_suggestions(q, rows, limit as usize),
    }))
}

/// Distinct matching names, brands and categories, in row order, capped at `limit`.
fn collect_suggestions(
    q: &str,
    rows: Vec<(String, Option<String>, Option<String>)>,
    limit: usize,
) -> Vec<String> {
    let needle = q.to_lowercase();
    let mut out: Vec<String> = Vec::new();
    for (name, category, brand) in rows {
        for candidate in [Some(name), brand, category].into_iter().flatten() {
            if out.len() >= limit {
                return out;
            }
            if candidate.to_lowercase().contains(&needle)
                && !out.iter().any(|s| s.eq_ignore_ascii_case(&candidate))
            {
                out.push(candidate);
            }
        }
    }
    out
}

#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> AppResult<Json<Vec<Product>>> {
    let (skip, limit) = page(params.skip, params.limit);
    let text = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let products = repo::list_products(
        &state.db,
        params.category.as_deref(),
        params.brand.as_deref(),
        text,
        skip,
        limit,
    )
    .await?;
    Ok(Json(products))
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProductSummary>> {
    let product = repo::find_product(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".into()))?;
    Ok(Json(repo::summarize(&state.db, product).await?))
}

fn check_product_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Product name is required".into()));
    }
    Ok(())
}

#[instrument(skip(state, user, payload), fields(name = %payload.name))]
pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<NewProduct>,
) -> AppResult<(StatusCode, Json<Product>)> {
    require_admin(&user, "Not enough permissions to create products")?;
    check_product_name(&payload.name)?;

    let product = repo::create_product(&state.db, &payload).await?;
    info!(product_id = %product.id, admin_id = %user.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(state, user))]
pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(update): Json<ProductUpdate>,
) -> AppResult<Json<Product>> {
    require_admin(&user, "Not enough permissions to update products")?;
    if let Some(name) = &update.name {
        check_product_name(name)?;
    }

    let product = repo::update_product(&state.db, id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".into()))?;
    info!(product_id = %id, admin_id = %user.id, "product updated");
    Ok(Json(product))
}

#[instrument(skip(state, user))]
pub async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    require_admin(&user, "Not enough permissions to delete products")?;

    if !repo::delete_product(&state.db, id).await? {
        return Err(AppError::NotFound("Product not found".into()));
    }
    info!(product_id = %id, admin_id = %user.id, "product deleted");
    Ok(Json(Message::new("Product deleted successfully")))
}

#[instrument(skip(state))]
pub async fn product_offers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Offer>>> {
    if !repo::product_exists(&state.db, id).await? {
        return Err(AppError::NotFound("Product not found".into()));
    }
    Ok(Json(repo::offers_for_product(&state.db, id).await?))
}

#[instrument(skip(state))]
pub async fn categories(State(state): State<AppState>) -> AppResult<Json<Categories>> {
    Ok(Json(Categories {
        categories: repo::distinct_categories(&state.db).await?,
    }))
}

#[instrument(skip(state))]
pub async fn brands(State(state): State<AppState>) -> AppResult<Json<Brands>> {
    Ok(Json(Brands {
        brands: repo::distinct_brands(&state.db).await?,
    }))
}
