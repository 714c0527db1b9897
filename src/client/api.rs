//! Typed wrappers for every `/api/v1` endpoint.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    client::{
        error::ApiError,
        http::{ApiClient, ApiRequest},
    },
    models::{
        Brands, Categories, DashboardStats, LoginRequest, Message, NewPriceAlert, NewProduct,
        NewReview, NewSearchHistoryEntry, NewWishlistItem, Offer, Platform, PreferencesUpdate,
        PriceAlert, PriceAlertUpdate, Product, ProductSummary, ProductUpdate, ProfileUpdate,
        RegisterRequest, Review, ReviewSummary, SearchHistoryEntry, SearchResponse,
        SentimentLabel, SentimentRequest, SentimentResponse, Suggestions, TokenPair, UserProfile,
        WishlistItem,
    },
};

/// Query for `GET /search`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SearchQuery {
    pub q: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub platform: Option<Platform>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl SearchQuery {
    pub fn text(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub rating: Option<i32>,
    pub sentiment: Option<SentimentLabel>,
}

impl ApiClient {
    // ---- auth ----

    pub async fn login(&self, credentials: &LoginRequest) -> Result<TokenPair, ApiError> {
        self.send(
            ApiRequest::post("/auth/login")
                .json(credentials)?
                .without_auth_recovery(),
        )
        .await
    }

    pub async fn register(&self, data: &RegisterRequest) -> Result<UserProfile, ApiError> {
        self.send(
            ApiRequest::post("/auth/register")
                .json(data)?
                .without_auth_recovery(),
        )
        .await
    }

    pub async fn logout(&self) -> Result<Message, ApiError> {
        self.send(ApiRequest::post("/auth/logout").without_auth_recovery())
            .await
    }

    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.send(ApiRequest::get("/auth/me")).await
    }

    pub async fn update_me(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        self.send(ApiRequest::patch("/auth/me").json(update)?).await
    }

    pub async fn update_preferences(
        &self,
        update: &PreferencesUpdate,
    ) -> Result<Message, ApiError> {
        self.send(ApiRequest::patch("/auth/me/preferences").json(update)?)
            .await
    }

    // ---- search and products ----

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ApiError> {
        let req = ApiRequest::get("/search")
            .param("q", &query.q)
            .opt_param("category", query.category.as_deref())
            .opt_param("brand", query.brand.as_deref())
            .opt_param("min_price", query.min_price)
            .opt_param("max_price", query.max_price)
            .opt_param("platform", query.platform.map(|p| p.as_str()))
            .opt_param("skip", query.skip)
            .opt_param("limit", query.limit);
        self.send(req).await
    }

    pub async fn suggestions(&self, q: &str, limit: Option<i64>) -> Result<Suggestions, ApiError> {
        self.send(
            ApiRequest::get("/search/suggestions")
                .param("q", q)
                .opt_param("limit", limit),
        )
        .await
    }

    pub async fn products(&self, filter: &ProductFilter) -> Result<Vec<Product>, ApiError> {
        let req = ApiRequest::get("/products")
            .opt_param("category", filter.category.as_deref())
            .opt_param("brand", filter.brand.as_deref())
            .opt_param("search", filter.search.as_deref())
            .opt_param("skip", filter.skip)
            .opt_param("limit", filter.limit);
        self.send(req).await
    }

    pub async fn product(&self, id: Uuid) -> Result<ProductSummary, ApiError> {
        self.send(ApiRequest::get(format!("/products/{id}"))).await
    }

    pub async fn product_offers(&self, id: Uuid) -> Result<Vec<Offer>, ApiError> {
        self.send(ApiRequest::get(format!("/products/{id}/offers")))
            .await
    }

    pub async fn categories(&self) -> Result<Categories, ApiError> {
        self.send(ApiRequest::get("/products/categories/list")).await
    }

    pub async fn brands(&self) -> Result<Brands, ApiError> {
        self.send(ApiRequest::get("/products/brands/list")).await
    }

    /// Admin only.
    pub async fn create_product(&self, product: &NewProduct) -> Result<Product, ApiError> {
        self.send(ApiRequest::post("/products").json(product)?).await
    }

    pub async fn update_product(
        &self,
        id: Uuid,
        update: &ProductUpdate,
    ) -> Result<Product, ApiError> {
        self.send(ApiRequest::put(format!("/products/{id}")).json(update)?)
            .await
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<Message, ApiError> {
        self.send(ApiRequest::delete(format!("/products/{id}"))).await
    }

    // ---- reviews ----

    pub async fn product_reviews(
        &self,
        product_id: Uuid,
        filter: &ReviewFilter,
    ) -> Result<Vec<Review>, ApiError> {
        let req = ApiRequest::get(format!("/reviews/product/{product_id}"))
            .opt_param("skip", filter.skip)
            .opt_param("limit", filter.limit)
            .opt_param("rating_filter", filter.rating)
            .opt_param("sentiment_filter", filter.sentiment.map(|s| s.as_str()));
        self.send(req).await
    }

    pub async fn create_review(&self, review: &NewReview) -> Result<Review, ApiError> {
        self.send(ApiRequest::post("/reviews").json(review)?).await
    }

    pub async fn review(&self, id: Uuid) -> Result<Review, ApiError> {
        self.send(ApiRequest::get(format!("/reviews/{id}"))).await
    }

    pub async fn mark_review_helpful(&self, id: Uuid) -> Result<Message, ApiError> {
        self.send(ApiRequest::patch(format!("/reviews/{id}/helpful")))
            .await
    }

    pub async fn review_summary(&self, product_id: Uuid) -> Result<ReviewSummary, ApiError> {
        self.send(ApiRequest::get(format!("/reviews/product/{product_id}/summary")))
            .await
    }

    pub async fn analyze_sentiment(
        &self,
        reviews: Vec<String>,
    ) -> Result<SentimentResponse, ApiError> {
        let req =
            ApiRequest::post("/reviews/sentiment/analyze").json(&SentimentRequest { reviews })?;
        self.send(req).await
    }

    // ---- user features ----

    pub async fn wishlist(&self) -> Result<Vec<WishlistItem>, ApiError> {
        self.send(ApiRequest::get("/user/wishlist")).await
    }

    pub async fn add_to_wishlist(&self, product_id: Uuid) -> Result<WishlistItem, ApiError> {
        self.send(ApiRequest::post("/user/wishlist").json(&NewWishlistItem { product_id })?)
            .await
    }

    pub async fn remove_from_wishlist(&self, product_id: Uuid) -> Result<Message, ApiError> {
        self.send(ApiRequest::delete(format!("/user/wishlist/{product_id}")))
            .await
    }

    pub async fn alerts(&self, active_only: bool) -> Result<Vec<PriceAlert>, ApiError> {
        self.send(ApiRequest::get("/user/alerts").param("active_only", active_only))
            .await
    }

    pub async fn create_alert(&self, alert: &NewPriceAlert) -> Result<PriceAlert, ApiError> {
        self.send(ApiRequest::post("/user/alerts").json(alert)?).await
    }

    pub async fn update_alert(
        &self,
        id: Uuid,
        update: &PriceAlertUpdate,
    ) -> Result<Message, ApiError> {
        self.send(ApiRequest::patch(format!("/user/alerts/{id}")).json(update)?)
            .await
    }

    pub async fn delete_alert(&self, id: Uuid) -> Result<Message, ApiError> {
        self.send(ApiRequest::delete(format!("/user/alerts/{id}")))
            .await
    }

    pub async fn search_history(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<SearchHistoryEntry>, ApiError> {
        self.send(ApiRequest::get("/user/search-history").opt_param("limit", limit))
            .await
    }

    pub async fn record_search(&self, entry: &NewSearchHistoryEntry) -> Result<Message, ApiError> {
        self.send(ApiRequest::post("/user/search-history").json(entry)?)
            .await
    }

    pub async fn delete_search_entry(&self, id: Uuid) -> Result<Message, ApiError> {
        self.send(ApiRequest::delete(format!("/user/search-history/{id}")))
            .await
    }

    pub async fn clear_search_history(&self) -> Result<Message, ApiError> {
        self.send(ApiRequest::delete("/user/search-history")).await
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.send(ApiRequest::get("/user/dashboard/stats")).await
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use axum::{
        extract::{Path, Query},
        routing::{delete, get},
        Json, Router,
    };
    use serde_json::json;

    use super::*;
    use crate::client::{http::test_support::*, token_store::MemoryTokenStore};

    #[tokio::test]
    async fn search_sends_only_present_filters() {
        let app = Router::new().route(
            "/api/v1/search",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("q").map(String::as_str), Some("iPhone 15"));
                assert_eq!(q.get("platform").map(String::as_str), Some("amazon"));
                assert!(!q.contains_key("brand"));
                Json(json!({"products": [], "total_count": 0, "query": q["q"]}))
            }),
        );
        let base = spawn(app).await;
        let api = client(&base, Arc::new(MemoryTokenStore::new()));

        let res = api
            .search(&SearchQuery {
                platform: Some(Platform::Amazon),
                ..SearchQuery::text("iPhone 15")
            })
            .await
            .unwrap();
        assert_eq!(res.query, "iPhone 15");
        assert_eq!(res.total_count, 0);
    }

    #[tokio::test]
    async fn delete_paths_carry_ids_and_bearer() {
        let id = Uuid::new_v4();
        let app = Router::new().route(
            "/api/v1/user/wishlist/:product_id",
            delete(
                |Path(pid): Path<Uuid>, headers: axum::http::HeaderMap| async move {
                    assert_eq!(bearer(&headers).as_deref(), Some("acc"));
                    Json(json!({"message": format!("removed {pid}")}))
                },
            ),
        );
        let base = spawn(app).await;
        let api = client(&base, Arc::new(MemoryTokenStore::with_tokens("acc", "ref")));

        let msg = api.remove_from_wishlist(id).await.unwrap();
        assert_eq!(msg.message, format!("removed {id}"));
    }

    #[tokio::test]
    async fn server_detail_surfaces_in_error() {
        let app = Router::new().route(
            "/api/v1/user/wishlist",
            axum::routing::post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(json!({"detail": "Product already in wishlist"})),
                )
            }),
        );
        let base = spawn(app).await;
        let api = client(&base, Arc::new(MemoryTokenStore::with_tokens("acc", "ref")));

        let err = api.add_to_wishlist(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.message(), "Product already in wishlist");
        assert_eq!(err.status(), Some(400));
    }
}
