use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    client::{
        api::SearchQuery,
        error::ApiError,
        http::ApiClient,
    },
    models::{ProductSummary, SearchResponse},
};

/// Anything that can answer a product search.
#[async_trait]
pub trait SearchSource: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ApiError>;
}

#[async_trait]
impl SearchSource for ApiClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ApiError> {
        ApiClient::search(self, query).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchState {
    /// Nothing typed yet.
    Prompt,
    Loading { query: String },
    Loaded {
        query: String,
        total_count: i64,
        products: Vec<ProductSummary>,
    },
    NoResults { query: String },
    Failed { query: String, message: String },
}

/// Results page state machine over a [`SearchSource`].
pub struct SearchView {
    source: Arc<dyn SearchSource>,
    state: watch::Sender<SearchState>,
    last: Option<SearchQuery>,
}

impl SearchView {
    pub fn new(source: Arc<dyn SearchSource>) -> Self {
        let (state, _) = watch::channel(SearchState::Prompt);
        Self {
            source,
            state,
            last: None,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    /// Runs `query`; a blank query resets to the prompt without calling the source.
    pub async fn search(&mut self, query: SearchQuery) -> SearchState {
        let text = query.q.trim().to_string();
        if text.is_empty() {
            self.last = None;
            self.state.send_replace(SearchState::Prompt);
            return SearchState::Prompt;
        }
        let query = SearchQuery { q: text, ..query };
        self.last = Some(query.clone());
        self.run(query).await
    }

    /// Re-issues the last query after a failure.
    pub async fn retry(&mut self) -> SearchState {
        match self.last.clone() {
            Some(query) => self.run(query).await,
            None => self.state(),
        }
    }

    async fn run(&self, query: SearchQuery) -> SearchState {
        let text = query.q.clone();
        self.state.send_replace(SearchState::Loading {
            query: text.clone(),
        });

        let next = match self.source.search(&query).await {
            Ok(res) if res.products.is_empty() => SearchState::NoResults { query: text },
            Ok(res) => {
                debug!(query = %text, total = res.total_count, "search loaded");
                SearchState::Loaded {
                    query: text,
                    total_count: res.total_count,
                    products: res.products,
                }
            }
            Err(e) => {
                warn!(query = %text, error = %e, "search failed");
                SearchState::Failed {
                    query: text,
                    message: e.message(),
                }
            }
        };
        self.state.send_replace(next.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::models::{Offer, Platform, SentimentSummary};

    fn summary(name: &str, price: f64) -> ProductSummary {
        let id = Uuid::new_v4();
        ProductSummary {
            id,
            name: name.into(),
            description: None,
            brand: Some("Apple".into()),
            image_url: None,
            min_price: Some(price),
            max_price: Some(price + 2000.0),
            avg_rating: 4.5,
            total_reviews: 120,
            best_offer: Some(Offer {
                id: Uuid::new_v4(),
                product_id: id,
                platform: Platform::Amazon,
                url: "https://amazon.in/x".into(),
                price,
                original_price: None,
                discount_percentage: None,
                availability: "in_stock".into(),
                seller_name: None,
                shipping_cost: 0.0,
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
            }),
            sentiment_summary: SentimentSummary {
                positive: 100,
                negative: 10,
                neutral: 10,
            },
        }
    }

    /// Fails the first `fail_first` calls, then serves a fixed catalog.
    struct FakeSource {
        calls: AtomicUsize,
        fail_first: usize,
        seen: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SearchSource for FakeSource {
        async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ApiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(query.q.clone());
            if n < self.fail_first {
                return Err(ApiError::Server {
                    status: 503,
                    message: Some("Search temporarily unavailable".into()),
                });
            }
            let products: Vec<_> = if query.q.contains("iPhone") {
                vec![summary("iPhone 15", 69900.0), summary("iPhone 15 Pro", 129900.0)]
            } else {
                Vec::new()
            };
            Ok(SearchResponse {
                total_count: products.len() as i64,
                products,
                query: query.q.clone(),
            })
        }
    }

    #[tokio::test]
    async fn known_product_yields_one_summary_per_match() {
        let source = FakeSource::new(0);
        let mut view = SearchView::new(source.clone());

        let state = view.search(SearchQuery::text("iPhone 15")).await;

        match state {
            SearchState::Loaded {
                query,
                total_count,
                products,
            } => {
                assert_eq!(query, "iPhone 15");
                assert!(total_count > 0);
                assert_eq!(products.len() as i64, total_count);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_query_prompts_without_request() {
        let source = FakeSource::new(0);
        let mut view = SearchView::new(source.clone());

        assert_eq!(view.search(SearchQuery::text("")).await, SearchState::Prompt);
        assert_eq!(view.search(SearchQuery::text("   ")).await, SearchState::Prompt);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_result_is_no_results() {
        let mut view = SearchView::new(FakeSource::new(0));
        assert_eq!(
            view.search(SearchQuery::text("zzz")).await,
            SearchState::NoResults {
                query: "zzz".into()
            }
        );
    }

    #[tokio::test]
    async fn failure_then_manual_retry() {
        let source = FakeSource::new(1);
        let mut view = SearchView::new(source.clone());

        let failed = view.search(SearchQuery::text(" iPhone 15 ")).await;
        assert_eq!(
            failed,
            SearchState::Failed {
                query: "iPhone 15".into(),
                message: "Search temporarily unavailable".into()
            }
        );

        assert!(matches!(view.retry().await, SearchState::Loaded { .. }));
        assert_eq!(
            *source.seen.lock().unwrap(),
            vec!["iPhone 15".to_string(), "iPhone 15".to_string()]
        );
    }

    #[tokio::test]
    async fn observers_see_loading_before_result() {
        let mut view = SearchView::new(FakeSource::new(0));
        let mut rx = view.subscribe();
        view.search(SearchQuery::text("iPhone 15")).await;
        assert!(rx.has_changed().unwrap());
        assert!(matches!(*rx.borrow_and_update(), SearchState::Loaded { .. }));
    }
}
