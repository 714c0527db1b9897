use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    client::{error::ApiError, http::ApiClient},
    models::{DashboardStats, PriceAlert, SearchHistoryEntry, UserProfile, WishlistItem},
};

/// The signed-in user's dashboard. Removals hit the server first and only
/// touch the local lists once it agrees.
pub struct Dashboard {
    api: Arc<ApiClient>,
    profile: Option<UserProfile>,
    wishlist: Vec<WishlistItem>,
    alerts: Vec<PriceAlert>,
    history: Vec<SearchHistoryEntry>,
    stats: Option<DashboardStats>,
}

impl Dashboard {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            profile: None,
            wishlist: Vec::new(),
            alerts: Vec::new(),
            history: Vec::new(),
            stats: None,
        }
    }

    pub async fn load(&mut self) -> Result<(), ApiError> {
        let (profile, wishlist, alerts, history, stats) = tokio::try_join!(
            self.api.me(),
            self.api.wishlist(),
            self.api.alerts(false),
            self.api.search_history(None),
            self.api.dashboard_stats(),
        )?;
        self.profile = Some(profile);
        self.wishlist = wishlist;
        self.alerts = alerts;
        self.history = history;
        self.stats = Some(stats);
        Ok(())
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn wishlist(&self) -> &[WishlistItem] {
        &self.wishlist
    }

    pub fn alerts(&self) -> &[PriceAlert] {
        &self.alerts
    }

    pub fn history(&self) -> &[SearchHistoryEntry] {
        &self.history
    }

    pub fn stats(&self) -> Option<&DashboardStats> {
        self.stats.as_ref()
    }

    pub async fn remove_wishlist_item(&mut self, product_id: Uuid) -> Result<(), ApiError> {
        self.api
            .remove_from_wishlist(product_id)
            .await
            .inspect_err(|e| warn!(error = %e, %product_id, "wishlist removal failed"))?;
        self.wishlist.retain(|w| w.product_id != product_id);
        info!(%product_id, "wishlist item removed");
        Ok(())
    }

    pub async fn remove_alert(&mut self, alert_id: Uuid) -> Result<(), ApiError> {
        self.api
            .delete_alert(alert_id)
            .await
            .inspect_err(|e| warn!(error = %e, %alert_id, "alert removal failed"))?;
        self.alerts.retain(|a| a.id != alert_id);
        Ok(())
    }

    pub async fn remove_search_entry(&mut self, entry_id: Uuid) -> Result<(), ApiError> {
        self.api
            .delete_search_entry(entry_id)
            .await
            .inspect_err(|e| warn!(error = %e, %entry_id, "history removal failed"))?;
        self.history.retain(|h| h.id != entry_id);
        Ok(())
    }

    pub async fn clear_history(&mut self) -> Result<(), ApiError> {
        self.api.clear_search_history().await?;
        self.history.clear();
        Ok(())
    }
}
