//! Wire types shared by the REST server and the client.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Account role; `admin` unlocks the user-management routes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Moderator => "moderator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            other => anyhow::bail!("unknown role: {other}"),
        }
    }
}

/// E-commerce platform an offer or review was collected from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Flipkart,
    Myntra,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Flipkart => "flipkart",
            Platform::Myntra => "myntra",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amazon" => Ok(Platform::Amazon),
            "flipkart" => Ok(Platform::Flipkart),
            "myntra" => Ok(Platform::Myntra),
            other => anyhow::bail!("unknown platform: {other}"),
        }
    }
}

/// Tone of a review, assigned by the external sentiment service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl FromStr for SentimentLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(SentimentLabel::Positive),
            "negative" => Ok(SentimentLabel::Negative),
            "neutral" => Ok(SentimentLabel::Neutral),
            other => anyhow::bail!("unknown sentiment label: {other}"),
        }
    }
}

// ---- auth ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub date_of_birth: Option<Date>,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Preferences>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

fn bearer() -> String {
    "bearer".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub date_of_birth: Option<Date>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Partial profile update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "iso_date::option"
    )]
    pub date_of_birth: Option<Date>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Preferences {
    pub preferred_categories: Vec<String>,
    pub preferred_brands: Vec<String>,
    pub price_range_min: Option<f64>,
    pub price_range_max: Option<f64>,
    pub preferred_platforms: Vec<Platform>,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub newsletter_subscription: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            preferred_categories: Vec::new(),
            preferred_brands: Vec::new(),
            price_range_min: None,
            price_range_max: None,
            preferred_platforms: Vec::new(),
            email_notifications: true,
            push_notifications: true,
            newsletter_subscription: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_brands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_platforms: Option<Vec<Platform>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newsletter_subscription: Option<bool>,
}

impl Preferences {
    pub fn apply(&mut self, update: PreferencesUpdate) {
        if let Some(v) = update.preferred_categories {
            self.preferred_categories = v;
        }
        if let Some(v) = update.preferred_brands {
            self.preferred_brands = v;
        }
        if update.price_range_min.is_some() {
            self.price_range_min = update.price_range_min;
        }
        if update.price_range_max.is_some() {
            self.price_range_max = update.price_range_max;
        }
        if let Some(v) = update.preferred_platforms {
            self.preferred_platforms = v;
        }
        if let Some(v) = update.email_notifications {
            self.email_notifications = v;
        }
        if let Some(v) = update.push_notifications {
            self.push_notifications = v;
        }
        if let Some(v) = update.newsletter_subscription {
            self.newsletter_subscription = v;
        }
    }
}

/// Generic acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---- catalog ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Partial product update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: Uuid,
    pub product_id: Uuid,
    pub platform: Platform,
    pub url: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub discount_percentage: Option<f64>,
    pub availability: String,
    pub seller_name: Option<String>,
    pub shipping_cost: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Offer {
    /// Price the buyer actually pays.
    pub fn landed_price(&self) -> f64 {
        self.price + self.shipping_cost
    }
}

/// Review counts per sentiment label.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentimentSummary {
    pub positive: i64,
    pub negative: i64,
    pub neutral: i64,
}

impl SentimentSummary {
    pub fn total(&self) -> i64 {
        self.positive + self.negative + self.neutral
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub image_url: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_rating: f64,
    pub total_reviews: i64,
    pub best_offer: Option<Offer>,
    pub sentiment_summary: SentimentSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub products: Vec<ProductSummary>,
    pub total_count: i64,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suggestions {
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Categories {
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Brands {
    pub brands: Vec<String>,
}

// ---- reviews ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Option<Uuid>,
    pub platform: Platform,
    pub reviewer_name: Option<String>,
    pub rating: i32,
    pub title: Option<String>,
    pub content: String,
    pub helpful_votes: i32,
    pub verified_purchase: bool,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<SentimentLabel>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub review_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub product_id: Uuid,
    pub platform: Platform,
    #[serde(default)]
    pub reviewer_name: Option<String>,
    pub rating: i32,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub verified_purchase: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewSummary {
    pub product_id: Uuid,
    pub total_reviews: i64,
    pub average_rating: f64,
    /// Review counts for 1 through 5 stars.
    pub rating_distribution: [i64; 5],
    pub sentiment: SentimentSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentRequest {
    pub reviews: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentPrediction {
    pub text: String,
    pub sentiment: SentimentLabel,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentResponse {
    pub predictions: Vec<SentimentPrediction>,
}

// ---- user features ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WishlistItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWishlistItem {
    pub product_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceAlert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub target_price: f64,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_checked: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPriceAlert {
    pub product_id: Uuid,
    pub target_price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceAlertUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub query: String,
    pub results_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSearchHistoryEntry {
    pub query: String,
    pub results_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentSearch {
    pub query: String,
    pub results_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardStats {
    pub wishlist_count: i64,
    pub active_alerts_count: i64,
    pub search_history_count: i64,
    pub recent_searches: Vec<RecentSearch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_platform_use_lowercase_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!("moderator".parse::<Role>().unwrap(), Role::Moderator);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(
            serde_json::from_str::<Platform>("\"flipkart\"").unwrap(),
            Platform::Flipkart
        );
    }

    #[test]
    fn profile_accepts_missing_optional_fields() {
        let json = r#"{
            "id": "5f1d7c3e-4a8b-4c1e-9d2f-0a1b2c3d4e5f",
            "username": "asha",
            "email": "asha@example.com",
            "full_name": null,
            "phone_number": null,
            "role": "user",
            "is_active": true,
            "is_verified": false,
            "created_at": "2024-05-01T10:00:00Z"
        }"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.username, "asha");
        assert!(profile.date_of_birth.is_none());
        assert!(profile.last_login.is_none());
        assert!(profile.preferences.is_none());
    }

    #[test]
    fn date_of_birth_uses_iso_dates() {
        let update = ProfileUpdate {
            date_of_birth: Some(time::macros::date!(1994 - 03 - 07)),
            ..Default::default()
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"date_of_birth":"1994-03-07"}"#);
    }

    #[test]
    fn preferences_apply_only_touches_present_fields() {
        let mut prefs = Preferences::default();
        prefs.apply(PreferencesUpdate {
            preferred_brands: Some(vec!["Apple".into()]),
            email_notifications: Some(false),
            ..Default::default()
        });
        assert_eq!(prefs.preferred_brands, vec!["Apple".to_string()]);
        assert!(!prefs.email_notifications);
        assert!(prefs.push_notifications);
        assert!(prefs.preferred_categories.is_empty());
    }
}
