use serde::Deserialize;

use crate::models::SentimentLabel;

#[derive(Debug, Deserialize)]
pub struct ReviewListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub rating_filter: Option<i32>,
    pub sentiment_filter: Option<SentimentLabel>,
}
fn default_limit() -> i64 {
    20
}

pub const MAX_SENTIMENT_BATCH: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_parse_filters() {
        let p: ReviewListParams =
            serde_json::from_str(r#"{"rating_filter":4,"sentiment_filter":"negative"}"#).unwrap();
        assert_eq!(p.limit, 20);
        assert_eq!(p.rating_filter, Some(4));
        assert_eq!(p.sentiment_filter, Some(SentimentLabel::Negative));
    }
}
