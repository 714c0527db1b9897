use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AlertListParams {
    #[serde(default = "default_true")]
    pub active_only: bool,
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}
fn default_history_limit() -> i64 {
    50
}

pub const RECENT_SEARCHES: i64 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_listing_defaults_to_active_only() {
        let p: AlertListParams = serde_json::from_str("{}").unwrap();
        assert!(p.active_only);
        let h: HistoryParams = serde_json::from_str("{}").unwrap();
        assert_eq!(h.limit, 50);
    }
}
