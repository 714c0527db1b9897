/// Popular searches offered before the catalog has answered.
pub const POPULAR_SEARCHES: &[&str] = &[
    "iPhone 15",
    "iPhone 15 Pro",
    "iPhone 15 Pro Max",
    "Samsung Galaxy S23",
    "Samsung Galaxy S24",
    "Samsung Galaxy S24 Ultra",
    "MacBook Air",
    "MacBook Pro",
    "Sony WH-1000XM5",
    "Nike Air Max",
    "AirPods Pro",
    "iPad Pro",
    "Apple Watch",
];

/// Case-insensitive substring filter over `candidates`, keeping their order.
/// An empty input yields nothing.
pub fn filter<'a>(input: &str, candidates: &[&'a str], limit: usize) -> Vec<&'a str> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    candidates
        .iter()
        .copied()
        .filter(|c| c.to_lowercase().contains(&needle))
        .take(limit)
        .collect()
}

pub fn suggest(input: &str) -> Vec<&'static str> {
    filter(input, POPULAR_SEARCHES, 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_ignore_case_and_keep_order() {
        assert_eq!(
            suggest("PRO max"),
            vec!["iPhone 15 Pro Max"]
        );
        assert_eq!(
            suggest("air"),
            vec!["MacBook Air", "Nike Air Max", "AirPods Pro"]
        );
    }

    #[test]
    fn empty_input_and_limit() {
        assert!(suggest("").is_empty());
        assert!(suggest("   ").is_empty());
        assert_eq!(filter("i", POPULAR_SEARCHES, 2).len(), 2);
        assert!(suggest("toaster").is_empty());
    }
}
