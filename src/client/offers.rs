use crate::models::Offer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Price,
    Platform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort state of a price comparison table. Clicking the active column flips
/// the order; clicking another column sorts it ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferSort {
    pub key: SortKey,
    pub order: SortOrder,
}

impl Default for OfferSort {
    fn default() -> Self {
        Self {
            key: SortKey::Price,
            order: SortOrder::Asc,
        }
    }
}

impl OfferSort {
    pub fn toggle(&mut self, key: SortKey) {
        if self.key == key {
            self.order = match self.order {
                SortOrder::Asc => SortOrder::Desc,
                SortOrder::Desc => SortOrder::Asc,
            };
        } else {
            self.key = key;
            self.order = SortOrder::Asc;
        }
    }

    pub fn apply(&self, offers: &mut [Offer]) {
        offers.sort_by(|a, b| {
            let ord = match self.key {
                SortKey::Price => a.price.total_cmp(&b.price),
                SortKey::Platform => a.platform.as_str().cmp(b.platform.as_str()),
            };
            match self.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }

    pub fn sorted(&self, offers: &[Offer]) -> Vec<Offer> {
        let mut out = offers.to_vec();
        self.apply(&mut out);
        out
    }
}

/// Cheapest offer once shipping is added, if any.
pub fn best_deal(offers: &[Offer]) -> Option<&Offer> {
    offers
        .iter()
        .min_by(|a, b| a.landed_price().total_cmp(&b.landed_price()))
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::models::Platform;

    fn offer(platform: Platform, price: f64, shipping: f64) -> Offer {
        Offer {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            platform,
            url: format!("https://{platform}.example/item"),
            price,
            original_price: None,
            discount_percentage: None,
            availability: "in_stock".into(),
            seller_name: None,
            shipping_cost: shipping,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn prices(offers: &[Offer]) -> Vec<f64> {
        offers.iter().map(|o| o.price).collect()
    }

    #[test]
    fn toggling_flips_then_resets_order() {
        let offers = vec![
            offer(Platform::Myntra, 700.0, 0.0),
            offer(Platform::Amazon, 650.0, 40.0),
            offer(Platform::Flipkart, 720.0, 0.0),
        ];
        let mut sort = OfferSort::default();
        assert_eq!(prices(&sort.sorted(&offers)), vec![650.0, 700.0, 720.0]);

        sort.toggle(SortKey::Price);
        assert_eq!(sort.order, SortOrder::Desc);
        assert_eq!(prices(&sort.sorted(&offers)), vec![720.0, 700.0, 650.0]);

        sort.toggle(SortKey::Platform);
        assert_eq!(sort.order, SortOrder::Asc);
        let platforms: Vec<_> = sort.sorted(&offers).iter().map(|o| o.platform).collect();
        assert_eq!(platforms, vec![Platform::Amazon, Platform::Flipkart, Platform::Myntra]);
    }

    #[test]
    fn best_deal_counts_shipping() {
        let offers = vec![
            offer(Platform::Amazon, 650.0, 80.0),
            offer(Platform::Flipkart, 700.0, 0.0),
        ];
        assert_eq!(best_deal(&offers).unwrap().platform, Platform::Flipkart);
        assert!(best_deal(&[]).is_none());
    }
}
