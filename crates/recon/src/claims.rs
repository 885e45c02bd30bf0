use std::collections::BTreeSet;

use crate::index::ChargeGroup;

/// Order items already consumed by a resolved transaction in this run.
///
/// Owned by the caller and threaded through the pipeline, so a run's claims
/// can be inspected afterwards or carried into a follow-up run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    claimed: BTreeSet<(String, usize)>,
}

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, order_id: &str, item: usize) -> bool {
        self.claimed.contains(&(order_id.to_string(), item))
    }

    /// True when none of the group's items has been claimed.
    pub fn is_available(&self, group: &ChargeGroup) -> bool {
        group.items.iter().all(|&i| !self.is_claimed(&group.order_id, i))
    }

    /// Claim every listed item of one order, or none of them.
    ///
    /// Returns false (and claims nothing) if any item is already taken.
    pub fn try_claim(&mut self, order_id: &str, items: &[usize]) -> bool {
        if items.iter().any(|&i| self.is_claimed(order_id, i)) {
            return false;
        }
        for &i in items {
            self.claimed.insert((order_id.to_string(), i));
        }
        true
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.claimed.iter().map(|(order, item)| (order.as_str(), *item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Scope;
    use chrono::NaiveDate;

    #[test]
    fn claim_is_all_or_nothing() {
        let mut claims = Claims::new();
        assert!(claims.try_claim("A", &[0]));
        assert!(!claims.try_claim("A", &[0, 1]));
        assert!(!claims.is_claimed("A", 1));
        assert!(claims.try_claim("A", &[1]));
        assert!(claims.try_claim("B", &[0]));
        assert_eq!(claims.len(), 3);
    }

    #[test]
    fn group_available_until_any_item_claimed() {
        let group = ChargeGroup {
            order_id: "A".into(),
            amount_cents: 3000,
            date: NaiveDate::from_ymd_opt(2020, 3, 3).unwrap(),
            items: vec![0, 1],
            scope: Scope::Order,
        };
        let mut claims = Claims::new();
        assert!(claims.is_available(&group));
        claims.try_claim("A", &[1]);
        assert!(!claims.is_available(&group));
        assert_eq!(claims.iter().collect::<Vec<_>>(), vec![("A", 1)]);
    }
}
