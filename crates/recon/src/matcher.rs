//! Vendor purchase matcher.
//!
//! Resolves one ledger transaction against the [`PurchaseIndex`]; the first
//! path that produces a result wins:
//!
//! 1. refunds (credits only), closest refund date wins;
//! 2. direct references mapping `(date, |amount|)` to one order;
//! 3. the amount bucket, nearest unclaimed shipment first, with the
//!    combination finder splitting multi-item candidates;
//! 4. gift-card-funded orders near a card-present authorization.
//!
//! Resolution is pure; [`PurchaseMatcher::apply`] claims items and writes the
//! result onto the transaction.

use std::fmt;

use chrono::NaiveDate;
use regex::Regex;

use crate::claims::Claims;
use crate::combination::{find_combination, AmbiguityReason, Combination};
use crate::config::VendorConfig;
use crate::error::ReconError;
use crate::index::{ChargeGroup, OrderItem, PurchaseIndex, Refund};
use crate::model::{PassContext, Transaction};
use crate::money::format_cents;

pub const TAG_REFUND: &str = "Refund";
pub const TAG_SPLIT: &str = "Split";
pub const TAG_ADJUSTMENT: &str = "Adjustment";
pub const TAG_MANUAL_REVIEW: &str = "ManualReview";
pub const TAG_GIFT_CARD: &str = "PossibleGiftCard";

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewReason {
    /// Several refunds equally close to the transaction date.
    TiedRefunds,
    /// Several orders referenced for the same date and amount.
    TiedReferences,
    Combination(AmbiguityReason),
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TiedRefunds => write!(f, "several refunds are equally close"),
            Self::TiedReferences => write!(f, "several orders are referenced"),
            Self::Combination(AmbiguityReason::TiedSolutions) => {
                write!(f, "several item combinations fit the amount")
            }
            Self::Combination(AmbiguityReason::SearchCapHit) => {
                write!(f, "too many item combinations to search")
            }
            Self::Combination(AmbiguityReason::TiedAndCapHit) => {
                write!(f, "several item combinations fit and the search was cut short")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// One or more items of one order; more than one means a split.
    Purchase { order_id: String, items: Vec<usize> },
    Refund { refund: usize },
    ManualReview { order_ids: Vec<String>, reason: ReviewReason },
    PossibleGiftCard { order_ids: Vec<String> },
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PurchaseMatcher {
    index: PurchaseIndex,
    config: VendorConfig,
    payee_re: Regex,
    excluded: Vec<String>,
    card_authorization: String,
}

impl PurchaseMatcher {
    pub fn new(index: PurchaseIndex, config: VendorConfig) -> Result<Self, ReconError> {
        let payee_re = config.payee_regex()?;
        let excluded = config
            .excluded_payees
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        let card_authorization = config.card_authorization.to_lowercase();
        Ok(Self {
            index,
            config,
            payee_re,
            excluded,
            card_authorization,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn index(&self) -> &PurchaseIndex {
        &self.index
    }

    /// True when the transaction is a candidate for vendor matching at all.
    pub fn is_eligible(&self, txn: &Transaction, ctx: &PassContext) -> bool {
        if txn.has_note() || txn.is_split() || ctx.is_split {
            return false;
        }
        if !self.payee_re.is_match(&txn.original_payee) {
            return false;
        }
        let raw = txn.original_payee.to_lowercase();
        !self.excluded.iter().any(|e| raw.contains(e.as_str()))
    }

    /// Work out what the transaction corresponds to without touching it.
    pub fn resolve(&self, txn: &Transaction, ctx: &PassContext, claims: &Claims) -> Option<Resolution> {
        if !self.is_eligible(txn, ctx) || txn.amount_cents == 0 {
            return None;
        }

        if txn.amount_cents > 0 {
            if let Some(resolution) = self.resolve_refund(txn) {
                return Some(resolution);
            }
        }

        let amount = txn.amount_cents.abs();
        if let Some(resolution) = self.resolve_reference(txn.date, amount, claims) {
            return Some(resolution);
        }
        if let Some(resolution) = self.resolve_heuristic(txn.date, amount, claims) {
            return Some(resolution);
        }
        self.resolve_gift_card(txn)
    }

    /// Resolve, claim and write the outcome onto the transaction.
    ///
    /// Returns true when the transaction was matched. A transaction with a
    /// note is never touched, so a second call is a no-op.
    pub fn apply(&self, txn: &mut Transaction, ctx: &mut PassContext, claims: &mut Claims) -> bool {
        let Some(resolution) = self.resolve(txn, ctx, claims) else {
            if self.is_eligible(txn, ctx) {
                log::info!(
                    "{} {} {}: no {} match",
                    txn.id,
                    txn.date,
                    format_cents(txn.amount_cents),
                    self.config.name
                );
            }
            return false;
        };

        match resolution {
            Resolution::Purchase { order_id, items } => {
                let Some(order) = self.index.order(&order_id) else {
                    return false;
                };
                if !claims.try_claim(&order_id, &items) {
                    log::debug!("{}: order {order_id} items {items:?} already claimed", txn.id);
                    return false;
                }
                if let [only] = items.as_slice() {
                    self.apply_item(txn, &order.items[*only]);
                    ctx.vendor_category = order.items[*only].category.clone();
                } else {
                    let mut views = Vec::with_capacity(items.len());
                    for &i in &items {
                        let mut view = txn.clone();
                        self.apply_item(&mut view, &order.items[i]);
                        view.add_tag(TAG_SPLIT);
                        views.push(view);
                    }
                    txn.add_tag(&self.config.name);
                    txn.add_tag(TAG_SPLIT);
                    txn.splits = views;
                    ctx.is_split = true;
                    ctx.vendor_category = shared_category(items.iter().map(|&i| &order.items[i]));
                }
                log::debug!("{}: matched order {order_id} items {items:?}", txn.id);
            }
            Resolution::Refund { refund } => {
                let Some(refund) = self.index.refund(refund) else {
                    return false;
                };
                self.apply_refund(txn, refund);
                ctx.vendor_category = refund.category.clone();
                log::debug!("{}: matched refund on order {}", txn.id, refund.order_id);
            }
            Resolution::ManualReview { order_ids, reason } => {
                log::warn!("{}: {} order(s) need manual review: {reason}", txn.id, order_ids.len());
                txn.note = Some(format!("Needs manual review: {reason}.\n\n{}", self.link_list(&order_ids)));
                txn.add_tag(&self.config.name);
                txn.add_tag(TAG_MANUAL_REVIEW);
            }
            Resolution::PossibleGiftCard { order_ids } => {
                log::debug!("{}: {} possible gift card order(s)", txn.id, order_ids.len());
                txn.note = Some(format!(
                    "This purchase may involve an {} gift card.\n\nPossible orders:\n{}",
                    self.config.name,
                    self.link_list(&order_ids)
                ));
                txn.add_tag(TAG_GIFT_CARD);
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Resolution paths
    // -----------------------------------------------------------------------

    fn resolve_refund(&self, txn: &Transaction) -> Option<Resolution> {
        let ids = self.index.refund_candidates(txn.amount_cents);
        let distance = |id: usize| {
            self.index
                .refund(id)
                .map(|r| (r.refund_date - txn.date).num_days().abs())
                .unwrap_or(i64::MAX)
        };
        let closest = ids.iter().map(|&id| distance(id)).min()?;
        let nearest: Vec<usize> = ids.iter().copied().filter(|&id| distance(id) == closest).collect();

        if let [only] = nearest.as_slice() {
            return Some(Resolution::Refund { refund: *only });
        }
        let mut order_ids: Vec<String> = nearest
            .iter()
            .filter_map(|&id| self.index.refund(id))
            .map(|r| r.order_id.clone())
            .collect();
        order_ids.dedup();
        Some(Resolution::ManualReview {
            order_ids,
            reason: ReviewReason::TiedRefunds,
        })
    }

    fn resolve_reference(&self, date: NaiveDate, amount: i64, claims: &Claims) -> Option<Resolution> {
        let order_ids = self.index.referenced_orders(date, amount);
        if order_ids.len() > 1 {
            return Some(Resolution::ManualReview {
                order_ids: order_ids.to_vec(),
                reason: ReviewReason::TiedReferences,
            });
        }
        let group = self.index.whole_order(order_ids.first()?)?;
        if !claims.is_available(&group) {
            log::debug!("reference to order {} skipped: already claimed", group.order_id);
            return None;
        }
        self.fit_group(&group, amount)
    }

    fn resolve_heuristic(&self, date: NaiveDate, amount: i64, claims: &Claims) -> Option<Resolution> {
        let window = i64::from(self.config.proximity_days);
        let mut candidates: Vec<(i64, &ChargeGroup)> = self
            .index
            .candidates(amount)
            .iter()
            .map(|g| ((date - g.date).num_days(), g))
            .filter(|&(days, g)| (0..=window).contains(&days) && claims.is_available(g))
            .collect();
        candidates.sort_by_key(|&(days, _)| days);

        for (days, group) in candidates {
            log::debug!(
                "candidate order {} {:?} ({} days before)",
                group.order_id,
                group.scope,
                days
            );
            if let Some(resolution) = self.fit_group(group, amount) {
                return Some(resolution);
            }
        }
        None
    }

    fn resolve_gift_card(&self, txn: &Transaction) -> Option<Resolution> {
        if self.card_authorization.is_empty() || !txn.original_payee.to_lowercase().contains(&self.card_authorization) {
            return None;
        }
        let window = i64::from(self.config.proximity_days);
        let order_ids: Vec<String> = self
            .index
            .gift_card_orders()
            .filter(|o| (txn.date - o.order_date).num_days().abs() <= window)
            .map(|o| o.id.clone())
            .collect();
        if order_ids.is_empty() {
            return None;
        }
        Some(Resolution::PossibleGiftCard { order_ids })
    }

    /// Pick the items of one candidate that explain `amount`.
    fn fit_group(&self, group: &ChargeGroup, amount: i64) -> Option<Resolution> {
        let order = self.index.order(&group.order_id)?;
        let cents: Vec<i64> = group.items.iter().map(|&i| order.items[i].amount_cents).collect();
        match find_combination(amount, &cents, self.config.max_nodes) {
            Combination::Found(picked) => Some(Resolution::Purchase {
                order_id: group.order_id.clone(),
                items: picked.into_iter().map(|k| group.items[k]).collect(),
            }),
            Combination::Ambiguous { reason, .. } => Some(Resolution::ManualReview {
                order_ids: vec![group.order_id.clone()],
                reason: ReviewReason::Combination(reason),
            }),
            Combination::NoMatch => None,
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    fn apply_item(&self, txn: &mut Transaction, item: &OrderItem) {
        let mut note = item.title.clone();
        if let Some(original) = item.original_cents {
            note.push_str(&format!("\n\nOriginal price: {}", format_cents(original)));
        }
        note.push_str("\n\n");
        note.push_str(&self.config.order_link(&item.order_id));

        txn.note = Some(note);
        txn.payee = self.payee_for(&item.seller);
        txn.date = item.order_date;
        // A credit keeps its sign.
        txn.amount_cents = if txn.amount_cents > 0 { item.amount_cents } else { -item.amount_cents };
        txn.add_tag(&self.config.name);
        if let Some(category) = &item.category {
            txn.add_tag(category);
        }
        if item.is_adjusted() {
            txn.add_tag(TAG_ADJUSTMENT);
        }
    }

    fn apply_refund(&self, txn: &mut Transaction, refund: &Refund) {
        txn.note = Some(format!("{}\n\n{}", refund.title, self.config.order_link(&refund.order_id)));
        txn.payee = self.payee_for(&refund.seller);
        txn.date = refund.order_date;
        txn.add_tag(&self.config.name);
        txn.add_tag(TAG_REFUND);
        if let Some(category) = &refund.category {
            txn.add_tag(category);
        }
    }

    fn payee_for(&self, seller: &str) -> String {
        if seller.trim().is_empty() {
            self.config.name.clone()
        } else {
            seller.to_string()
        }
    }

    fn link_list(&self, order_ids: &[String]) -> String {
        order_ids
            .iter()
            .map(|id| format!("• {}", self.config.order_link(id)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The category all items share, if they share one.
fn shared_category<'a>(mut items: impl Iterator<Item = &'a OrderItem>) -> Option<String> {
    let first = items.next()?.category.clone()?;
    items.all(|i| i.category.as_deref() == Some(first.as_str())).then_some(first)
}
