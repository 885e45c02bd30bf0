//! Purchase index: lookup structures over the vendor's order, item and
//! refund records.
//!
//! Built once per run before any matching starts. The only mutation of
//! purchase data happens here: when an order's item amounts don't add up to
//! what was charged, the difference is spread across the items and each
//! item's original price is kept alongside the trued-up one.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::money::{parse_cents, parse_purchase_date};

// ---------------------------------------------------------------------------
// Raw input records
// ---------------------------------------------------------------------------

/// One charge line of an order (one billing event / shipment).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOrderLine {
    #[serde(alias = "Order ID")]
    pub order_id: String,
    #[serde(alias = "Order Date")]
    pub order_date: String,
    #[serde(alias = "Shipment Date", default)]
    pub shipment_date: String,
    #[serde(alias = "Total Charged")]
    pub total_charged: String,
    #[serde(alias = "Payment Instrument Type", default)]
    pub payment_instrument: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItem {
    #[serde(alias = "Order ID")]
    pub order_id: String,
    #[serde(alias = "Order Date")]
    pub order_date: String,
    #[serde(alias = "Shipment Date", default)]
    pub shipment_date: String,
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(alias = "Category", default)]
    pub category: String,
    #[serde(alias = "Seller", default)]
    pub seller: String,
    #[serde(alias = "Item Total")]
    pub item_total: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRefund {
    #[serde(alias = "Order ID")]
    pub order_id: String,
    #[serde(alias = "Order Date")]
    pub order_date: String,
    #[serde(alias = "Refund Date")]
    pub refund_date: String,
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(alias = "Category", default)]
    pub category: String,
    #[serde(alias = "Seller", default)]
    pub seller: String,
    #[serde(alias = "Refund Amount")]
    pub refund_amount: String,
    #[serde(alias = "Refund Tax Amount", default)]
    pub refund_tax_amount: String,
}

/// A known transaction-to-order mapping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReference {
    #[serde(alias = "Id")]
    pub order_id: String,
    #[serde(alias = "Date")]
    pub posted_date: String,
    #[serde(alias = "Amount")]
    pub amount: String,
}

/// Everything the purchase side of a run provides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseRecords {
    #[serde(default)]
    pub orders: Vec<RawOrderLine>,
    #[serde(default)]
    pub items: Vec<RawItem>,
    #[serde(default)]
    pub refunds: Vec<RawRefund>,
    #[serde(default)]
    pub references: Vec<RawReference>,
}

// ---------------------------------------------------------------------------
// Indexed records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeLine {
    pub amount_cents: i64,
    pub ship_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub order_id: String,
    pub title: String,
    pub seller: String,
    pub category: Option<String>,
    pub order_date: NaiveDate,
    pub ship_date: NaiveDate,
    pub amount_cents: i64,
    /// Price before the order-level discrepancy was spread, if it was.
    pub original_cents: Option<i64>,
}

impl OrderItem {
    pub fn is_adjusted(&self) -> bool {
        self.original_cents.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub items_total_cents: i64,
    pub charged_cents: i64,
    /// charged − items, before spreading.
    pub diff_cents: i64,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub order_date: NaiveDate,
    pub charges: Vec<ChargeLine>,
    pub total_cents: i64,
    pub gift_card: bool,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
}

impl Order {
    /// Date of the last charge line; the whole order is billed by then.
    pub fn last_ship_date(&self) -> NaiveDate {
        self.charges.iter().map(|c| c.ship_date).max().unwrap_or(self.order_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    pub order_id: String,
    pub title: String,
    pub seller: String,
    pub category: Option<String>,
    pub order_date: NaiveDate,
    pub refund_date: NaiveDate,
    /// Principal + tax.
    pub amount_cents: i64,
}

/// Which slice of an order a charge group covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Order,
    Shipment(NaiveDate),
    Item(usize),
}

/// A set of one order's items that could explain a single charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeGroup {
    pub order_id: String,
    pub amount_cents: i64,
    pub date: NaiveDate,
    /// Indices into the order's `items`, ascending.
    pub items: Vec<usize>,
    pub scope: Scope,
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PurchaseIndex {
    orders: Vec<Order>,
    order_pos: HashMap<String, usize>,
    amount_buckets: HashMap<i64, Vec<ChargeGroup>>,
    refunds: Vec<Refund>,
    refunds_by_order: HashMap<String, Vec<usize>>,
    refund_buckets: HashMap<i64, Vec<usize>>,
    references: HashMap<(NaiveDate, i64), Vec<String>>,
}

impl PurchaseIndex {
    /// Build the index. Any unreadable money or date field is fatal.
    ///
    /// `gift_card_marker` is matched against each charge line's payment
    /// instrument to flag gift-card-funded orders.
    pub fn build(records: &PurchaseRecords, gift_card_marker: &str) -> Result<Self, ReconError> {
        let mut index = PurchaseIndex::default();

        for line in &records.orders {
            let amount_cents = cents(&line.total_charged, "order", &line.order_id)?;
            let order_date = date(&line.order_date, "order", &line.order_id)?;
            let ship_date = date_or(&line.shipment_date, order_date, "order", &line.order_id)?;
            let gift_card = !gift_card_marker.is_empty() && line.payment_instrument.contains(gift_card_marker);

            let pos = match index.order_pos.get(&line.order_id).copied() {
                Some(pos) => pos,
                None => {
                    index.orders.push(Order {
                        id: line.order_id.clone(),
                        order_date,
                        charges: Vec::new(),
                        total_cents: 0,
                        gift_card: false,
                        items: Vec::new(),
                        totals: OrderTotals { items_total_cents: 0, charged_cents: 0, diff_cents: 0 },
                    });
                    index.order_pos.insert(line.order_id.clone(), index.orders.len() - 1);
                    index.orders.len() - 1
                }
            };
            let order = &mut index.orders[pos];
            order.charges.push(ChargeLine { amount_cents, ship_date });
            order.total_cents += amount_cents;
            order.gift_card |= gift_card;
        }

        for raw in &records.items {
            let amount_cents = cents(&raw.item_total, "item", &raw.order_id)?;
            let order_date = date(&raw.order_date, "item", &raw.order_id)?;
            let ship_date = date_or(&raw.shipment_date, order_date, "item", &raw.order_id)?;
            let Some(&pos) = index.order_pos.get(&raw.order_id) else {
                log::warn!("item '{}' of order '{}' has no charge lines; skipped", raw.title, raw.order_id);
                continue;
            };
            index.orders[pos].items.push(OrderItem {
                order_id: raw.order_id.clone(),
                title: raw.title.clone(),
                seller: raw.seller.clone(),
                category: non_empty(&raw.category),
                order_date,
                ship_date,
                amount_cents,
                original_cents: None,
            });
        }

        for order in &mut index.orders {
            let items_total_cents: i64 = order.items.iter().map(|i| i.amount_cents).sum();
            order.totals = OrderTotals {
                items_total_cents,
                charged_cents: order.total_cents,
                diff_cents: order.total_cents - items_total_cents,
            };
            if order.totals.diff_cents != 0 && !order.items.is_empty() {
                log::debug!(
                    "order {}: spreading {} cents over {} items",
                    order.id,
                    order.totals.diff_cents,
                    order.items.len()
                );
                spread_diff(&mut order.items, order.totals.diff_cents);
            }
        }

        for pos in 0..index.orders.len() {
            for group in charge_groups(&index.orders[pos]) {
                index.register(group);
            }
        }

        for raw in &records.refunds {
            let principal = cents(&raw.refund_amount, "refund", &raw.order_id)?;
            let tax = if raw.refund_tax_amount.trim().is_empty() {
                0
            } else {
                cents(&raw.refund_tax_amount, "refund", &raw.order_id)?
            };
            let refund = Refund {
                order_id: raw.order_id.clone(),
                title: raw.title.clone(),
                seller: raw.seller.clone(),
                category: non_empty(&raw.category),
                order_date: date(&raw.order_date, "refund", &raw.order_id)?,
                refund_date: date(&raw.refund_date, "refund", &raw.order_id)?,
                amount_cents: principal + tax,
            };
            let id = index.refunds.len();
            index.refund_buckets.entry(refund.amount_cents).or_default().push(id);
            index.refunds_by_order.entry(refund.order_id.clone()).or_default().push(id);
            index.refunds.push(refund);
        }

        for raw in &records.references {
            let amount_cents = cents(&raw.amount, "reference", &raw.order_id)?.abs();
            let posted = date(&raw.posted_date, "reference", &raw.order_id)?;
            if !index.order_pos.contains_key(&raw.order_id) {
                return Err(ReconError::UnknownOrder {
                    reference: format!("{posted} {}", raw.amount.trim()),
                    order_id: raw.order_id.clone(),
                });
            }
            let ids = index.references.entry((posted, amount_cents)).or_default();
            if !ids.contains(&raw.order_id) {
                ids.push(raw.order_id.clone());
            }
        }

        log::debug!(
            "purchase index: {} orders, {} amount buckets, {} refunds",
            index.orders.len(),
            index.amount_buckets.len(),
            index.refunds.len()
        );
        Ok(index)
    }

    /// Add a group to its amount bucket unless the same items of the same
    /// order are already there.
    fn register(&mut self, group: ChargeGroup) {
        let bucket = self.amount_buckets.entry(group.amount_cents).or_default();
        if bucket.iter().any(|g| g.order_id == group.order_id && g.items == group.items) {
            return;
        }
        bucket.push(group);
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn order(&self, id: &str) -> Option<&Order> {
        self.order_pos.get(id).map(|&pos| &self.orders[pos])
    }

    pub fn order_totals(&self, id: &str) -> Option<OrderTotals> {
        self.order(id).map(|o| o.totals)
    }

    /// All charge groups whose amount is exactly `amount_cents`.
    pub fn candidates(&self, amount_cents: i64) -> &[ChargeGroup] {
        self.amount_buckets.get(&amount_cents).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The whole-order group, if the order has items.
    pub fn whole_order(&self, id: &str) -> Option<ChargeGroup> {
        let order = self.order(id)?;
        if order.items.is_empty() {
            return None;
        }
        Some(ChargeGroup {
            order_id: order.id.clone(),
            amount_cents: order.total_cents,
            date: order.last_ship_date(),
            items: (0..order.items.len()).collect(),
            scope: Scope::Order,
        })
    }

    pub fn refund(&self, id: usize) -> Option<&Refund> {
        self.refunds.get(id)
    }

    /// Refund ids whose principal + tax equals `amount_cents`.
    pub fn refund_candidates(&self, amount_cents: i64) -> &[usize] {
        self.refund_buckets.get(&amount_cents).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn refunds_for_order(&self, order_id: &str) -> impl Iterator<Item = &Refund> {
        self.refunds_by_order
            .get(order_id)
            .into_iter()
            .flatten()
            .map(|&id| &self.refunds[id])
    }

    /// Order ids a direct reference maps `(posted date, |amount|)` to.
    pub fn referenced_orders(&self, posted: NaiveDate, amount_cents: i64) -> &[String] {
        self.references
            .get(&(posted, amount_cents.abs()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn gift_card_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| o.gift_card)
    }
}

/// Spread an order-level discrepancy across its items.
///
/// Every item receives `diff / n` cents (truncating); the remainder goes to
/// the first item. Original prices are kept in `original_cents`.
pub fn spread_diff(items: &mut [OrderItem], diff_cents: i64) {
    if items.is_empty() || diff_cents == 0 {
        return;
    }
    let n = items.len() as i64;
    let remainder = diff_cents % n;
    let each = (diff_cents - remainder) / n;

    for (i, item) in items.iter_mut().enumerate() {
        let delta = if i == 0 { each + remainder } else { each };
        item.original_cents = Some(item.original_cents.unwrap_or(item.amount_cents));
        item.amount_cents += delta;
    }
}

/// Every granularity at which one charge could cover part of the order.
fn charge_groups(order: &Order) -> Vec<ChargeGroup> {
    let mut groups = Vec::new();
    if order.items.is_empty() {
        return groups;
    }

    groups.push(ChargeGroup {
        order_id: order.id.clone(),
        amount_cents: order.total_cents,
        date: order.last_ship_date(),
        items: (0..order.items.len()).collect(),
        scope: Scope::Order,
    });

    if order.charges.len() > 1 && order.totals.diff_cents == 0 {
        let mut by_date: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for charge in &order.charges {
            *by_date.entry(charge.ship_date).or_insert(0) += charge.amount_cents;
        }
        if by_date.len() > 1 {
            for (ship_date, amount_cents) in by_date {
                let items: Vec<usize> = order
                    .items
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| item.ship_date == ship_date)
                    .map(|(i, _)| i)
                    .collect();
                if items.is_empty() {
                    continue;
                }
                groups.push(ChargeGroup {
                    order_id: order.id.clone(),
                    amount_cents,
                    date: ship_date,
                    items,
                    scope: Scope::Shipment(ship_date),
                });
            }
        }
    }

    for (i, item) in order.items.iter().enumerate() {
        groups.push(ChargeGroup {
            order_id: order.id.clone(),
            amount_cents: item.amount_cents,
            date: item.ship_date,
            items: vec![i],
            scope: Scope::Item(i),
        });
    }

    groups
}

fn cents(value: &str, source: &str, record_id: &str) -> Result<i64, ReconError> {
    parse_cents(value).ok_or_else(|| ReconError::AmountParse {
        source: source.into(),
        record_id: record_id.into(),
        value: value.into(),
    })
}

fn date(value: &str, source: &str, record_id: &str) -> Result<NaiveDate, ReconError> {
    parse_purchase_date(value).ok_or_else(|| ReconError::DateParse {
        source: source.into(),
        record_id: record_id.into(),
        value: value.into(),
    })
}

fn date_or(value: &str, fallback: NaiveDate, source: &str, record_id: &str) -> Result<NaiveDate, ReconError> {
    if value.trim().is_empty() {
        Ok(fallback)
    } else {
        date(value, source, record_id)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}
