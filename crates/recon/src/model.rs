use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ledger transaction
// ---------------------------------------------------------------------------

/// One ledger entry under classification.
///
/// `splits` holds the split views when a single charge was attributed to
/// several purchased items; each view shares the parent's `id`. A record
/// without a `payee` starts from its `original_payee`, as [`Transaction::new`]
/// does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TransactionRecord")]
pub struct Transaction {
    pub id: String,
    pub date: NaiveDate,
    /// Signed amount in cents. Credits are positive, debits negative.
    #[serde(rename = "amount", with = "crate::money::decimal")]
    pub amount_cents: i64,
    pub original_payee: String,
    pub payee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub splits: Vec<Transaction>,
}

/// Ledger record as read, before payee defaulting.
#[derive(Deserialize)]
struct TransactionRecord {
    id: String,
    date: NaiveDate,
    #[serde(rename = "amount", with = "crate::money::decimal")]
    amount_cents: i64,
    original_payee: String,
    #[serde(default)]
    payee: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    splits: Vec<Transaction>,
}

impl From<TransactionRecord> for Transaction {
    fn from(record: TransactionRecord) -> Self {
        Self {
            payee: record.payee.unwrap_or_else(|| record.original_payee.clone()),
            id: record.id,
            date: record.date,
            amount_cents: record.amount_cents,
            original_payee: record.original_payee,
            note: record.note,
            category: record.category,
            tags: record.tags,
            splits: record.splits,
        }
    }
}

impl Transaction {
    pub fn new(id: impl Into<String>, date: NaiveDate, amount_cents: i64, original_payee: impl Into<String>) -> Self {
        let original_payee = original_payee.into();
        Self {
            id: id.into(),
            date,
            amount_cents,
            payee: original_payee.clone(),
            original_payee,
            note: None,
            category: None,
            tags: Vec::new(),
            splits: Vec::new(),
        }
    }

    /// Append a tag unless it is already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// A non-empty note marks the transaction as already resolved.
    pub fn has_note(&self) -> bool {
        self.note.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    pub fn is_split(&self) -> bool {
        !self.splits.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Per-pass scratch state
// ---------------------------------------------------------------------------

/// Scratch state for one transaction's pass through the pipeline.
///
/// Created fresh for every transaction and dropped when its pass ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassContext {
    pub is_split: bool,
    pub vendor_category: Option<String>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub examined: usize,
    pub updated: usize,
    /// No plugin matched.
    pub unmatched: usize,
    /// A plugin matched but no field changed.
    pub matched_unchanged: usize,
    pub plugin_matches: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub vendor: String,
    pub engine_version: String,
    pub run_at: String,
    pub claimed_items: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub meta: RunMeta,
    pub summary: RunSummary,
    pub updates: Vec<Transaction>,
}

impl RunResult {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn() -> Transaction {
        Transaction::new("t1", NaiveDate::from_ymd_opt(2020, 3, 5).unwrap(), -4250, "AMZN Mktp US")
    }

    #[test]
    fn tags_are_an_ordered_set() {
        let mut t = txn();
        t.add_tag("Amazon");
        t.add_tag("Books");
        t.add_tag("Amazon");
        assert_eq!(t.tags, vec!["Amazon", "Books"]);
    }

    #[test]
    fn blank_note_is_not_a_resolution() {
        let mut t = txn();
        assert!(!t.has_note());
        t.note = Some("   ".into());
        assert!(!t.has_note());
        t.note = Some("Kindle".into());
        assert!(t.has_note());
    }

    #[test]
    fn amount_serializes_as_decimal() {
        let json = serde_json::to_value(txn()).unwrap();
        assert_eq!(json["amount"], "-42.50");
        assert_eq!(json["date"], "2020-03-05");
        assert!(json.get("splits").is_none());
    }

    #[test]
    fn deserialized_payee_matches_constructor_default() {
        let json = r#"{"id":"t1","date":"2020-03-05","amount":"-42.50","original_payee":"AMZN Mktp US"}"#;
        let t: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(t, txn());

        let named: Transaction = serde_json::from_str(
            r#"{"id":"t1","date":"2020-03-05","amount":"-42.50","original_payee":"AMZN Mktp US","payee":"Amazon"}"#,
        )
        .unwrap();
        assert_eq!(named.payee, "Amazon");
    }

    #[test]
    fn deserializes_numeric_amount_and_defaults() {
        let t: Transaction = serde_json::from_str(
            r#"{"id":"9","date":"2020-03-05","amount":-42.5,"original_payee":"AMZN"}"#,
        )
        .unwrap();
        assert_eq!(t.amount_cents, -4250);
        assert_eq!(t.payee, "AMZN");
        assert!(t.tags.is_empty());
        assert!(t.note.is_none());
    }
}
