use std::path::PathBuf;

use chrono::NaiveDate;

use deltabot_recon::engine::{build_pipeline, run, RunInput};
use deltabot_recon::matcher::{TAG_ADJUSTMENT, TAG_GIFT_CARD, TAG_REFUND, TAG_SPLIT};
use deltabot_recon::{Claims, EngineConfig, RunResult, Transaction};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_config() -> EngineConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join("rules.toml")).unwrap();
    EngineConfig::from_toml(&toml).unwrap()
}

fn load_input() -> RunInput {
    let json = std::fs::read_to_string(fixtures_dir().join("march-2020.json")).unwrap();
    RunInput::from_json(&json).unwrap()
}

fn load_and_run() -> RunResult {
    run(&load_config(), &load_input()).unwrap()
}

fn update<'a>(result: &'a RunResult, id: &str) -> Option<&'a Transaction> {
    result.updates.iter().find(|t| t.id == id)
}

// -------------------------------------------------------------------------
// Vendor matching
// -------------------------------------------------------------------------

#[test]
fn single_item_order_resolves() {
    let result = load_and_run();
    let t1 = update(&result, "t1").unwrap();

    assert_eq!(t1.payee, "Acme Books");
    assert_eq!(t1.amount_cents, -4250);
    assert_eq!(t1.date, NaiveDate::from_ymd_opt(2020, 3, 1).unwrap());
    assert!(t1.has_tag("Amazon"));
    assert!(t1.has_tag("Books"));
    assert!(t1.has_tag("ΔBot"));
    assert!(!t1.has_tag(TAG_SPLIT));
    assert!(!t1.has_tag(TAG_ADJUSTMENT));
    assert!(t1.note.as_deref().unwrap().ends_with("orderID=111-0000001"));
}

#[test]
fn two_item_charge_becomes_split() {
    let result = load_and_run();
    let t2 = update(&result, "t2").unwrap();

    assert_eq!(t2.splits.len(), 2);
    assert!(t2.has_tag(TAG_SPLIT));
    let payees: Vec<&str> = t2.splits.iter().map(|s| s.payee.as_str()).collect();
    assert_eq!(payees, vec!["CableCo", "CaseWorks"]);
    let total: i64 = t2.splits.iter().map(|s| s.amount_cents).sum();
    assert_eq!(total, -3000);
    assert!(t2.splits.iter().all(|s| s.id == "t2" && s.has_tag(TAG_SPLIT)));
}

#[test]
fn nearest_refund_wins() {
    let result = load_and_run();
    let t3 = update(&result, "t3").unwrap();

    assert!(t3.has_tag(TAG_REFUND));
    assert_eq!(t3.payee, "SoundCo");
    assert!(t3.note.as_deref().unwrap().starts_with("Headphones\n\n"));
    assert_eq!(t3.amount_cents, 1500);
}

#[test]
fn identical_charges_claim_distinct_items() {
    let result = load_and_run();
    let t4 = update(&result, "t4").unwrap();
    let t5 = update(&result, "t5").unwrap();

    assert!(t4.note.as_deref().unwrap().starts_with("Hand Soap (left)"));
    assert!(t5.note.as_deref().unwrap().starts_with("Hand Soap (right)"));
    // Both items of the order are taken; the third charge finds nothing.
    assert!(update(&result, "t6").is_none());
}

#[test]
fn excluded_payee_left_alone() {
    let result = load_and_run();
    assert!(update(&result, "t7").is_none());
}

#[test]
fn gift_card_authorization_lists_candidates() {
    let result = load_and_run();
    let t8 = update(&result, "t8").unwrap();

    assert!(t8.has_tag(TAG_GIFT_CARD));
    let note = t8.note.as_deref().unwrap();
    assert!(note.starts_with("This purchase may involve an Amazon gift card."));
    assert!(note.contains("• https://www.amazon.com/gp/your-account/order-details?ie=UTF8&orderID=111-0000006"));
}

#[test]
fn trued_up_item_keeps_original_price() {
    let result = load_and_run();
    let t11 = update(&result, "t11").unwrap();

    assert!(t11.has_tag(TAG_ADJUSTMENT));
    assert_eq!(t11.amount_cents, -4590);
    assert_eq!(
        t11.note.as_deref().unwrap(),
        "Desk Lamp\n\nOriginal price: $42.50\n\nhttps://www.amazon.com/gp/your-account/order-details?ie=UTF8&orderID=111-0000007"
    );
}

// -------------------------------------------------------------------------
// Rule plugins
// -------------------------------------------------------------------------

#[test]
fn rule_plugins_classify_after_vendor() {
    let result = load_and_run();
    let t9 = update(&result, "t9").unwrap();

    assert_eq!(t9.payee, "Apple");
    assert_eq!(t9.category.as_deref(), Some("Entertainment"));
    assert_eq!(t9.tags, vec!["Subscriptions", "ΔBot"]);
}

#[test]
fn matched_without_change_not_updated() {
    let result = load_and_run();
    assert!(update(&result, "t10").is_none());
    assert_eq!(result.summary.matched_unchanged, 1);
}

// -------------------------------------------------------------------------
// Summary + re-runs
// -------------------------------------------------------------------------

#[test]
fn summary_counts() {
    let result = load_and_run();
    let s = &result.summary;

    assert_eq!(s.examined, 11);
    assert_eq!(s.updated, 8);
    assert_eq!(s.unmatched, 2);
    assert_eq!(s.matched_unchanged, 1);
    assert_eq!(s.plugin_matches.get("Amazon"), Some(&7));
    assert_eq!(s.plugin_matches.get("Name"), Some(&2));
    assert_eq!(s.plugin_matches.get("Category"), Some(&2));
    assert_eq!(s.plugin_matches.get("Label"), Some(&1));
    // t1 (1), t2 (2), t4 (1), t5 (1), t11 (1).
    assert_eq!(result.meta.claimed_items, 6);
    assert_eq!(result.meta.vendor, "Amazon");
}

#[test]
fn rerun_over_updates_changes_nothing() {
    let config = load_config();
    let first = load_and_run();
    let mut input = load_input();
    input.transactions = first.updates.clone();

    let second = run(&config, &input).unwrap();
    assert!(second.updates.is_empty());
    assert_eq!(second.summary.examined, first.updates.len());
}

#[test]
fn claims_carry_into_a_follow_up_run() {
    let config = load_config();
    let input = load_input();

    let pipeline = build_pipeline(&config, &input.purchases, Vec::new()).unwrap();
    let first = pipeline.run(input.transactions.clone(), Claims::new());
    assert!(first.claims.is_claimed("111-0000001", 0));

    // A late duplicate of t1 finds its order already claimed.
    let late = Transaction::new(
        "t1-dup",
        NaiveDate::from_ymd_opt(2020, 3, 6).unwrap(),
        -4250,
        "AMZN Mktp US*2K4AB1",
    );
    let second = pipeline.run(vec![late.clone()], first.claims);
    assert!(second.updates.is_empty());

    let fresh = pipeline.run(vec![late], Claims::new());
    assert_eq!(fresh.updates.len(), 1);
}

#[test]
fn result_serializes_to_json() {
    let result = load_and_run();
    let json: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();

    assert_eq!(json["summary"]["examined"], 11);
    let updates = json["updates"].as_array().unwrap();
    assert_eq!(updates[0]["id"], "t1");
    assert_eq!(updates[0]["amount"], "-42.50");
    assert_eq!(updates[1]["splits"].as_array().unwrap().len(), 2);
}
