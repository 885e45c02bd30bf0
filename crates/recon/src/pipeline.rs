use crate::claims::Claims;
use crate::model::{PassContext, RunSummary, Transaction};
use crate::plugin::Plugin;

#[derive(Debug)]
pub struct PipelineOutcome {
    /// Changed transactions, in input order.
    pub updates: Vec<Transaction>,
    pub claims: Claims,
    pub summary: RunSummary,
}

#[derive(Debug)]
pub struct Pipeline {
    plugins: Vec<Plugin>,
    audit_tag: String,
}

impl Pipeline {
    pub fn new(plugins: Vec<Plugin>, audit_tag: impl Into<String>) -> Self {
        Self {
            plugins,
            audit_tag: audit_tag.into(),
        }
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Run every plugin over every transaction in order.
    ///
    /// Each plugin sees every split view of a transaction. A transaction is
    /// collected only if some plugin matched and it differs from its input
    /// state; collected transactions carry the audit tag.
    pub fn run(&self, transactions: Vec<Transaction>, mut claims: Claims) -> PipelineOutcome {
        let mut summary = RunSummary::default();
        let mut updates = Vec::new();

        for mut txn in transactions {
            summary.examined += 1;
            let snapshot = txn.clone();
            let mut ctx = PassContext {
                is_split: txn.is_split(),
                vendor_category: None,
            };
            let mut matched = false;

            for plugin in &self.plugins {
                let mut plugin_matched = false;
                if txn.is_split() {
                    for view in txn.splits.iter_mut() {
                        plugin_matched |= plugin.apply(view, &mut ctx, &mut claims);
                    }
                } else {
                    plugin_matched = plugin.apply(&mut txn, &mut ctx, &mut claims);
                }
                if plugin_matched {
                    *summary.plugin_matches.entry(plugin.name().to_string()).or_insert(0) += 1;
                    matched = true;
                }
            }

            if !matched {
                summary.unmatched += 1;
            } else if txn == snapshot {
                summary.matched_unchanged += 1;
            } else {
                txn.add_tag(&self.audit_tag);
                summary.updated += 1;
                updates.push(txn);
            }
        }

        log::debug!(
            "pipeline: {} examined, {} updated, {} unmatched, {} unchanged",
            summary.examined,
            summary.updated,
            summary.unmatched,
            summary.matched_unchanged
        );

        PipelineOutcome {
            updates,
            claims,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Rule, RuleEffect, RuleInterpreter};
    use chrono::NaiveDate;

    fn txn(id: &str, payee: &str, amount_cents: i64) -> Transaction {
        Transaction::new(id, NaiveDate::from_ymd_opt(2020, 3, 5).unwrap(), amount_cents, payee)
    }

    fn pipeline(plugins: Vec<RuleInterpreter>) -> Pipeline {
        Pipeline::new(plugins.into_iter().map(Plugin::from).collect(), "ΔBot")
    }

    #[test]
    fn changed_transactions_collected_with_audit_tag() {
        let p = pipeline(vec![RuleInterpreter::new("Name", RuleEffect::SetPayee)
            .with_rule(Rule::new().original_payee(["itunes"]).value("Apple"))]);
        let out = p.run(vec![txn("1", "ITUNES.COM", -999), txn("2", "SHELL OIL", -4000)], Claims::new());

        assert_eq!(out.updates.len(), 1);
        assert_eq!(out.updates[0].payee, "Apple");
        assert!(out.updates[0].has_tag("ΔBot"));
        assert_eq!(out.summary.examined, 2);
        assert_eq!(out.summary.updated, 1);
        assert_eq!(out.summary.unmatched, 1);
        assert_eq!(out.summary.plugin_matches.get("Name"), Some(&1));
    }

    #[test]
    fn matched_but_unchanged_is_dropped() {
        // Payee already "Apple"; the rule matches but writes the same value.
        let p = pipeline(vec![RuleInterpreter::new("Name", RuleEffect::SetPayee)
            .with_rule(Rule::new().original_payee(["itunes"]).value("Apple"))]);
        let mut t = txn("1", "ITUNES.COM", -999);
        t.payee = "Apple".into();
        let out = p.run(vec![t], Claims::new());

        assert!(out.updates.is_empty());
        assert_eq!(out.summary.matched_unchanged, 1);
        assert_eq!(out.summary.plugin_matches.get("Name"), Some(&1));
    }

    #[test]
    fn plugins_run_in_order_over_split_views() {
        let p = pipeline(vec![
            RuleInterpreter::new("Category", RuleEffect::SetCategory)
                .with_rule(Rule::new().payee(["grocer"]).value("Groceries")),
            RuleInterpreter::new("Label", RuleEffect::AddTags)
                .with_rule(Rule::new().original_payee(["costco"]).value("Bulk")),
        ]);
        let mut parent = txn("1", "COSTCO WHSE", -9000);
        let mut food = parent.clone();
        food.payee = "Grocer".into();
        let mut tires = parent.clone();
        tires.payee = "Tires".into();
        parent.splits = vec![food, tires];

        let out = p.run(vec![parent], Claims::new());
        let updated = &out.updates[0];
        assert_eq!(updated.splits[0].category.as_deref(), Some("Groceries"));
        assert!(updated.splits[1].category.is_none());
        assert!(updated.splits.iter().all(|s| s.has_tag("Bulk")));
        assert!(updated.has_tag("ΔBot"));
        assert_eq!(out.summary.plugin_matches.get("Category"), Some(&1));
        assert_eq!(out.summary.plugin_matches.get("Label"), Some(&1));
    }
}
