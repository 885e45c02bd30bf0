use crate::claims::Claims;
use crate::matcher::PurchaseMatcher;
use crate::model::{PassContext, Transaction};
use crate::rules::RuleInterpreter;

/// One stage of the classification pipeline.
#[derive(Debug)]
pub enum Plugin {
    /// Vendor purchase matcher.
    Vendor(PurchaseMatcher),
    /// Payee, category, note or label rules.
    Rules(RuleInterpreter),
}

impl Plugin {
    pub fn name(&self) -> &str {
        match self {
            Self::Vendor(m) => m.name(),
            Self::Rules(r) => r.name(),
        }
    }

    /// Run against one transaction (or split view). Returns whether it matched.
    pub fn apply(&self, txn: &mut Transaction, ctx: &mut PassContext, claims: &mut Claims) -> bool {
        match self {
            Self::Vendor(m) => m.apply(txn, ctx, claims),
            Self::Rules(r) => r.evaluate(txn, ctx),
        }
    }
}

impl From<PurchaseMatcher> for Plugin {
    fn from(m: PurchaseMatcher) -> Self {
        Self::Vendor(m)
    }
}

impl From<RuleInterpreter> for Plugin {
    fn from(r: RuleInterpreter) -> Self {
        Self::Rules(r)
    }
}
