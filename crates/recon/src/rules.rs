//! First-match-wins rule interpreter behind the payee, category, note and
//! label plugins.
//!
//! A rule may declare any of `original_payee`, `payee`, `note`, `amount` and
//! a custom predicate. Fields are tried in that order and the first one that
//! matches decides the rule. The first matching rule applies the plugin's
//! effect and stops evaluation.

use std::fmt;

use crate::config::{PluginConfig, PluginKind, RuleConfig, RuleValueConfig};
use crate::model::{PassContext, Transaction};

/// A code-supplied match function.
pub type Predicate = Box<dyn Fn(&Transaction, &PassContext) -> bool + Send + Sync>;

/// What a rule plugin does to a matching transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEffect {
    SetPayee,
    SetCategory,
    SetNote,
    AddTags,
}

impl From<PluginKind> for RuleEffect {
    fn from(kind: PluginKind) -> Self {
        match kind {
            PluginKind::Payee => Self::SetPayee,
            PluginKind::Category => Self::SetCategory,
            PluginKind::Note => Self::SetNote,
            PluginKind::Label => Self::AddTags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleValue {
    One(String),
    Many(Vec<String>),
}

impl From<RuleValueConfig> for RuleValue {
    fn from(value: RuleValueConfig) -> Self {
        match value {
            RuleValueConfig::One(v) => Self::One(v),
            RuleValueConfig::Many(v) => Self::Many(v),
        }
    }
}

impl RuleEffect {
    fn apply(self, txn: &mut Transaction, value: &RuleValue) {
        match (self, value) {
            (Self::AddTags, RuleValue::One(tag)) => txn.add_tag(tag),
            (Self::AddTags, RuleValue::Many(tags)) => tags.iter().for_each(|t| txn.add_tag(t)),
            (Self::SetPayee, RuleValue::One(v)) => txn.payee = v.clone(),
            (Self::SetCategory, RuleValue::One(v)) => txn.category = Some(v.clone()),
            (Self::SetNote, RuleValue::One(v)) => txn.note = Some(v.clone()),
            // Rejected by config validation; code-built rules fall back to the first entry.
            (effect, RuleValue::Many(values)) => {
                if let Some(first) = values.first() {
                    effect.apply(txn, &RuleValue::One(first.clone()));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// Match fields in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    OriginalPayee,
    Payee,
    Note,
    Amount,
    Custom,
}

impl MatchField {
    pub const PRIORITY: [MatchField; 5] = [
        MatchField::OriginalPayee,
        MatchField::Payee,
        MatchField::Note,
        MatchField::Amount,
        MatchField::Custom,
    ];
}

#[derive(Default)]
pub struct Rule {
    original_payee: Vec<String>,
    payee: Vec<String>,
    note: Vec<String>,
    amount_cents: Option<i64>,
    custom: Option<Predicate>,
    value: Option<RuleValue>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("original_payee", &self.original_payee)
            .field("payee", &self.payee)
            .field("note", &self.note)
            .field("amount_cents", &self.amount_cents)
            .field("custom", &self.custom.is_some())
            .field("value", &self.value)
            .finish()
    }
}

fn lowered<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values.into_iter().map(|v| v.as_ref().to_lowercase()).collect()
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn original_payee<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, values: I) -> Self {
        self.original_payee = lowered(values);
        self
    }

    pub fn payee<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, values: I) -> Self {
        self.payee = lowered(values);
        self
    }

    pub fn note<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, values: I) -> Self {
        self.note = lowered(values);
        self
    }

    pub fn amount(mut self, cents: i64) -> Self {
        self.amount_cents = Some(cents);
        self
    }

    pub fn custom<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Transaction, &PassContext) -> bool + Send + Sync + 'static,
    {
        self.custom = Some(Box::new(predicate));
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(RuleValue::One(value.into()));
        self
    }

    pub fn values<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.value = Some(RuleValue::Many(values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn from_config(config: &RuleConfig) -> Self {
        Self {
            original_payee: lowered(&config.original_payee),
            payee: lowered(&config.payee),
            note: lowered(&config.note),
            amount_cents: config.amount,
            custom: None,
            value: config.value.clone().map(RuleValue::from),
        }
    }

    fn declares(&self, field: MatchField) -> bool {
        match field {
            MatchField::OriginalPayee => !self.original_payee.is_empty(),
            MatchField::Payee => !self.payee.is_empty(),
            MatchField::Note => !self.note.is_empty(),
            MatchField::Amount => self.amount_cents.is_some(),
            MatchField::Custom => self.custom.is_some(),
        }
    }

    /// The first declared field that matches, if any.
    pub fn matching_field(&self, txn: &Transaction, ctx: &PassContext) -> Option<MatchField> {
        MatchField::PRIORITY
            .into_iter()
            .filter(|&field| self.declares(field))
            .find(|&field| match field {
                MatchField::OriginalPayee => contains_any(Some(&txn.original_payee), &self.original_payee),
                MatchField::Payee => contains_any(Some(&txn.payee), &self.payee),
                MatchField::Note => contains_any(txn.note.as_ref(), &self.note),
                MatchField::Amount => self.amount_cents == Some(txn.amount_cents),
                MatchField::Custom => self.custom.as_ref().is_some_and(|f| f(txn, ctx)),
            })
    }
}

fn contains_any(field: Option<&String>, options: &[String]) -> bool {
    let Some(value) = field.filter(|v| !v.is_empty()) else {
        return false;
    };
    let value = value.to_lowercase();
    options.iter().any(|o| value.contains(o.as_str()))
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RuleInterpreter {
    name: String,
    effect: RuleEffect,
    rules: Vec<Rule>,
}

impl RuleInterpreter {
    pub fn new(name: impl Into<String>, effect: RuleEffect) -> Self {
        Self {
            name: name.into(),
            effect,
            rules: Vec::new(),
        }
    }

    pub fn from_config(config: &PluginConfig) -> Self {
        let mut interpreter = Self::new(config.display_name(), config.kind.into());
        interpreter.rules = config.rules.iter().map(Rule::from_config).collect();
        interpreter
    }

    /// Append a rule; it is consulted after every existing one.
    pub fn push_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.push_rule(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn effect(&self) -> RuleEffect {
        self.effect
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the first matching rule. Returns whether any rule matched.
    pub fn evaluate(&self, txn: &mut Transaction, ctx: &PassContext) -> bool {
        for (i, rule) in self.rules.iter().enumerate() {
            let Some(field) = rule.matching_field(txn, ctx) else {
                continue;
            };
            log::debug!("{}: rule {} matched {} on {field:?}", self.name, i + 1, txn.id);
            if let Some(value) = &rule.value {
                self.effect.apply(txn, value);
            }
            return true;
        }
        false
    }
}
