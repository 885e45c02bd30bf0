use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Tag added to every transaction the pipeline changes.
    #[serde(default = "default_audit_tag")]
    pub audit_tag: String,
    #[serde(default)]
    pub vendor: VendorConfig,
    /// Rule plugins, run after the vendor matcher in declared order.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audit_tag: default_audit_tag(),
            vendor: VendorConfig::default(),
            plugins: Vec::new(),
        }
    }
}

fn default_audit_tag() -> String {
    "ΔBot".into()
}

// ---------------------------------------------------------------------------
// Vendor matcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    /// Vendor tag and plugin name.
    #[serde(default = "default_vendor_name")]
    pub name: String,
    /// Case-insensitive regex the raw payee must match.
    #[serde(default = "default_payee_pattern")]
    pub payee_pattern: String,
    /// Raw payees containing any of these (case-insensitive) are not purchases.
    #[serde(default = "default_excluded_payees")]
    pub excluded_payees: Vec<String>,
    /// Raw payee marker for card-present authorizations.
    #[serde(default = "default_card_authorization")]
    pub card_authorization: String,
    /// Payment-instrument marker for gift-card-funded orders.
    #[serde(default = "default_gift_card_instrument")]
    pub gift_card_instrument: String,
    #[serde(default = "default_order_link_base")]
    pub order_link_base: String,
    /// Max days a transaction may post after the matched shipment.
    #[serde(default = "default_proximity_days")]
    pub proximity_days: u32,
    /// Node cap for one combination search.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            name: default_vendor_name(),
            payee_pattern: default_payee_pattern(),
            excluded_payees: default_excluded_payees(),
            card_authorization: default_card_authorization(),
            gift_card_instrument: default_gift_card_instrument(),
            order_link_base: default_order_link_base(),
            proximity_days: default_proximity_days(),
            max_nodes: default_max_nodes(),
        }
    }
}

fn default_vendor_name() -> String {
    "Amazon".into()
}

fn default_payee_pattern() -> String {
    "amazon|amzn".into()
}

fn default_excluded_payees() -> Vec<String> {
    ["Amazon Prime", "AMZN Digital", "Kindle Unltd", "Audible"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_card_authorization() -> String {
    "PURCHASE AUTHORIZED".into()
}

fn default_gift_card_instrument() -> String {
    "Gift Certificate/Card".into()
}

fn default_order_link_base() -> String {
    "https://www.amazon.com/gp/your-account/order-details?ie=UTF8&orderID=".into()
}

fn default_proximity_days() -> u32 {
    9
}

fn default_max_nodes() -> usize {
    100_000
}

impl VendorConfig {
    pub fn payee_regex(&self) -> Result<Regex, ReconError> {
        RegexBuilder::new(&self.payee_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ReconError::ConfigValidation(format!("vendor.payee_pattern: {e}")))
    }

    pub fn order_link(&self, order_id: &str) -> String {
        format!("{}{order_id}", self.order_link_base)
    }
}

// ---------------------------------------------------------------------------
// Rule plugins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Payee,
    Category,
    Note,
    Label,
}

impl PluginKind {
    fn default_name(self) -> &'static str {
        match self {
            Self::Payee => "Name",
            Self::Category => "Category",
            Self::Note => "Note",
            Self::Label => "Label",
        }
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Payee => write!(f, "payee"),
            Self::Category => write!(f, "category"),
            Self::Note => write!(f, "note"),
            Self::Label => write!(f, "label"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    pub kind: PluginKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl PluginConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.default_name())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub original_payee: Vec<String>,
    #[serde(default)]
    pub payee: Vec<String>,
    #[serde(default)]
    pub note: Vec<String>,
    #[serde(default, deserialize_with = "crate::money::decimal::deserialize_option")]
    pub amount: Option<i64>,
    #[serde(default)]
    pub value: Option<RuleValueConfig>,
}

impl RuleConfig {
    fn has_match_field(&self) -> bool {
        !self.original_payee.is_empty() || !self.payee.is_empty() || !self.note.is_empty() || self.amount.is_some()
    }
}

/// A rule's value: a single string, or a list (label plugins only).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RuleValueConfig {
    One(String),
    Many(Vec<String>),
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: EngineConfig = toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let vendor = &self.vendor;
        if vendor.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("vendor.name must not be empty".into()));
        }
        vendor.payee_regex()?;
        if vendor.proximity_days > 365 {
            return Err(ReconError::ConfigValidation(format!(
                "vendor.proximity_days must be at most 365, got {}",
                vendor.proximity_days
            )));
        }
        if vendor.max_nodes == 0 {
            return Err(ReconError::ConfigValidation("vendor.max_nodes must be positive".into()));
        }

        // Plugin names key the run summary.
        let mut names: HashSet<&str> = HashSet::new();
        names.insert(&vendor.name);
        for plugin in &self.plugins {
            let name = plugin.display_name();
            if !names.insert(name) {
                return Err(ReconError::ConfigValidation(format!("duplicate plugin name '{name}'")));
            }
            for (i, rule) in plugin.rules.iter().enumerate() {
                if !rule.has_match_field() {
                    return Err(ReconError::ConfigValidation(format!(
                        "plugin '{name}' rule {}: no match field",
                        i + 1
                    )));
                }
                if plugin.kind != PluginKind::Label && matches!(rule.value, Some(RuleValueConfig::Many(_))) {
                    return Err(ReconError::ConfigValidation(format!(
                        "plugin '{name}' rule {}: list value only allowed for {} plugins",
                        i + 1,
                        PluginKind::Label
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
audit_tag = "ΔBot"

[vendor]
name = "Amazon"
payee_pattern = "amazon|amzn"
excluded_payees = ["Amazon Prime", "Audible"]
proximity_days = 7
max_nodes = 5000

[[plugins]]
kind = "payee"

[[plugins.rules]]
original_payee = ["ITUNES"]
value = "Apple"

[[plugins]]
kind = "category"

[[plugins.rules]]
original_payee = ["ITUNES"]
amount = -3.18
value = "Online Services"

[[plugins]]
kind = "label"
name = "Tags"

[[plugins.rules]]
payee = ["whole foods"]
value = ["Groceries", "Food"]
"#;

    #[test]
    fn parse_full() {
        let config = EngineConfig::from_toml(FULL).unwrap();
        assert_eq!(config.audit_tag, "ΔBot");
        assert_eq!(config.vendor.proximity_days, 7);
        assert_eq!(config.vendor.max_nodes, 5000);
        assert_eq!(config.vendor.excluded_payees.len(), 2);
        assert_eq!(config.vendor.card_authorization, "PURCHASE AUTHORIZED");
        assert_eq!(config.plugins.len(), 3);
        assert_eq!(config.plugins[0].display_name(), "Name");
        assert_eq!(config.plugins[1].rules[0].amount, Some(-318));
        assert_eq!(config.plugins[2].display_name(), "Tags");
        assert_eq!(
            config.plugins[2].rules[0].value,
            Some(RuleValueConfig::Many(vec!["Groceries".into(), "Food".into()]))
        );
    }

    #[test]
    fn empty_input_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config.audit_tag, "ΔBot");
        assert_eq!(config.vendor.name, "Amazon");
        assert_eq!(config.vendor.proximity_days, 9);
        assert_eq!(config.vendor.max_nodes, 100_000);
        assert_eq!(config.vendor.excluded_payees.len(), 4);
        assert!(config.plugins.is_empty());
        assert_eq!(
            config.vendor.order_link("111-1"),
            "https://www.amazon.com/gp/your-account/order-details?ie=UTF8&orderID=111-1"
        );
    }

    #[test]
    fn payee_regex_is_case_insensitive() {
        let re = VendorConfig::default().payee_regex().unwrap();
        assert!(re.is_match("AMZN Mktp US*2K4"));
        assert!(re.is_match("Amazon.com"));
        assert!(!re.is_match("Target"));
    }

    #[test]
    fn reject_invalid_regex() {
        let err = EngineConfig::from_toml("[vendor]\npayee_pattern = \"amzn(\"\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(_)));
    }

    #[test]
    fn reject_zero_max_nodes() {
        let err = EngineConfig::from_toml("[vendor]\nmax_nodes = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_nodes"));
    }

    #[test]
    fn reject_large_proximity() {
        assert!(EngineConfig::from_toml("[vendor]\nproximity_days = 400\n").is_err());
    }

    #[test]
    fn reject_empty_vendor_name() {
        assert!(EngineConfig::from_toml("[vendor]\nname = \" \"\n").is_err());
    }

    #[test]
    fn reject_rule_without_match_field() {
        let input = r#"
[[plugins]]
kind = "note"

[[plugins.rules]]
value = "orphan"
"#;
        let err = EngineConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("no match field"));
    }

    #[test]
    fn reject_list_value_on_payee_plugin() {
        let input = r#"
[[plugins]]
kind = "payee"

[[plugins.rules]]
payee = ["x"]
value = ["a", "b"]
"#;
        assert!(matches!(
            EngineConfig::from_toml(input).unwrap_err(),
            ReconError::ConfigValidation(_)
        ));
    }

    #[test]
    fn reject_duplicate_plugin_names() {
        let input = r#"
[[plugins]]
kind = "note"

[[plugins]]
kind = "note"
"#;
        assert!(EngineConfig::from_toml(input).unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn reject_unknown_kind() {
        let err = EngineConfig::from_toml("[[plugins]]\nkind = \"webhook\"\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }
}
