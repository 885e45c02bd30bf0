use serde::Deserialize;

use crate::claims::Claims;
use crate::config::EngineConfig;
use crate::error::ReconError;
use crate::index::{PurchaseIndex, PurchaseRecords};
use crate::matcher::PurchaseMatcher;
use crate::model::{RunMeta, RunResult, Transaction};
use crate::pipeline::Pipeline;
use crate::plugin::Plugin;
use crate::rules::RuleInterpreter;

/// Everything one run consumes: the ledger slice and the vendor's records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunInput {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(flatten)]
    pub purchases: PurchaseRecords,
}

impl RunInput {
    pub fn from_json(input: &str) -> Result<Self, ReconError> {
        serde_json::from_str(input).map_err(|e| ReconError::InputParse(e.to_string()))
    }
}

/// Run the vendor matcher and the configured rule plugins over the input.
pub fn run(config: &EngineConfig, input: &RunInput) -> Result<RunResult, ReconError> {
    run_with_plugins(config, input, Vec::new())
}

/// Like [`run`], with code-defined rule plugins appended after the
/// configured ones.
pub fn run_with_plugins(
    config: &EngineConfig,
    input: &RunInput,
    extra: Vec<RuleInterpreter>,
) -> Result<RunResult, ReconError> {
    let pipeline = build_pipeline(config, &input.purchases, extra)?;
    let outcome = pipeline.run(input.transactions.clone(), Claims::new());

    Ok(RunResult {
        meta: RunMeta {
            vendor: config.vendor.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            claimed_items: outcome.claims.len(),
        },
        summary: outcome.summary,
        updates: outcome.updates,
    })
}

/// Build the index and compose the plugins: vendor matcher first, then the
/// configured rule plugins in declared order, then `extra`.
pub fn build_pipeline(
    config: &EngineConfig,
    purchases: &PurchaseRecords,
    extra: Vec<RuleInterpreter>,
) -> Result<Pipeline, ReconError> {
    config.validate()?;

    let index = PurchaseIndex::build(purchases, &config.vendor.gift_card_instrument)?;
    let matcher = PurchaseMatcher::new(index, config.vendor.clone())?;

    let mut plugins: Vec<Plugin> = Vec::with_capacity(1 + config.plugins.len() + extra.len());
    plugins.push(Plugin::from(matcher));
    plugins.extend(config.plugins.iter().map(|p| Plugin::from(RuleInterpreter::from_config(p))));
    plugins.extend(extra.into_iter().map(Plugin::from));

    log::debug!(
        "pipeline: {}",
        plugins.iter().map(Plugin::name).collect::<Vec<_>>().join(" -> ")
    );
    Ok(Pipeline::new(plugins, config.audit_tag.clone()))
}
