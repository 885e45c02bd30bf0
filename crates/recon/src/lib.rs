//! `deltabot-recon`: ledger-to-purchase reconciliation and rule-based
//! transaction classification.
//!
//! Pure engine crate: receives pre-loaded transactions and vendor purchase
//! records, returns the transactions it changed. No CLI or IO dependencies.

pub mod claims;
pub mod combination;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod matcher;
pub mod model;
pub mod money;
pub mod pipeline;
pub mod plugin;
pub mod rules;

pub use claims::Claims;
pub use config::EngineConfig;
pub use engine::{run, run_with_plugins, RunInput};
pub use error::ReconError;
pub use model::{PassContext, RunResult, RunSummary, Transaction};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use plugin::Plugin;
pub use rules::{Rule, RuleEffect, RuleInterpreter};
