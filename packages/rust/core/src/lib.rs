//! Core pipeline orchestration and domain logic for Leadflow.
//!
//! This crate ties together discovery, enrichment, drafting and messaging
//! into the pipeline stages exposed on [`Pipeline`]: `find_leads`,
//! `enrich_lead`, `generate_outreach`, `execute_outreach` and
//! `log_call_outcome`, plus manual edits and CSV export.

mod discover;
mod enrich;
pub mod export;
pub mod guard;
mod outcome;
mod outreach;
pub mod pipeline;
pub mod rate_limit;
pub mod scoring;
pub mod status;

#[cfg(test)]
mod testing;

pub use discover::DiscoveryReport;
pub use enrich::{EnrichmentReport, SourceStatus};
pub use export::leads_to_csv;
pub use outcome::OutcomeReport;
pub use outreach::{OutreachReport, idempotency_key};
pub use pipeline::{Pipeline, ProgressReporter, SilentProgress};
pub use scoring::{DefaultScorePolicy, ScoreInput, ScorePolicy};
