//! Shared types, error model, and configuration for Leadflow.
//!
//! This crate is the foundation depended on by all other Leadflow crates.
//! It provides:
//! - [`LeadflowError`]: the unified error type
//! - Domain types ([`Lead`], [`LeadActivity`], [`LeadStatus`], [`LeadId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EnrichmentConfig, EnrichmentSourceConfig, MessagingConfig,
    OpenRouterConfig, PipelineConfig, ScoringConfig, SignalsConfig, config_dir, config_file_path,
    endpoint_url, init_config, load_config, load_config_from, resolve_api_key, validate_api_key,
};
pub use error::{LeadflowError, Result};
pub use types::{
    ActivityType, Actor, BusinessProfile, CallOutcome, Channel, EnrichmentFields, Lead,
    LeadActivity, LeadField, LeadId, LeadStatus, NewActivity, OutcomeSentiment, website_domain,
};
