//! Enrichment source adapters, the priority registry, and field merging.
//!
//! This crate provides:
//! - [`EnrichmentAdapter`]: one external source of contact/profile fields
//! - [`AdapterRegistry`]: adapters in priority order, queried concurrently
//! - [`merge`]: the pure priority merge of adapter results onto a lead
//! - [`HttpEnrichmentAdapter`]: a JSON lookup API client

mod http;
pub mod merge;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadflow_shared::{EnrichmentFields, Lead, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub use http::HttpEnrichmentAdapter;
pub use merge::{FieldChange, MergePlan, plan_merge};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// What an adapter is asked to look up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupQuery {
    pub company_name: String,
    pub contact_name: Option<String>,
    pub domain: Option<String>,
}

impl From<&Lead> for LookupQuery {
    fn from(lead: &Lead) -> Self {
        Self {
            company_name: lead.company_name.clone(),
            contact_name: lead.contact_name().map(str::to_string),
            domain: lead.domain(),
        }
    }
}

/// A single external source of lead profile fields.
#[async_trait]
pub trait EnrichmentAdapter: Send + Sync {
    /// Source name reported in enrichment results.
    fn name(&self) -> &str;

    /// Look up whatever fields this source knows. An empty result is a
    /// successful lookup that found nothing.
    async fn lookup(&self, query: &LookupQuery) -> Result<EnrichmentFields>;
}

/// Outcome of one adapter lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentResult {
    pub source_name: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "EnrichmentFields::is_empty")]
    pub fields: EnrichmentFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl EnrichmentResult {
    pub fn success(source_name: impl Into<String>, fields: EnrichmentFields) -> Self {
        Self {
            source_name: source_name.into(),
            succeeded: true,
            fields,
            error_message: None,
        }
    }

    pub fn failure(source_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            succeeded: false,
            fields: EnrichmentFields::default(),
            error_message: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds enrichment adapters in priority order (most trusted first).
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn EnrichmentAdapter>>,
}

impl AdapterRegistry {
    pub fn new(adapters: Vec<Arc<dyn EnrichmentAdapter>>) -> Self {
        Self { adapters }
    }

    /// Append an adapter at the lowest priority.
    pub fn push(&mut self, adapter: Arc<dyn EnrichmentAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Query every adapter concurrently, at most `concurrency` at a time, each
    /// bounded by `timeout`. Results come back in registry (priority) order
    /// regardless of completion order; failures never abort the others.
    pub async fn lookup_all(
        &self,
        query: &LookupQuery,
        timeout: Duration,
        concurrency: usize,
    ) -> Vec<EnrichmentResult> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let query = query.clone();
            let sem = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let name = adapter.name().to_string();
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return EnrichmentResult::failure(name, "lookup pool closed"),
                };

                match tokio::time::timeout(timeout, adapter.lookup(&query)).await {
                    Ok(Ok(fields)) => {
                        debug!(source = %name, fields = fields.populated(), "lookup succeeded");
                        EnrichmentResult::success(name, fields)
                    }
                    Ok(Err(e)) => {
                        warn!(source = %name, error = %e, "lookup failed");
                        EnrichmentResult::failure(name, e.to_string())
                    }
                    Err(_) => {
                        warn!(source = %name, timeout_ms = timeout.as_millis() as u64, "lookup timed out");
                        EnrichmentResult::failure(
                            name,
                            format!("timed out after {}ms", timeout.as_millis()),
                        )
                    }
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (handle, adapter) in handles.into_iter().zip(&self.adapters) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => results.push(EnrichmentResult::failure(
                    adapter.name(),
                    format!("lookup task failed: {e}"),
                )),
            }
        }
        results
    }
}
