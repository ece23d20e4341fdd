//! Signal sources and candidate normalization for lead discovery.
//!
//! A [`SignalSource`] answers "who matches this business profile right now?"
//! with a list of [`Candidate`]s. Discovery turns candidates into leads,
//! using [`dedup_key`] to recognize ones it has already seen.

mod dedup;

use std::time::Duration;

use async_trait::async_trait;
use leadflow_shared::{BusinessProfile, LeadflowError, Result, endpoint_url};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

pub use dedup::{dedup_key, normalize_company, normalize_person};

/// User-Agent string for signal source requests.
const USER_AGENT: &str = concat!("Leadflow/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A prospective lead as reported by a signal source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Candidate {
    pub company_name: String,
    pub contact_name: Option<String>,
    pub contact_title: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub linkedin_url: Option<String>,
    pub location: Option<String>,
    /// Category of the buying signal (hiring, funding, launch, ...).
    pub signal_type: Option<String>,
    pub notes: Option<String>,
}

impl Candidate {
    /// Dedup key for this candidate, if it has enough identity to build one.
    pub fn dedup_key(&self) -> Option<String> {
        dedup_key(
            &self.company_name,
            self.contact_name.as_deref(),
            self.website.as_deref(),
        )
    }

    /// Label used in logs and error messages.
    pub fn label(&self) -> String {
        let company = self.company_name.trim();
        match (company.is_empty(), self.contact_name.as_deref()) {
            (false, Some(contact)) => format!("{company} / {contact}"),
            (false, None) => company.to_string(),
            (true, Some(contact)) => format!("<unnamed company> / {contact}"),
            (true, None) => "<unnamed candidate>".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A provider of candidate leads for a business profile.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Source name, recorded as the `source` of every lead it produces.
    fn name(&self) -> &str;

    /// Return up to `limit` candidates matching `profile`.
    async fn query(&self, profile: &BusinessProfile, limit: usize) -> Result<Vec<Candidate>>;
}

// ---------------------------------------------------------------------------
// HTTP signal source
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SearchRequest<'a> {
    profile: &'a BusinessProfile,
    limit: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// Signal source backed by a JSON search API (`POST {base}/v1/signals/search`).
pub struct HttpSignalSource {
    name: String,
    endpoint: Url,
    api_key: Option<String>,
    client: Client,
}

impl HttpSignalSource {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            endpoint: endpoint_url(base_url, "v1/signals/search")?,
            api_key,
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl SignalSource for HttpSignalSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(source = %self.name, profile = %profile.name, limit = limit))]
    async fn query(&self, profile: &BusinessProfile, limit: usize) -> Result<Vec<Candidate>> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&SearchRequest { profile, limit });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LeadflowError::adapter(&self.name, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadflowError::adapter(
                &self.name,
                format!("HTTP {status} from {}", self.endpoint),
            ));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            LeadflowError::adapter(&self.name, format!("malformed search response: {e}"))
        })?;

        let mut candidates = body.candidates;
        if candidates.len() > limit {
            debug!(returned = candidates.len(), "source over-delivered, truncating");
            candidates.truncate(limit);
        }
        info!(count = candidates.len(), "signal source returned candidates");
        Ok(candidates)
    }
}

/// Build a reqwest client with appropriate settings.
fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| LeadflowError::Network(format!("failed to build HTTP client: {e}")))
}
