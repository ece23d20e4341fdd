//! The [`Pipeline`] handle shared by every stage.
//!
//! It bundles storage, the external capabilities, the per-lead guard, the
//! send rate limiter and the score policy. Cloning is cheap (everything is
//! behind `Arc`), which lets batch stages hand a copy to each worker task.

use std::sync::Arc;

use chrono::Utc;
use leadflow_discovery::SignalSource;
use leadflow_enrichment::AdapterRegistry;
use leadflow_outreach::{DraftingCapability, MessagingChannel};
use leadflow_shared::{Lead, LeadId, PipelineConfig, Result};
use leadflow_storage::Storage;

use crate::guard::{LeadGuard, LeadPermit};
use crate::rate_limit::SendRateLimiter;
use crate::scoring::{DefaultScorePolicy, OutcomeEvent, ScorePolicy, outcome_history, rescore};

/// Progress callback for long-running, multi-lead stages.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each lead in a batch finishes.
    fn lead_done(&self, label: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn lead_done(&self, _label: &str, _current: usize, _total: usize) {}
}

#[derive(Clone)]
pub struct Pipeline {
    pub(crate) storage: Arc<Storage>,
    pub(crate) signals: Arc<dyn SignalSource>,
    pub(crate) adapters: AdapterRegistry,
    pub(crate) drafting: Arc<dyn DraftingCapability>,
    pub(crate) messaging: Arc<dyn MessagingChannel>,
    pub(crate) guard: LeadGuard,
    pub(crate) limiter: Arc<SendRateLimiter>,
    pub(crate) scoring: Arc<dyn ScorePolicy>,
    pub(crate) config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        storage: Arc<Storage>,
        signals: Arc<dyn SignalSource>,
        adapters: AdapterRegistry,
        drafting: Arc<dyn DraftingCapability>,
        messaging: Arc<dyn MessagingChannel>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            storage,
            signals,
            adapters,
            drafting,
            messaging,
            guard: LeadGuard::new(),
            limiter: Arc::new(SendRateLimiter::per_hour(config.max_sends_per_hour)),
            scoring: Arc::new(DefaultScorePolicy::default()),
            config,
        }
    }

    /// Replace the default score policy.
    pub fn with_score_policy(mut self, policy: Arc<dyn ScorePolicy>) -> Self {
        self.scoring = policy;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Take the per-lead guard and load the current lead.
    pub(crate) async fn lock_lead(&self, id: &LeadId) -> Result<(LeadPermit, Lead)> {
        let permit = self.guard.try_acquire(id)?;
        let lead = self.storage.require_lead(id).await?;
        Ok((permit, lead))
    }

    /// Recompute score and hot marker from the stored outcome history plus
    /// any `pending` outcomes not yet committed.
    pub(crate) async fn rescore(&self, lead: &mut Lead, pending: &[OutcomeEvent]) -> Result<()> {
        let mut outcomes = outcome_history(&self.storage.list_activities(&lead.id).await?);
        outcomes.extend_from_slice(pending);
        rescore(
            lead,
            &outcomes,
            self.scoring.as_ref(),
            self.config.hot_threshold,
            Utc::now(),
        );
        Ok(())
    }
}
