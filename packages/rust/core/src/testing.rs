//! In-memory capabilities and fixtures for engine tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use leadflow_discovery::{Candidate, SignalSource};
use leadflow_enrichment::{AdapterRegistry, EnrichmentAdapter, LookupQuery};
use leadflow_outreach::{
    DraftingCapability, LeadProfile, MessagingChannel, OutboundMessage, OutreachDraft, SendReceipt,
};
use leadflow_shared::{
    ActivityType, Actor, BusinessProfile, Channel, EnrichmentFields, Lead, LeadStatus,
    LeadflowError, NewActivity, PipelineConfig, Result,
};
use leadflow_storage::Storage;
use uuid::Uuid;

use crate::Pipeline;

// ---------------------------------------------------------------------------
// Signal sources
// ---------------------------------------------------------------------------

/// Serves a fixed candidate list, truncated to the requested limit.
pub(crate) struct StaticSignals {
    pub candidates: Vec<Candidate>,
    pub fail: bool,
}

impl StaticSignals {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }
}

#[async_trait]
impl SignalSource for StaticSignals {
    fn name(&self) -> &str {
        "static-signals"
    }

    async fn query(&self, _profile: &BusinessProfile, limit: usize) -> Result<Vec<Candidate>> {
        if self.fail {
            return Err(LeadflowError::adapter("static-signals", "HTTP 503"));
        }
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

pub(crate) fn candidate(company: &str, contact: &str) -> Candidate {
    Candidate {
        company_name: company.into(),
        contact_name: Some(contact.into()),
        signal_type: Some("hiring".into()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Enrichment adapters
// ---------------------------------------------------------------------------

pub(crate) struct FixedAdapter {
    pub name: &'static str,
    pub fields: EnrichmentFields,
    pub calls: AtomicUsize,
}

impl FixedAdapter {
    pub fn new(name: &'static str, fields: EnrichmentFields) -> Self {
        Self {
            name,
            fields,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EnrichmentAdapter for FixedAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn lookup(&self, _query: &LookupQuery) -> Result<EnrichmentFields> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.fields.clone())
    }
}

pub(crate) struct FailingAdapter(pub &'static str);

#[async_trait]
impl EnrichmentAdapter for FailingAdapter {
    fn name(&self) -> &str {
        self.0
    }

    async fn lookup(&self, _query: &LookupQuery) -> Result<EnrichmentFields> {
        Err(LeadflowError::adapter(self.0, "HTTP 500"))
    }
}

/// Never answers within any test timeout.
pub(crate) struct HangingAdapter(pub &'static str);

#[async_trait]
impl EnrichmentAdapter for HangingAdapter {
    fn name(&self) -> &str {
        self.0
    }

    async fn lookup(&self, _query: &LookupQuery) -> Result<EnrichmentFields> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(EnrichmentFields::default())
    }
}

pub(crate) fn contact_fields() -> EnrichmentFields {
    EnrichmentFields {
        email: Some("jane@acme.io".into()),
        linkedin_url: Some("https://linkedin.com/in/janedoe".into()),
        contact_title: Some("CTO".into()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Drafting
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct CannedDrafter {
    pub fail: AtomicBool,
    pub generate_calls: AtomicUsize,
}

#[async_trait]
impl DraftingCapability for CannedDrafter {
    async fn generate(
        &self,
        profile: &LeadProfile,
        _research: Option<&str>,
        channels: &[Channel],
    ) -> Result<Vec<OutreachDraft>> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LeadflowError::GenerationFailed("model unavailable".into()));
        }
        let first = profile.first_name().unwrap_or("there");
        let mut drafts = Vec::new();
        for channel in channels {
            drafts.push(OutreachDraft {
                channel: *channel,
                subject: "Quick question".into(),
                body: "Hello, would love to connect.".into(),
                generated_at: Utc::now(),
            });
            drafts.push(OutreachDraft {
                channel: *channel,
                subject: format!("{first}, quick question"),
                body: format!("Hi {first}, saw {} is hiring. Open to a chat?", profile.company_name),
                generated_at: Utc::now(),
            });
        }
        Ok(drafts)
    }

    async fn research(&self, profile: &LeadProfile) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LeadflowError::GenerationFailed("model unavailable".into()));
        }
        Ok(format!("{} is growing its engineering team.", profile.company_name))
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

pub(crate) struct CountingSender {
    pub channel: Channel,
    pub delay: Duration,
    pub fail: AtomicBool,
    pub sent: Mutex<Vec<OutboundMessage>>,
}

impl CountingSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sends(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MessagingChannel for CountingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(LeadflowError::adapter("messaging", "gateway rejected message"));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(SendReceipt {
            message_id: format!("msg-{}", sent.len()),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub(crate) fn test_config() -> PipelineConfig {
    PipelineConfig {
        signal_timeout: Duration::from_secs(2),
        enrichment_timeout: Duration::from_millis(200),
        generation_timeout: Duration::from_secs(2),
        send_timeout: Duration::from_secs(2),
        batch_concurrency: 4,
        max_sends_per_hour: 100,
        hot_threshold: 70,
        default_profile: BusinessProfile {
            name: "saas".into(),
            ..Default::default()
        },
    }
}

pub(crate) fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("lf_core_test_{}.db", Uuid::now_v7()))
}

pub(crate) async fn temp_storage() -> Arc<Storage> {
    Arc::new(Storage::open(&temp_db_path()).await.expect("open test db"))
}

pub(crate) struct Harness {
    pub pipeline: Pipeline,
    pub drafter: Arc<CannedDrafter>,
    pub sender: Arc<CountingSender>,
}

pub(crate) struct HarnessBuilder {
    storage: Option<Arc<Storage>>,
    signals: Arc<dyn SignalSource>,
    adapters: AdapterRegistry,
    sender: CountingSender,
    config: PipelineConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            storage: None,
            signals: Arc::new(StaticSignals::new(Vec::new())),
            adapters: AdapterRegistry::default(),
            sender: CountingSender::new(Channel::Linkedin),
            config: test_config(),
        }
    }

    /// Share a database with another harness.
    pub fn storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn signals(mut self, signals: impl SignalSource + 'static) -> Self {
        self.signals = Arc::new(signals);
        self
    }

    pub fn adapter(mut self, adapter: impl EnrichmentAdapter + 'static) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    pub fn sender(mut self, sender: CountingSender) -> Self {
        self.sender = sender;
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut PipelineConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub async fn build(self) -> Harness {
        let drafter = Arc::new(CannedDrafter::default());
        let sender = Arc::new(self.sender);
        let storage = match self.storage {
            Some(storage) => storage,
            None => temp_storage().await,
        };
        let pipeline = Pipeline::new(
            storage,
            self.signals,
            self.adapters,
            drafter.clone(),
            sender.clone(),
            self.config,
        );
        Harness {
            pipeline,
            drafter,
            sender,
        }
    }
}

/// Insert a lead directly, bypassing discovery, and return it as stored.
pub(crate) async fn seed_lead(
    pipeline: &Pipeline,
    status: LeadStatus,
    contact: EnrichmentFields,
) -> Lead {
    let mut lead = Lead::new(
        "Acme",
        "static-signals",
        format!("acme|jane doe|{}", Uuid::now_v7()),
    );
    lead.contact = contact;
    lead.contact.contact_name = Some("Jane Doe".into());
    lead.status = status;
    pipeline
        .storage()
        .create_lead(
            &lead,
            &NewActivity::new(ActivityType::Note, Actor::Automation, "seeded"),
        )
        .await
        .expect("seed lead")
        .expect("lead inserted");
    // Re-read so timestamps carry stored precision.
    pipeline
        .storage()
        .require_lead(&lead.id)
        .await
        .expect("read seeded lead")
}
