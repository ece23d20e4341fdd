//! Draft generation, research summaries and the outreach executor.

use leadflow_outreach::{LeadProfile, OutboundMessage, OutreachDraft, select_best};
use leadflow_shared::{
    ActivityType, Actor, Channel, Lead, LeadId, LeadStatus, LeadflowError, NewActivity, Result,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::pipeline::Pipeline;
use crate::status::{StageEvent, next_status};

/// Result of one `execute_outreach` call.
#[derive(Debug, Clone, Serialize)]
pub struct OutreachReport {
    pub lead: Lead,
    /// Whether a message went out during this call.
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<OutreachDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub idempotency_key: String,
    /// Why nothing was sent, when `sent` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Idempotency key for the `sequence`-th send to a lead on a channel.
pub fn idempotency_key(lead_id: &LeadId, channel: Channel, sequence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{lead_id}|{channel}|{sequence}").as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Pipeline {
    /// Draft outreach for every channel the lead is reachable on. Persists
    /// nothing.
    #[instrument(skip_all, fields(lead_id = %lead_id))]
    pub async fn generate_outreach(&self, lead_id: &LeadId) -> Result<Vec<OutreachDraft>> {
        let lead = self.storage.require_lead(lead_id).await?;
        let channels = lead.reachable_channels();
        self.draft_for(&lead, &channels).await
    }

    /// Produce a research summary and store it on the lead with a `note`
    /// activity. A generation failure leaves the lead untouched.
    #[instrument(skip_all, fields(lead_id = %lead_id))]
    pub async fn generate_research_summary(&self, lead_id: &LeadId) -> Result<Lead> {
        let (_permit, mut lead) = self.lock_lead(lead_id).await?;
        let profile = LeadProfile::from(&lead);

        let summary = match tokio::time::timeout(
            self.config.generation_timeout,
            self.drafting.research(&profile),
        )
        .await
        {
            Ok(Ok(summary)) => summary.trim().to_string(),
            Ok(Err(e)) => return Err(as_generation_failure(e)),
            Err(_) => return Err(generation_timeout(self.config.generation_timeout)),
        };
        if summary.is_empty() {
            return Err(LeadflowError::GenerationFailed(
                "research summary was empty".into(),
            ));
        }

        lead.research_summary = Some(summary);
        self.rescore(&mut lead, &[]).await?;
        self.storage
            .commit_lead(
                &mut lead,
                &NewActivity::new(
                    ActivityType::Note,
                    Actor::Automation,
                    "research summary generated",
                ),
            )
            .await?;

        info!(score = lead.score, "research summary stored");
        Ok(lead)
    }

    /// Send the best-ranked draft to the lead on the configured channel.
    ///
    /// A Contacted lead is only messaged again with `follow_up`. Each send
    /// carries an idempotency key; a key already recorded on the lead is
    /// never sent twice. On success the lead moves to Contacted and the send
    /// is committed with an `outreach_sent` activity in one transaction.
    #[instrument(skip_all, fields(lead_id = %lead_id, follow_up = follow_up))]
    pub async fn execute_outreach(&self, lead_id: &LeadId, follow_up: bool) -> Result<OutreachReport> {
        let (_permit, mut lead) = self.lock_lead(lead_id).await?;
        let channel = self.messaging.channel();

        if lead.status == LeadStatus::New || lead.status.is_terminal() {
            next_status(&lead, StageEvent::OutreachSent)?;
        }

        let sequence = if follow_up {
            self.storage
                .list_activities(&lead.id)
                .await?
                .iter()
                .filter(|a| a.activity_type == ActivityType::OutreachSent)
                .count()
        } else {
            0
        };
        let key = idempotency_key(&lead.id, channel, sequence);

        if lead.status == LeadStatus::Contacted && !follow_up {
            debug!("lead already contacted");
            return Ok(not_sent(lead, key, "already contacted; use follow-up to send again"));
        }

        let Some(recipient) = lead.identity_for(channel).map(str::to_string) else {
            return Err(LeadflowError::precondition(format!(
                "lead {} has no {channel} identity",
                lead.id
            )));
        };

        if self
            .storage
            .find_activity_by_reference(&lead.id, &key)
            .await?
            .is_some()
        {
            info!(key = %key, "send already recorded");
            return Ok(not_sent(lead, key, "message already sent"));
        }

        let slot = self.limiter.try_acquire(channel)?;

        let draft = match self.pick_draft(&lead, channel).await {
            Ok(draft) => draft,
            Err(e) => {
                self.limiter.release(slot);
                return Err(e);
            }
        };

        let message = OutboundMessage {
            channel,
            recipient,
            subject: draft.subject.clone(),
            body: draft.body.clone(),
            idempotency_key: key.clone(),
        };
        let receipt = match tokio::time::timeout(
            self.config.send_timeout,
            self.messaging.send(&message),
        )
        .await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                self.limiter.release(slot);
                warn!(error = %e, "send failed");
                return Err(e);
            }
            Err(_) => {
                self.limiter.release(slot);
                warn!("send timed out");
                return Err(LeadflowError::adapter(
                    format!("messaging:{channel}"),
                    format!(
                        "timed out after {}ms",
                        self.config.send_timeout.as_millis()
                    ),
                ));
            }
        };

        lead.status = next_status(&lead, StageEvent::OutreachSent)?;
        lead.last_contacted_at = Some(chrono::Utc::now());
        self.rescore(&mut lead, &[]).await?;
        let content = if follow_up {
            format!("follow-up sent via {channel} (message {})", receipt.message_id)
        } else {
            format!("outreach sent via {channel} (message {})", receipt.message_id)
        };
        self.storage
            .commit_lead(
                &mut lead,
                &NewActivity::new(ActivityType::OutreachSent, Actor::Automation, content)
                    .with_reference(key.clone()),
            )
            .await?;

        info!(%channel, message_id = %receipt.message_id, score = lead.score, "outreach sent");
        Ok(OutreachReport {
            lead,
            sent: true,
            draft: Some(draft),
            message_id: Some(receipt.message_id),
            idempotency_key: key,
            reason: None,
        })
    }

    /// Generate drafts for `channel` and keep the best one.
    async fn pick_draft(&self, lead: &Lead, channel: Channel) -> Result<OutreachDraft> {
        let drafts = self.draft_for(lead, &[channel]).await?;
        select_best(&drafts, channel, &LeadProfile::from(lead))
            .cloned()
            .ok_or_else(|| {
                LeadflowError::GenerationFailed(format!("no usable {channel} draft was generated"))
            })
    }

    async fn draft_for(&self, lead: &Lead, channels: &[Channel]) -> Result<Vec<OutreachDraft>> {
        if lead.contact_name().is_none() {
            return Err(LeadflowError::precondition(format!(
                "lead {} has no contact name",
                lead.id
            )));
        }
        if channels.is_empty() {
            return Err(LeadflowError::precondition(format!(
                "lead {} has no reachable channel (email or LinkedIn profile)",
                lead.id
            )));
        }

        let profile = LeadProfile::from(lead);
        let drafts = match tokio::time::timeout(
            self.config.generation_timeout,
            self.drafting
                .generate(&profile, lead.research_summary.as_deref(), channels),
        )
        .await
        {
            Ok(Ok(drafts)) => drafts,
            Ok(Err(e)) => return Err(as_generation_failure(e)),
            Err(_) => return Err(generation_timeout(self.config.generation_timeout)),
        };

        debug!(drafts = drafts.len(), "drafts generated");
        Ok(drafts)
    }
}

fn not_sent(lead: Lead, key: String, reason: &str) -> OutreachReport {
    OutreachReport {
        lead,
        sent: false,
        draft: None,
        message_id: None,
        idempotency_key: key,
        reason: Some(reason.to_string()),
    }
}

fn as_generation_failure(e: LeadflowError) -> LeadflowError {
    match e {
        LeadflowError::GenerationFailed(_) => e,
        other => LeadflowError::GenerationFailed(other.to_string()),
    }
}

fn generation_timeout(timeout: std::time::Duration) -> LeadflowError {
    LeadflowError::GenerationFailed(format!("timed out after {}ms", timeout.as_millis()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use leadflow_shared::{ActivityType, Channel, EnrichmentFields, LeadStatus, LeadflowError};

    use super::idempotency_key;
    use crate::testing::*;

    #[tokio::test]
    async fn sends_best_draft_and_commits_contact() {
        let h = HarnessBuilder::new().build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;

        let report = h.pipeline.execute_outreach(&lead.id, false).await.unwrap();

        assert!(report.sent);
        assert_eq!(report.message_id.as_deref(), Some("msg-1"));
        assert_eq!(report.lead.status, LeadStatus::Contacted);
        assert!(report.lead.last_contacted_at.is_some());
        assert_eq!(report.idempotency_key, idempotency_key(&lead.id, Channel::Linkedin, 0));

        let sent = h.sender.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "https://linkedin.com/in/janedoe");
        // The personalized draft outranks the generic one.
        assert!(sent[0].body.starts_with("Hi Jane"));

        let activities = h.pipeline.storage().list_activities(&lead.id).await.unwrap();
        let last = activities.last().unwrap();
        assert_eq!(last.activity_type, ActivityType::OutreachSent);
        assert_eq!(last.reference.as_deref(), Some(report.idempotency_key.as_str()));
    }

    #[tokio::test]
    async fn concurrent_calls_send_exactly_once() {
        let mut sender = CountingSender::new(Channel::Linkedin);
        sender.delay = Duration::from_millis(100);
        let h = HarnessBuilder::new().sender(sender).build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;

        let a = h.pipeline.clone();
        let b = h.pipeline.clone();
        let (first, second) = tokio::join!(
            a.execute_outreach(&lead.id, false),
            b.execute_outreach(&lead.id, false)
        );

        let sent = [first, second]
            .into_iter()
            .filter(|r| matches!(r, Ok(report) if report.sent))
            .count();
        assert_eq!(sent, 1);
        assert_eq!(h.sender.sends(), 1);

        // A repeat after the fact is a no-op.
        let again = h.pipeline.execute_outreach(&lead.id, false).await.unwrap();
        assert!(!again.sent);
        assert_eq!(h.sender.sends(), 1);
    }

    #[tokio::test]
    async fn recorded_key_is_never_sent_twice() {
        let h = HarnessBuilder::new().build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;
        h.pipeline.execute_outreach(&lead.id, false).await.unwrap();

        // Someone moves the lead back by hand; the first-send key is on record.
        let mut reset = h.pipeline.storage().require_lead(&lead.id).await.unwrap();
        reset.status = LeadStatus::Enriched;
        h.pipeline.storage().update_lead(&mut reset).await.unwrap();

        let report = h.pipeline.execute_outreach(&lead.id, false).await.unwrap();
        assert!(!report.sent);
        assert_eq!(h.sender.sends(), 1);
    }

    #[tokio::test]
    async fn follow_up_uses_a_fresh_key() {
        let h = HarnessBuilder::new().build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;

        let first = h.pipeline.execute_outreach(&lead.id, false).await.unwrap();
        let second = h.pipeline.execute_outreach(&lead.id, true).await.unwrap();

        assert!(second.sent);
        assert_ne!(first.idempotency_key, second.idempotency_key);
        assert_eq!(second.lead.status, LeadStatus::Contacted);
        assert_eq!(h.sender.sends(), 2);
    }

    #[tokio::test]
    async fn new_and_terminal_leads_are_invalid() {
        let h = HarnessBuilder::new().build().await;
        for status in [LeadStatus::New, LeadStatus::Qualified, LeadStatus::Unqualified] {
            let lead = seed_lead(&h.pipeline, status, contact_fields()).await;
            let err = h.pipeline.execute_outreach(&lead.id, true).await.unwrap_err();
            assert!(matches!(err, LeadflowError::InvalidState { .. }), "{status}");

            let stored = h.pipeline.storage().require_lead(&lead.id).await.unwrap();
            assert_eq!(stored, lead);
        }
        assert_eq!(h.sender.sends(), 0);
    }

    #[tokio::test]
    async fn missing_channel_identity_is_precondition_failure() {
        let h = HarnessBuilder::new().build().await;
        let email_only = EnrichmentFields {
            email: Some("jane@acme.io".into()),
            ..Default::default()
        };
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, email_only).await;

        let err = h.pipeline.execute_outreach(&lead.id, false).await.unwrap_err();
        assert_eq!(err.http_status(), 422);
        assert_eq!(h.drafter.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn send_failure_leaves_lead_unchanged_and_frees_slot() {
        let h = HarnessBuilder::new()
            .config(|c| c.max_sends_per_hour = 1)
            .build()
            .await;
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;

        h.sender.fail.store(true, Ordering::SeqCst);
        let err = h.pipeline.execute_outreach(&lead.id, false).await.unwrap_err();
        assert_eq!(err.http_status(), 502);
        let stored = h.pipeline.storage().require_lead(&lead.id).await.unwrap();
        assert_eq!(stored, lead);

        h.sender.fail.store(false, Ordering::SeqCst);
        let report = h.pipeline.execute_outreach(&lead.id, false).await.unwrap();
        assert!(report.sent);
    }

    #[tokio::test]
    async fn rate_limit_blocks_further_sends() {
        let h = HarnessBuilder::new()
            .config(|c| c.max_sends_per_hour = 1)
            .build()
            .await;
        let first = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;
        let second = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;

        h.pipeline.execute_outreach(&first.id, false).await.unwrap();
        let err = h.pipeline.execute_outreach(&second.id, false).await.unwrap_err();

        assert!(matches!(err, LeadflowError::RateLimited { .. }));
        assert!(err.is_retryable());
        assert_eq!(h.sender.sends(), 1);
    }

    #[tokio::test]
    async fn generation_failure_sends_nothing() {
        let h = HarnessBuilder::new().build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;
        h.drafter.fail.store(true, Ordering::SeqCst);

        let err = h.pipeline.execute_outreach(&lead.id, false).await.unwrap_err();
        assert!(matches!(err, LeadflowError::GenerationFailed(_)));
        assert_eq!(h.sender.sends(), 0);
        assert_eq!(h.pipeline.limiter.in_window(Channel::Linkedin), 0);
    }

    #[tokio::test]
    async fn drafts_cover_every_reachable_channel() {
        let h = HarnessBuilder::new().build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;

        let drafts = h.pipeline.generate_outreach(&lead.id).await.unwrap();
        assert!(drafts.iter().any(|d| d.channel == Channel::Email));
        assert!(drafts.iter().any(|d| d.channel == Channel::Linkedin));

        let stored = h.pipeline.storage().require_lead(&lead.id).await.unwrap();
        assert_eq!(stored, lead);
    }

    #[tokio::test]
    async fn drafting_requires_a_channel() {
        let h = HarnessBuilder::new().build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::New, EnrichmentFields::default()).await;

        let err = h.pipeline.generate_outreach(&lead.id).await.unwrap_err();
        assert!(matches!(err, LeadflowError::PreconditionFailed { .. }));
    }

    #[tokio::test]
    async fn research_summary_is_committed() {
        let h = HarnessBuilder::new().build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;

        let updated = h.pipeline.generate_research_summary(&lead.id).await.unwrap();
        assert_eq!(
            updated.research_summary.as_deref(),
            Some("Acme is growing its engineering team.")
        );
        assert!(updated.score > lead.score);

        let activities = h.pipeline.storage().list_activities(&lead.id).await.unwrap();
        assert_eq!(activities.last().unwrap().activity_type, ActivityType::Note);
    }

    #[tokio::test]
    async fn research_failure_leaves_lead_untouched() {
        let h = HarnessBuilder::new().build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::Enriched, contact_fields()).await;
        h.drafter.fail.store(true, Ordering::SeqCst);

        let err = h.pipeline.generate_research_summary(&lead.id).await.unwrap_err();
        assert!(matches!(err, LeadflowError::GenerationFailed(_)));
        let stored = h.pipeline.storage().require_lead(&lead.id).await.unwrap();
        assert_eq!(stored, lead);
    }

    #[test]
    fn keys_differ_by_channel_and_sequence() {
        let id = leadflow_shared::LeadId::new();
        let base = idempotency_key(&id, Channel::Email, 0);
        assert_eq!(base.len(), 64);
        assert_eq!(base, idempotency_key(&id, Channel::Email, 0));
        assert_ne!(base, idempotency_key(&id, Channel::Linkedin, 0));
        assert_ne!(base, idempotency_key(&id, Channel::Email, 1));
    }
}
