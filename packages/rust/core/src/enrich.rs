//! Enrichment engine: query every adapter, merge by priority, commit once.

use std::sync::Arc;

use leadflow_enrichment::{FieldChange, LookupQuery, plan_merge};
use leadflow_shared::{ActivityType, Actor, Lead, LeadId, LeadflowError, NewActivity, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::pipeline::{Pipeline, ProgressReporter};
use crate::status::{StageEvent, next_status};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub succeeded: bool,
}

/// Result of enriching one lead.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentReport {
    /// The lead as stored after this call.
    pub lead: Lead,
    pub sources: Vec<SourceStatus>,
    /// One entry per failed source.
    pub errors: Vec<String>,
    /// Fields this call changed.
    pub changes: Vec<FieldChange>,
}

impl EnrichmentReport {
    pub fn any_succeeded(&self) -> bool {
        self.sources.iter().any(|s| s.succeeded)
    }
}

impl Pipeline {
    /// Enrich one lead from every configured source.
    ///
    /// Source failures are reported, not raised: with at least one success
    /// the merged fields, the `New → Enriched` transition and the new score
    /// are committed together with an `enrichment` activity; with none, the
    /// lead is left as is and only the activity is recorded.
    #[instrument(skip_all, fields(lead_id = %lead_id))]
    pub async fn enrich_lead(&self, lead_id: &LeadId) -> Result<EnrichmentReport> {
        let (_permit, mut lead) = self.lock_lead(lead_id).await?;

        let results = self
            .adapters
            .lookup_all(
                &LookupQuery::from(&lead),
                self.config.enrichment_timeout,
                self.config.batch_concurrency,
            )
            .await;

        let sources: Vec<SourceStatus> = results
            .iter()
            .map(|r| SourceStatus {
                name: r.source_name.clone(),
                succeeded: r.succeeded,
            })
            .collect();
        let errors: Vec<String> = results
            .iter()
            .filter(|r| !r.succeeded)
            .map(|r| {
                format!(
                    "{}: {}",
                    r.source_name,
                    r.error_message.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();
        let succeeded: Vec<&str> = results
            .iter()
            .filter(|r| r.succeeded)
            .map(|r| r.source_name.as_str())
            .collect();

        if succeeded.is_empty() {
            let content = if results.is_empty() {
                "no enrichment sources configured".to_string()
            } else {
                format!("all {} sources failed: {}", results.len(), errors.join("; "))
            };
            warn!(failed = errors.len(), "enrichment produced no data");
            self.storage
                .append_activity(
                    &lead.id,
                    &NewActivity::new(ActivityType::Enrichment, Actor::Automation, content),
                )
                .await?;
            return Ok(EnrichmentReport {
                lead,
                sources,
                errors,
                changes: Vec::new(),
            });
        }

        let plan = plan_merge(&lead.contact, &results);
        let next = next_status(&lead, StageEvent::EnrichmentCommitted)?;
        let mut content = format!("enriched from {}", succeeded.join(", "));
        if !plan.is_empty() {
            content.push_str(&format!("; updated {}", plan.describe()));
        }
        if !errors.is_empty() {
            content.push_str(&format!("; failed: {}", errors.join("; ")));
        }
        let activity = NewActivity::new(ActivityType::Enrichment, Actor::Automation, content);

        if plan.is_empty() && next == lead.status {
            info!(sources = succeeded.len(), "no new enrichment data");
            self.storage.append_activity(&lead.id, &activity).await?;
            return Ok(EnrichmentReport {
                lead,
                sources,
                errors,
                changes: Vec::new(),
            });
        }

        plan.apply(&mut lead.contact);
        lead.status = next;
        self.rescore(&mut lead, &[]).await?;
        self.storage.commit_lead(&mut lead, &activity).await?;

        info!(
            changed = plan.changes.len(),
            failed = errors.len(),
            status = %lead.status,
            score = lead.score,
            "lead enriched"
        );
        Ok(EnrichmentReport {
            lead,
            sources,
            errors,
            changes: plan.changes,
        })
    }

    /// Enrich several leads with a bounded worker count. Each lead's
    /// failure is isolated; results come back in input order.
    #[instrument(skip_all, fields(leads = ids.len()))]
    pub async fn enrich_many(
        &self,
        ids: &[LeadId],
        progress: &dyn ProgressReporter,
    ) -> Vec<(LeadId, Result<EnrichmentReport>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.batch_concurrency.max(1)));
        let mut handles = Vec::with_capacity(ids.len());

        for id in ids {
            let pipeline = self.clone();
            let sem = Arc::clone(&semaphore);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_worker) = sem.acquire_owned().await else {
                    return Err(LeadflowError::Busy(id.to_string()));
                };
                pipeline.enrich_lead(&id).await
            }));
        }

        let total = ids.len();
        let mut results = Vec::with_capacity(total);
        for (i, (id, handle)) in ids.iter().zip(handles).enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(LeadflowError::adapter(
                    "enrichment",
                    format!("worker task failed: {e}"),
                )),
            };
            if let Err(e) = &result {
                warn!(lead_id = %id, error = %e, "enrichment failed");
            }
            progress.lead_done(&id.to_string(), i + 1, total);
            results.push((id.clone(), result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use leadflow_shared::{EnrichmentFields, LeadStatus};

    use crate::SilentProgress;
    use crate::testing::*;

    #[tokio::test]
    async fn survivor_updates_lead_when_two_of_three_fail() {
        let h = HarnessBuilder::new()
            .adapter(FailingAdapter("primary"))
            .adapter(HangingAdapter("secondary"))
            .adapter(FixedAdapter::new("tertiary", contact_fields()))
            .build()
            .await;
        let lead = seed_lead(&h.pipeline, LeadStatus::New, EnrichmentFields::default()).await;

        let report = h.pipeline.enrich_lead(&lead.id).await.expect("enrich");

        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.sources.len(), 3);
        assert!(report.sources[2].succeeded);
        assert_eq!(report.lead.status, LeadStatus::Enriched);
        assert_eq!(report.lead.contact.email.as_deref(), Some("jane@acme.io"));

        let stored = h.pipeline.storage().require_lead(&lead.id).await.unwrap();
        assert_eq!(stored.status, LeadStatus::Enriched);
        assert_eq!(stored.contact.contact_title.as_deref(), Some("CTO"));
        assert!(stored.score > 0);
    }

    #[tokio::test]
    async fn all_sources_timing_out_leaves_lead_unchanged() {
        let h = HarnessBuilder::new()
            .adapter(HangingAdapter("a"))
            .adapter(HangingAdapter("b"))
            .adapter(HangingAdapter("c"))
            .build()
            .await;
        let lead = seed_lead(&h.pipeline, LeadStatus::New, EnrichmentFields::default()).await;

        let report = h.pipeline.enrich_lead(&lead.id).await.expect("enrich");

        assert_eq!(report.errors.len(), 3);
        assert!(report.sources.iter().all(|s| !s.succeeded));
        assert!(report.errors.iter().all(|e| e.contains("timed out")));

        let stored = h.pipeline.storage().require_lead(&lead.id).await.unwrap();
        assert_eq!(stored, lead);

        let activities = h.pipeline.storage().list_activities(&lead.id).await.unwrap();
        assert_eq!(activities.len(), 2);
        assert!(activities[1].content.starts_with("all 3 sources failed"));
    }

    #[tokio::test]
    async fn repeated_enrichment_without_new_data_is_idempotent() {
        let h = HarnessBuilder::new()
            .adapter(FixedAdapter::new("primary", contact_fields()))
            .build()
            .await;
        let lead = seed_lead(&h.pipeline, LeadStatus::New, EnrichmentFields::default()).await;

        let first = h.pipeline.enrich_lead(&lead.id).await.unwrap();
        assert!(!first.changes.is_empty());
        let after_first = h.pipeline.storage().require_lead(&lead.id).await.unwrap();

        let second = h.pipeline.enrich_lead(&lead.id).await.unwrap();
        assert!(second.changes.is_empty());
        assert!(second.any_succeeded());

        let after_second = h.pipeline.storage().require_lead(&lead.id).await.unwrap();
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn enrichment_never_moves_terminal_leads() {
        let h = HarnessBuilder::new()
            .adapter(FixedAdapter::new("primary", contact_fields()))
            .build()
            .await;
        let lead =
            seed_lead(&h.pipeline, LeadStatus::Unqualified, EnrichmentFields::default()).await;

        let report = h.pipeline.enrich_lead(&lead.id).await.unwrap();
        assert_eq!(report.lead.status, LeadStatus::Unqualified);
        assert_eq!(report.lead.contact.email.as_deref(), Some("jane@acme.io"));
    }

    #[tokio::test]
    async fn concurrent_stage_on_same_lead_is_busy() {
        let h = HarnessBuilder::new().build().await;
        let lead = seed_lead(&h.pipeline, LeadStatus::New, EnrichmentFields::default()).await;

        let _held = h.pipeline.guard.try_acquire(&lead.id).unwrap();
        let err = h.pipeline.enrich_lead(&lead.id).await.unwrap_err();
        assert_eq!(err.http_status(), 423);
    }

    #[tokio::test]
    async fn unknown_lead_is_not_found() {
        let h = HarnessBuilder::new().build().await;
        let err = h
            .pipeline
            .enrich_lead(&leadflow_shared::LeadId::new())
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[tokio::test]
    async fn enrich_many_isolates_failures() {
        let adapter = FixedAdapter::new("primary", contact_fields());
        let h = HarnessBuilder::new()
            .adapter(adapter)
            .config(|c| c.batch_concurrency = 2)
            .build()
            .await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                seed_lead(&h.pipeline, LeadStatus::New, EnrichmentFields::default())
                    .await
                    .id,
            );
        }
        ids.insert(1, leadflow_shared::LeadId::new());

        let results = h.pipeline.enrich_many(&ids, &SilentProgress).await;
        assert_eq!(results.len(), 4);
        assert_eq!(results[1].0, ids[1]);
        assert!(results[1].1.is_err());
        let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
        assert_eq!(ok, 3);
        assert_eq!(h.pipeline.guard.in_flight(), 0);
    }
}
