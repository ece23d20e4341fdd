//! Discovery engine: turn signal-source candidates into new leads.

use std::collections::HashSet;

use leadflow_discovery::Candidate;
use leadflow_shared::{ActivityType, Actor, BusinessProfile, Lead, LeadId, NewActivity, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::{Pipeline, ProgressReporter};

/// Upper bound on signal queries per run. Each round asks for more
/// candidates to make up for ones already known.
const MAX_QUERY_ROUNDS: usize = 4;

/// Summary of one discovery run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub created: usize,
    pub enriched: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    /// Ids of the leads created by this run, in creation order.
    pub lead_ids: Vec<LeadId>,
}

impl Pipeline {
    /// Query the signal source for `profile` (or the configured default) and
    /// create up to `limit` new leads, optionally enriching each one.
    ///
    /// Known dedup keys are skipped. When skips leave the run short of
    /// `limit`, the source is queried again for a larger batch. Signal
    /// source and per-candidate store failures land in `errors`; they are
    /// not errors of the call.
    #[instrument(skip_all, fields(profile = tracing::field::Empty, limit = limit, auto_enrich = auto_enrich))]
    pub async fn find_leads(
        &self,
        profile: Option<BusinessProfile>,
        limit: usize,
        auto_enrich: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<DiscoveryReport> {
        let profile = profile.unwrap_or_else(|| self.config.default_profile.clone());
        tracing::Span::current().record("profile", profile.name.as_str());
        let mut report = DiscoveryReport::default();
        if limit == 0 {
            return Ok(report);
        }

        let source = self.signals.name().to_string();
        // Keys and unusable labels handled in earlier rounds.
        let mut handled: HashSet<String> = HashSet::new();
        let mut unusable: HashSet<String> = HashSet::new();
        let mut request = limit;

        for round in 0..MAX_QUERY_ROUNDS {
            progress.phase("Querying signal source");
            let candidates = match self.query_signals(&profile, request).await {
                Ok(candidates) => candidates,
                Err(message) => {
                    report.errors.push(message);
                    break;
                }
            };
            debug!(
                round,
                requested = request,
                candidates = candidates.len(),
                "signal source answered"
            );

            progress.phase("Creating leads");
            let mut round_keys = HashSet::new();
            let mut fresh = 0usize;
            for candidate in &candidates {
                let label = candidate.label();
                let Some(key) = candidate.dedup_key() else {
                    if unusable.insert(label.clone()) {
                        report.errors.push(format!("{label}: no usable identity"));
                    }
                    continue;
                };
                if handled.contains(&key) {
                    continue;
                }
                if !round_keys.insert(key.clone()) {
                    report.skipped += 1;
                    continue;
                }
                fresh += 1;

                match self.storage.find_by_dedup_key(&key).await {
                    Ok(Some(_)) => {
                        debug!(key = %key, "candidate already known");
                        report.skipped += 1;
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(candidate = %label, error = %e, "dedup lookup failed");
                        report.errors.push(format!("{label}: {e}"));
                        continue;
                    }
                }
                if report.created >= limit {
                    continue;
                }

                let lead = candidate_to_lead(candidate, &source, &profile, key);
                let activity = NewActivity::new(
                    ActivityType::Note,
                    Actor::Automation,
                    creation_note(candidate, &source),
                );
                match self.storage.create_lead(&lead, &activity).await {
                    Ok(Some(_)) => {
                        report.created += 1;
                        report.lead_ids.push(lead.id.clone());
                        progress.lead_done(&label, report.created, limit);
                    }
                    // Lost a race with a concurrent run.
                    Ok(None) => report.skipped += 1,
                    Err(e) => {
                        warn!(candidate = %label, error = %e, "lead creation failed");
                        report.errors.push(format!("{label}: {e}"));
                    }
                }
            }
            handled.extend(round_keys);

            // Done when the limit is met or the source has nothing more.
            if report.created >= limit || candidates.len() < request || fresh == 0 {
                break;
            }
            request += limit - report.created;
        }

        if auto_enrich && !report.lead_ids.is_empty() {
            progress.phase("Enriching new leads");
            let results = self.enrich_many(&report.lead_ids, progress).await;
            for (id, result) in results {
                match result {
                    Ok(enrichment) if enrichment.any_succeeded() => report.enriched += 1,
                    Ok(enrichment) => report.errors.push(format!(
                        "{id}: enrichment failed: {}",
                        enrichment.errors.join("; ")
                    )),
                    Err(e) => report.errors.push(format!("{id}: {e}")),
                }
            }
        }

        info!(
            created = report.created,
            enriched = report.enriched,
            skipped = report.skipped,
            errors = report.errors.len(),
            "discovery finished"
        );
        Ok(report)
    }

    /// Query the signal source under the configured timeout. Failures come
    /// back as a report line.
    async fn query_signals(
        &self,
        profile: &BusinessProfile,
        limit: usize,
    ) -> std::result::Result<Vec<Candidate>, String> {
        let source = self.signals.name();
        let query = self.signals.query(profile, limit);
        match tokio::time::timeout(self.config.signal_timeout, query).await {
            Ok(Ok(candidates)) => Ok(candidates),
            Ok(Err(e)) => {
                warn!(source = %source, error = %e, "signal source failed");
                Err(format!("{source}: {e}"))
            }
            Err(_) => {
                warn!(source = %source, "signal source timed out");
                Err(format!(
                    "{source}: timed out after {}ms",
                    self.config.signal_timeout.as_millis()
                ))
            }
        }
    }
}

fn candidate_to_lead(
    candidate: &Candidate,
    source: &str,
    profile: &BusinessProfile,
    key: String,
) -> Lead {
    let company = candidate.company_name.trim();
    let company = if company.is_empty() {
        candidate
            .website
            .as_deref()
            .and_then(leadflow_shared::website_domain)
            .unwrap_or_default()
    } else {
        company.to_string()
    };

    let mut lead = Lead::new(company, source, key);
    lead.contact.contact_name = non_blank(&candidate.contact_name);
    lead.contact.contact_title = non_blank(&candidate.contact_title);
    lead.contact.email = non_blank(&candidate.email);
    lead.contact.website = non_blank(&candidate.website);
    lead.contact.linkedin_url = non_blank(&candidate.linkedin_url);
    lead.contact.location = non_blank(&candidate.location);
    lead.signal_type = non_blank(&candidate.signal_type);
    lead.notes = non_blank(&candidate.notes);
    if !profile.name.is_empty() {
        lead.business_segment = Some(profile.name.clone());
    }
    lead
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn creation_note(candidate: &Candidate, source: &str) -> String {
    match candidate.signal_type.as_deref() {
        Some(signal) => format!("discovered by {source} ({signal} signal)"),
        None => format!("discovered by {source}"),
    }
}
