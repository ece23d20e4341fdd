//! Lead status machine shared by enrichment, outreach and outcome logging.
//!
//! ```text
//! New ─enrich─▶ Enriched ─send/call─▶ Contacted ─outcome─▶ Qualified | Unqualified
//! ```
//!
//! Terminal statuses are never left by an automated stage; a manual
//! override (`set_status`) may move a lead anywhere.

use leadflow_shared::{CallOutcome, Lead, LeadStatus, LeadflowError, OutcomeSentiment, Result};

/// A stage commit that may move a lead along the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    EnrichmentCommitted,
    OutreachSent,
    OutcomeLogged(CallOutcome),
}

/// Where an outcome sends a contacted lead; `None` means it stays put.
pub fn outcome_target_status(outcome: CallOutcome) -> Option<LeadStatus> {
    match outcome.sentiment() {
        OutcomeSentiment::Positive => Some(LeadStatus::Qualified),
        OutcomeSentiment::Neutral => None,
        OutcomeSentiment::Negative => Some(LeadStatus::Unqualified),
    }
}

/// The status `lead` moves to when `event` commits.
///
/// Fails with `InvalidState` (leaving the lead untouched) for outreach on a
/// New or terminal lead and for outcomes on a New lead.
pub fn next_status(lead: &Lead, event: StageEvent) -> Result<LeadStatus> {
    let current = lead.status;
    let invalid = |action: &'static str| LeadflowError::InvalidState {
        lead_id: lead.id.to_string(),
        status: current.to_string(),
        action,
    };

    match event {
        StageEvent::EnrichmentCommitted => Ok(match current {
            LeadStatus::New => LeadStatus::Enriched,
            other => other,
        }),
        StageEvent::OutreachSent => match current {
            LeadStatus::Enriched | LeadStatus::Contacted => Ok(LeadStatus::Contacted),
            _ => Err(invalid("send outreach to")),
        },
        StageEvent::OutcomeLogged(outcome) => match current {
            LeadStatus::New => Err(invalid("log an outcome for")),
            s if s.is_terminal() => Ok(s),
            // A logged call on an Enriched lead counts as contact.
            _ => Ok(outcome_target_status(outcome).unwrap_or(LeadStatus::Contacted)),
        },
    }
}
