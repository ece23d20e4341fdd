//! Call outcome logging and manual lead edits.

use chrono::Utc;
use leadflow_shared::{
    ActivityType, Actor, CallOutcome, Lead, LeadActivity, LeadId, LeadStatus, LeadflowError,
    NewActivity, Result,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::pipeline::Pipeline;
use crate::scoring::OutcomeEvent;
use crate::status::{StageEvent, next_status};

/// Result of logging a call outcome.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub lead: Lead,
    pub previous_status: LeadStatus,
    pub activity: LeadActivity,
}

impl Pipeline {
    /// Record a call outcome and move the lead by the outcome taxonomy.
    ///
    /// Terminal leads keep their status; the call is still recorded and the
    /// score recomputed. Every logged call counts as contact.
    #[instrument(skip_all, fields(lead_id = %lead_id, outcome = %outcome))]
    pub async fn log_call_outcome(
        &self,
        lead_id: &LeadId,
        outcome: CallOutcome,
        notes: Option<&str>,
    ) -> Result<OutcomeReport> {
        let (_permit, mut lead) = self.lock_lead(lead_id).await?;
        let previous_status = lead.status;

        lead.status = next_status(&lead, StageEvent::OutcomeLogged(outcome))?;
        let event = OutcomeEvent {
            outcome,
            at: Utc::now(),
        };
        lead.last_contacted_at = Some(event.at);
        self.rescore(&mut lead, &[event]).await?;

        let content = match notes.map(str::trim).filter(|n| !n.is_empty()) {
            Some(notes) => notes.to_string(),
            None => format!("call outcome: {outcome}"),
        };
        let activity = self
            .storage
            .commit_lead(
                &mut lead,
                &NewActivity::new(ActivityType::Call, Actor::User, content).with_outcome(outcome),
            )
            .await?;

        info!(from = %previous_status, to = %lead.status, score = lead.score, "call outcome logged");
        Ok(OutcomeReport {
            lead,
            previous_status,
            activity,
        })
    }

    /// Manual status override. Allowed from and to any status.
    #[instrument(skip_all, fields(lead_id = %lead_id, status = %status))]
    pub async fn set_status(&self, lead_id: &LeadId, status: LeadStatus) -> Result<Lead> {
        let (_permit, mut lead) = self.lock_lead(lead_id).await?;
        if lead.status == status {
            return Ok(lead);
        }

        let previous = lead.status;
        lead.status = status;
        self.rescore(&mut lead, &[]).await?;
        self.storage
            .commit_lead(
                &mut lead,
                &NewActivity::new(
                    ActivityType::StatusChange,
                    Actor::User,
                    format!("status changed from {previous} to {status}"),
                ),
            )
            .await?;

        info!(from = %previous, "status overridden");
        Ok(lead)
    }

    /// Append a user note to the lead's timeline.
    #[instrument(skip_all, fields(lead_id = %lead_id))]
    pub async fn add_note(&self, lead_id: &LeadId, text: &str) -> Result<LeadActivity> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LeadflowError::validation("note text must not be empty"));
        }
        let _permit = self.guard.try_acquire(lead_id)?;
        self.storage
            .append_activity(lead_id, &NewActivity::new(ActivityType::Note, Actor::User, text))
            .await
    }

    /// Delete a lead and its activity log.
    #[instrument(skip_all, fields(lead_id = %lead_id))]
    pub async fn delete_lead(&self, lead_id: &LeadId) -> Result<()> {
        let _permit = self.guard.try_acquire(lead_id)?;
        if !self.storage.delete_lead(lead_id).await? {
            return Err(LeadflowError::lead_not_found(lead_id));
        }
        info!("lead deleted");
        Ok(())
    }
}
