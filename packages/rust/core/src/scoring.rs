//! Lead qualification scoring.
//!
//! Scores are recomputed from scratch on every stage commit by a pure
//! [`ScorePolicy`]; nothing edits a score by hand.
//!
//! Default weights ([`DefaultScorePolicy`]):
//!
//! | signal | points |
//! |---|---|
//! | each populated contact/profile field (7) | 5 |
//! | research summary present | 5 |
//! | lead has been contacted | 5 |
//! | each positive outcome | 20 |
//! | each neutral outcome (max 3 counted) | 2 |
//! | each negative outcome | -15 |
//! | latest positive outcome within 7 days / 30 days | 15 / 8 |
//!
//! The total is clamped to `0..=100`.

use chrono::{DateTime, Duration, Utc};
use leadflow_shared::{CallOutcome, Lead, LeadActivity, OutcomeSentiment};

/// A logged outcome and when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeEvent {
    pub outcome: CallOutcome,
    pub at: DateTime<Utc>,
}

/// Collect outcome events from a lead's activity log.
pub fn outcome_history(activities: &[LeadActivity]) -> Vec<OutcomeEvent> {
    activities
        .iter()
        .filter_map(|a| {
            a.outcome.map(|outcome| OutcomeEvent {
                outcome,
                at: a.created_at,
            })
        })
        .collect()
}

/// Everything a policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub lead: &'a Lead,
    pub outcomes: &'a [OutcomeEvent],
    pub now: DateTime<Utc>,
}

/// A pure scoring function. Implementations must be non-decreasing in the
/// number of positive outcomes.
pub trait ScorePolicy: Send + Sync {
    fn score(&self, input: &ScoreInput<'_>) -> u8;
}

#[derive(Debug, Clone)]
pub struct DefaultScorePolicy {
    pub per_field: i32,
    pub research_bonus: i32,
    pub contacted_bonus: i32,
    pub per_positive: i32,
    pub per_neutral: i32,
    pub max_neutral_counted: usize,
    pub per_negative: i32,
    pub recent_week_bonus: i32,
    pub recent_month_bonus: i32,
}

impl Default for DefaultScorePolicy {
    fn default() -> Self {
        Self {
            per_field: 5,
            research_bonus: 5,
            contacted_bonus: 5,
            per_positive: 20,
            per_neutral: 2,
            max_neutral_counted: 3,
            per_negative: -15,
            recent_week_bonus: 15,
            recent_month_bonus: 8,
        }
    }
}

impl ScorePolicy for DefaultScorePolicy {
    fn score(&self, input: &ScoreInput<'_>) -> u8 {
        let lead = input.lead;
        let mut total = self.per_field * lead.contact.populated() as i32;

        if lead
            .research_summary
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
        {
            total += self.research_bonus;
        }
        if lead.last_contacted_at.is_some() {
            total += self.contacted_bonus;
        }

        let mut neutral = 0;
        let mut latest_positive: Option<DateTime<Utc>> = None;
        for event in input.outcomes {
            match event.outcome.sentiment() {
                OutcomeSentiment::Positive => {
                    total += self.per_positive;
                    latest_positive = latest_positive.max(Some(event.at));
                }
                OutcomeSentiment::Neutral => neutral += 1,
                OutcomeSentiment::Negative => total += self.per_negative,
            }
        }
        total += self.per_neutral * neutral.min(self.max_neutral_counted) as i32;

        if let Some(at) = latest_positive {
            let age = input.now - at;
            if age <= Duration::days(7) {
                total += self.recent_week_bonus;
            } else if age <= Duration::days(30) {
                total += self.recent_month_bonus;
            }
        }

        total.clamp(0, 100) as u8
    }
}

/// Recompute `lead.score` and the hot marker.
pub fn rescore(
    lead: &mut Lead,
    outcomes: &[OutcomeEvent],
    policy: &dyn ScorePolicy,
    hot_threshold: u8,
    now: DateTime<Utc>,
) {
    let score = policy.score(&ScoreInput {
        lead,
        outcomes,
        now,
    });
    lead.score = score;
    lead.is_hot = score >= hot_threshold;
}
