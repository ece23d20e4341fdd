//! Heuristic ranking of outreach drafts.
//!
//! Higher is better. Personalization (greeting the contact by name,
//! naming the company) dominates; length outside the channel's comfortable
//! range and leftover template placeholders are penalized.

use std::sync::LazyLock;

use leadflow_shared::Channel;
use regex::Regex;

use crate::{LeadProfile, OutreachDraft};

/// Hard cap on a professional-network note body.
const LINKEDIN_MAX_CHARS: usize = 300;

/// Comfortable email body length, in characters.
const EMAIL_BODY_RANGE: (usize, usize) = (250, 1200);

/// Score a single draft against the lead it is addressed to.
pub fn score_draft(draft: &OutreachDraft, profile: &LeadProfile) -> i32 {
    static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\[[A-Za-z ]+\]|\{\{[^}]*\}\}|<[A-Z_ ]+>").expect("valid regex")
    });

    let body = draft.body.trim();
    let body_lower = body.to_lowercase();
    let mut score = 0;

    if let Some(first) = profile.first_name() {
        if body_lower.contains(&first.to_lowercase()) {
            score += 3;
        }
    }
    let company = profile.company_name.trim().to_lowercase();
    if !company.is_empty() && body_lower.contains(&company) {
        score += 2;
    }
    if !draft.subject.trim().is_empty() {
        score += 1;
    }

    let len = body.chars().count();
    match draft.channel {
        Channel::Linkedin => {
            if len > LINKEDIN_MAX_CHARS {
                score -= 6;
            }
        }
        Channel::Email => {
            let (min, max) = EMAIL_BODY_RANGE;
            if len < min || len > max {
                score -= 2;
            }
        }
    }

    if PLACEHOLDER_RE.is_match(body) || PLACEHOLDER_RE.is_match(&draft.subject) {
        score -= 5;
    }
    score
}

/// The best-scoring draft for `channel`; the earliest wins ties.
pub fn select_best<'a>(
    drafts: &'a [OutreachDraft],
    channel: Channel,
    profile: &LeadProfile,
) -> Option<&'a OutreachDraft> {
    let mut best: Option<(&OutreachDraft, i32)> = None;
    for draft in drafts.iter().filter(|d| d.channel == channel) {
        let score = score_draft(draft, profile);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((draft, score));
        }
    }
    best.map(|(draft, _)| draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn draft(channel: Channel, subject: &str, body: &str) -> OutreachDraft {
        OutreachDraft {
            channel,
            subject: subject.into(),
            body: body.into(),
            generated_at: Utc::now(),
        }
    }

    fn profile() -> LeadProfile {
        LeadProfile {
            company_name: "Acme".into(),
            contact_name: Some("Jane Doe".into()),
            ..Default::default()
        }
    }

    #[test]
    fn personalization_scores_higher() {
        let generic = draft(Channel::Linkedin, "Hi", "Would love to connect.");
        let personal = draft(Channel::Linkedin, "Hi", "Jane, saw Acme is hiring. Connect?");
        assert!(score_draft(&personal, &profile()) > score_draft(&generic, &profile()));
    }

    #[test]
    fn placeholders_are_penalized() {
        let clean = draft(Channel::Linkedin, "Hi", "Jane, saw Acme is hiring.");
        let templated = draft(Channel::Linkedin, "Hi", "[First Name], saw Acme is hiring.");
        assert!(score_draft(&clean, &profile()) > score_draft(&templated, &profile()));
    }

    #[test]
    fn overlong_linkedin_note_is_penalized() {
        let long = "Jane at Acme ".repeat(40);
        let short = draft(Channel::Linkedin, "Hi", "Jane, quick note about Acme.");
        let long = draft(Channel::Linkedin, "Hi", &long);
        assert!(score_draft(&short, &profile()) > score_draft(&long, &profile()));
    }

    #[test]
    fn select_best_filters_by_channel_and_prefers_earliest_on_tie() {
        let drafts = vec![
            draft(Channel::Email, "Hi", "Generic email."),
            draft(Channel::Linkedin, "Hi", "Jane, about Acme."),
            draft(Channel::Linkedin, "Hi", "Jane, regarding Acme."),
        ];
        let best = select_best(&drafts, Channel::Linkedin, &profile()).unwrap();
        assert_eq!(best.body, "Jane, about Acme.");
        assert!(select_best(&drafts[..1], Channel::Linkedin, &profile()).is_none());
    }
}
