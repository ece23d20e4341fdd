//! Prompt construction for drafting and research.

use leadflow_shared::Channel;

use crate::LeadProfile;

pub(crate) const DRAFT_SYSTEM_PROMPT: &str = "You write short, specific B2B outreach messages. \
Never invent facts about the recipient. Never use placeholders such as [Name]. \
Reply with a JSON array only, no prose and no code fences. Each element is an object \
with the keys \"channel\", \"subject\" and \"body\".";

pub(crate) const RESEARCH_SYSTEM_PROMPT: &str = "You are a sales researcher. Summarize what is \
known about the company and contact in at most six sentences: what they do, likely priorities, \
and one angle for a first conversation. Plain text only.";

/// Channel-specific writing rules.
fn channel_guidance(channel: Channel) -> &'static str {
    match channel {
        Channel::Email => {
            "email: subject under 60 characters; body 60-180 words; end with one clear question."
        }
        Channel::Linkedin => {
            "linkedin: subject is the opening line; body under 300 characters; no links."
        }
    }
}

fn profile_block(profile: &LeadProfile) -> String {
    let mut lines = vec![format!("Company: {}", profile.company_name)];
    let optional = [
        ("Contact", &profile.contact_name),
        ("Title", &profile.contact_title),
        ("Website", &profile.website),
        ("Location", &profile.location),
        ("Segment", &profile.business_segment),
        ("Buying signal", &profile.signal_type),
        ("Notes", &profile.notes),
    ];
    for (label, value) in optional {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            lines.push(format!("{label}: {v}"));
        }
    }
    lines.join("\n")
}

pub(crate) fn draft_prompt(
    profile: &LeadProfile,
    research: Option<&str>,
    channels: &[Channel],
) -> String {
    let mut prompt = String::from("Lead profile:\n");
    prompt.push_str(&profile_block(profile));

    if let Some(research) = research.map(str::trim).filter(|r| !r.is_empty()) {
        prompt.push_str("\n\nResearch summary:\n");
        prompt.push_str(research);
    }

    prompt.push_str("\n\nWrite two alternative drafts for each channel below.\n");
    for channel in channels {
        prompt.push_str("- ");
        prompt.push_str(channel_guidance(*channel));
        prompt.push('\n');
    }
    prompt
}

pub(crate) fn research_prompt(profile: &LeadProfile) -> String {
    format!("Research this lead:\n{}", profile_block(profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_prompt_lists_known_fields_and_channels() {
        let profile = LeadProfile {
            company_name: "Acme".into(),
            contact_name: Some("Jane Doe".into()),
            location: Some("  ".into()),
            ..Default::default()
        };
        let prompt = draft_prompt(&profile, Some("Acme sells anvils."), &[Channel::Email]);
        assert!(prompt.contains("Company: Acme"));
        assert!(prompt.contains("Contact: Jane Doe"));
        assert!(!prompt.contains("Location"));
        assert!(prompt.contains("Acme sells anvils."));
        assert!(prompt.contains("- email:"));
        assert!(!prompt.contains("- linkedin:"));
    }

    #[test]
    fn research_prompt_includes_profile() {
        let profile = LeadProfile {
            company_name: "Globex".into(),
            ..Default::default()
        };
        assert!(research_prompt(&profile).ends_with("Company: Globex"));
    }
}
