//! Core domain types for Leadflow leads and their activity history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LeadflowError;

// ---------------------------------------------------------------------------
// LeadId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for lead identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub Uuid);

impl LeadId {
    /// Generate a new time-sortable lead identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeadId {
    type Err = LeadflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| LeadflowError::validation(format!("invalid lead id '{s}': {e}")))
    }
}

// ---------------------------------------------------------------------------
// LeadStatus
// ---------------------------------------------------------------------------

/// Qualification lifecycle of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Enriched,
    Contacted,
    Qualified,
    Unqualified,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        Self::New,
        Self::Enriched,
        Self::Contacted,
        Self::Qualified,
        Self::Unqualified,
    ];

    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Enriched => "enriched",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Unqualified => "unqualified",
        }
    }

    /// Terminal states are never left by an automated stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Qualified | Self::Unqualified)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = LeadflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == needle)
            .ok_or_else(|| LeadflowError::validation(format!("unknown lead status '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Outbound messaging channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Linkedin,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Self::Email, Self::Linkedin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Linkedin => "linkedin",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = LeadflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "linkedin" => Ok(Self::Linkedin),
            other => Err(LeadflowError::validation(format!(
                "unknown channel '{other}': expected 'email' or 'linkedin'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Call outcomes
// ---------------------------------------------------------------------------

/// How a contact attempt went, from the lead's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSentiment {
    Positive,
    Neutral,
    Negative,
}

/// Result of a human or automated contact attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    PositiveReply,
    Interested,
    MeetingBooked,
    NoAnswer,
    Voicemail,
    CallbackRequested,
    NeutralReply,
    Gatekeeper,
    NotInterested,
    WrongContact,
    DoNotContact,
    Bounced,
}

impl CallOutcome {
    pub const ALL: [CallOutcome; 12] = [
        Self::PositiveReply,
        Self::Interested,
        Self::MeetingBooked,
        Self::NoAnswer,
        Self::Voicemail,
        Self::CallbackRequested,
        Self::NeutralReply,
        Self::Gatekeeper,
        Self::NotInterested,
        Self::WrongContact,
        Self::DoNotContact,
        Self::Bounced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PositiveReply => "positive_reply",
            Self::Interested => "interested",
            Self::MeetingBooked => "meeting_booked",
            Self::NoAnswer => "no_answer",
            Self::Voicemail => "voicemail",
            Self::CallbackRequested => "callback_requested",
            Self::NeutralReply => "neutral_reply",
            Self::Gatekeeper => "gatekeeper",
            Self::NotInterested => "not_interested",
            Self::WrongContact => "wrong_contact",
            Self::DoNotContact => "do_not_contact",
            Self::Bounced => "bounced",
        }
    }

    pub fn sentiment(&self) -> OutcomeSentiment {
        match self {
            Self::PositiveReply | Self::Interested | Self::MeetingBooked => {
                OutcomeSentiment::Positive
            }
            Self::NoAnswer
            | Self::Voicemail
            | Self::CallbackRequested
            | Self::NeutralReply
            | Self::Gatekeeper => OutcomeSentiment::Neutral,
            Self::NotInterested | Self::WrongContact | Self::DoNotContact | Self::Bounced => {
                OutcomeSentiment::Negative
            }
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallOutcome {
    type Err = LeadflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|o| o.as_str() == needle)
            .ok_or_else(|| LeadflowError::validation(format!("unknown call outcome '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Enrichable fields
// ---------------------------------------------------------------------------

/// Lead fields that enrichment sources may fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    ContactName,
    ContactTitle,
    Email,
    Phone,
    Website,
    LinkedinUrl,
    Location,
}

impl LeadField {
    pub const ALL: [LeadField; 7] = [
        Self::ContactName,
        Self::ContactTitle,
        Self::Email,
        Self::Phone,
        Self::Website,
        Self::LinkedinUrl,
        Self::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactName => "contact_name",
            Self::ContactTitle => "contact_title",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Website => "website",
            Self::LinkedinUrl => "linkedin_url",
            Self::Location => "location",
        }
    }
}

/// A partial set of lead fields, as returned by one enrichment source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentFields {
    pub contact_name: Option<String>,
    pub contact_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub linkedin_url: Option<String>,
    pub location: Option<String>,
}

impl EnrichmentFields {
    fn slot(&self, field: LeadField) -> &Option<String> {
        match field {
            LeadField::ContactName => &self.contact_name,
            LeadField::ContactTitle => &self.contact_title,
            LeadField::Email => &self.email,
            LeadField::Phone => &self.phone,
            LeadField::Website => &self.website,
            LeadField::LinkedinUrl => &self.linkedin_url,
            LeadField::Location => &self.location,
        }
    }

    fn slot_mut(&mut self, field: LeadField) -> &mut Option<String> {
        match field {
            LeadField::ContactName => &mut self.contact_name,
            LeadField::ContactTitle => &mut self.contact_title,
            LeadField::Email => &mut self.email,
            LeadField::Phone => &mut self.phone,
            LeadField::Website => &mut self.website,
            LeadField::LinkedinUrl => &mut self.linkedin_url,
            LeadField::Location => &mut self.location,
        }
    }

    /// The field's value, treating blank strings as absent.
    pub fn get(&self, field: LeadField) -> Option<&str> {
        self.slot(field)
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, field: LeadField, value: Option<String>) {
        *self.slot_mut(field) = value;
    }

    /// Number of non-blank fields.
    pub fn populated(&self) -> usize {
        LeadField::ALL
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.populated() == 0
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A prospective contact and the company they represent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Stable identifier, never changed after creation.
    pub id: LeadId,
    pub company_name: String,
    /// Contact and profile fields filled by discovery and enrichment.
    #[serde(flatten)]
    pub contact: EnrichmentFields,
    pub status: LeadStatus,
    /// Qualification score in `0..=100`, recomputed by pipeline stages.
    pub score: u8,
    /// Orthogonal marker derived from the score.
    pub is_hot: bool,
    /// Name of the signal source that produced this lead.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Business profile the lead was discovered for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_segment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_summary: Option<String>,
    /// Normalized identity used to prevent duplicate leads.
    pub dedup_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// A fresh lead in status `New`.
    pub fn new(
        company_name: impl Into<String>,
        source: impl Into<String>,
        dedup_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: LeadId::new(),
            company_name: company_name.into(),
            contact: EnrichmentFields::default(),
            status: LeadStatus::New,
            score: 0,
            is_hot: false,
            source: source.into(),
            signal_type: None,
            notes: None,
            business_segment: None,
            research_summary: None,
            dedup_key: dedup_key.into(),
            last_contacted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Address on the given channel, if the lead has one.
    pub fn identity_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.contact.get(LeadField::Email),
            Channel::Linkedin => self.contact.get(LeadField::LinkedinUrl),
        }
    }

    /// Channels this lead can be reached on.
    pub fn reachable_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.identity_for(*c).is_some())
            .collect()
    }

    pub fn contact_name(&self) -> Option<&str> {
        self.contact.get(LeadField::ContactName)
    }

    /// Host part of the website, without a leading `www.`.
    pub fn domain(&self) -> Option<String> {
        self.contact.get(LeadField::Website).and_then(website_domain)
    }
}

/// Extract a bare host from a website value that may lack a scheme.
pub fn website_domain(website: &str) -> Option<String> {
    let trimmed = website.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = url::Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

/// Kind of activity attached to a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Note,
    Call,
    Email,
    StatusChange,
    OutreachSent,
    Enrichment,
}

impl ActivityType {
    pub const ALL: [ActivityType; 6] = [
        Self::Note,
        Self::Call,
        Self::Email,
        Self::StatusChange,
        Self::OutreachSent,
        Self::Enrichment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Call => "call",
            Self::Email => "email",
            Self::StatusChange => "status_change",
            Self::OutreachSent => "outreach_sent",
            Self::Enrichment => "enrichment",
        }
    }
}

impl FromStr for ActivityType {
    type Err = LeadflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LeadflowError::validation(format!("unknown activity type '{s}'")))
    }
}

/// Who caused an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Automation,
    User,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automation => "automation",
            Self::User => "user",
        }
    }
}

impl FromStr for Actor {
    type Err = LeadflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "automation" => Ok(Self::Automation),
            "user" => Ok(Self::User),
            other => Err(LeadflowError::validation(format!("unknown actor '{other}'"))),
        }
    }
}

/// A persisted, append-only event on a lead's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadActivity {
    pub id: String,
    pub lead_id: LeadId,
    pub activity_type: ActivityType,
    pub actor: Actor,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CallOutcome>,
    /// Idempotency key or external reference (outreach sends).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An activity about to be appended; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub activity_type: ActivityType,
    pub actor: Actor,
    pub content: String,
    pub outcome: Option<CallOutcome>,
    pub reference: Option<String>,
}

impl NewActivity {
    pub fn new(activity_type: ActivityType, actor: Actor, content: impl Into<String>) -> Self {
        Self {
            activity_type,
            actor,
            content: content.into(),
            outcome: None,
            reference: None,
        }
    }

    pub fn with_outcome(mut self, outcome: CallOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Business profiles
// ---------------------------------------------------------------------------

/// A target business profile that discovery searches for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessProfile {
    /// Segment name recorded on discovered leads.
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub industries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    /// Contact titles worth reaching out to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub titles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_id_roundtrip() {
        let id = LeadId::new();
        let parsed: LeadId = id.to_string().parse().expect("parse LeadId");
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<LeadId>().is_err());
    }

    #[test]
    fn status_parse_and_terminal() {
        assert_eq!("Contacted".parse::<LeadStatus>().unwrap(), LeadStatus::Contacted);
        assert!("hot".parse::<LeadStatus>().is_err());
        assert!(LeadStatus::Unqualified.is_terminal());
        assert!(!LeadStatus::Contacted.is_terminal());
    }

    #[test]
    fn outcome_parse_accepts_dashes() {
        assert_eq!(
            "positive-reply".parse::<CallOutcome>().unwrap(),
            CallOutcome::PositiveReply
        );
        assert_eq!(CallOutcome::NoAnswer.sentiment(), OutcomeSentiment::Neutral);
        assert_eq!(CallOutcome::Bounced.sentiment(), OutcomeSentiment::Negative);
    }

    #[test]
    fn enrichment_fields_treat_blank_as_absent() {
        let mut fields = EnrichmentFields::default();
        fields.set(LeadField::Email, Some("   ".into()));
        assert!(fields.get(LeadField::Email).is_none());
        assert!(fields.is_empty());

        fields.set(LeadField::Phone, Some("+1 555 0100".into()));
        assert_eq!(fields.populated(), 1);
    }

    #[test]
    fn reachable_channels_follow_contact_fields() {
        let mut lead = Lead::new("Acme", "test", "acme|");
        assert!(lead.reachable_channels().is_empty());

        lead.contact.linkedin_url = Some("https://linkedin.com/in/jane".into());
        assert_eq!(lead.reachable_channels(), vec![Channel::Linkedin]);

        lead.contact.email = Some("jane@acme.io".into());
        assert_eq!(lead.identity_for(Channel::Email), Some("jane@acme.io"));
        assert_eq!(lead.reachable_channels().len(), 2);
    }

    #[test]
    fn website_domain_strips_www_and_scheme() {
        assert_eq!(website_domain("https://www.Acme.io/about").as_deref(), Some("acme.io"));
        assert_eq!(website_domain("acme.io").as_deref(), Some("acme.io"));
        assert_eq!(website_domain(""), None);
    }

    #[test]
    fn lead_serializes_flattened_contact() {
        let mut lead = Lead::new("Acme", "test", "acme|jane");
        lead.contact.contact_name = Some("Jane Doe".into());
        let json = serde_json::to_value(&lead).expect("serialize");
        assert_eq!(json["contact_name"], "Jane Doe");
        assert_eq!(json["status"], "new");

        let parsed: Lead = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, lead);
    }
}
