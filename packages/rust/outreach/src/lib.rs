//! Outreach drafting, draft ranking, and outbound messaging.
//!
//! This crate provides:
//! - [`DraftingCapability`]: turns a lead profile into channel-specific drafts
//!   and research summaries ([`OpenRouterDrafter`] talks to OpenRouter)
//! - [`ranking`]: picks the best draft for a channel
//! - [`MessagingChannel`]: delivers one message ([`HttpMessagingChannel`])

mod messaging;
mod openrouter;
mod prompts;
pub mod ranking;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadflow_shared::{Channel, Lead, Result};
use serde::{Deserialize, Serialize};

pub use messaging::HttpMessagingChannel;
pub use openrouter::OpenRouterDrafter;
pub use ranking::{score_draft, select_best};

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// A candidate outreach message. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachDraft {
    pub channel: Channel,
    /// Email subject, or the opening line on the professional network.
    pub subject: String,
    pub body: String,
    pub generated_at: DateTime<Utc>,
}

/// The slice of a lead the drafting capability gets to see.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeadProfile {
    pub company_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LeadProfile {
    /// First token of the contact name, used for greetings and ranking.
    pub fn first_name(&self) -> Option<&str> {
        self.contact_name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
    }
}

impl From<&Lead> for LeadProfile {
    fn from(lead: &Lead) -> Self {
        Self {
            company_name: lead.company_name.clone(),
            contact_name: lead.contact_name().map(str::to_string),
            contact_title: lead.contact.contact_title.clone(),
            website: lead.contact.website.clone(),
            location: lead.contact.location.clone(),
            business_segment: lead.business_segment.clone(),
            signal_type: lead.signal_type.clone(),
            notes: lead.notes.clone(),
        }
    }
}

/// Produces outreach drafts and research summaries. Sends nothing.
#[async_trait]
pub trait DraftingCapability: Send + Sync {
    /// One or more drafts for each of `channels`.
    async fn generate(
        &self,
        profile: &LeadProfile,
        research: Option<&str>,
        channels: &[Channel],
    ) -> Result<Vec<OutreachDraft>>;

    /// A free-text research summary of the lead's company and context.
    async fn research(&self, profile: &LeadProfile) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    /// Email address or profile URL on the channel.
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Stable key; the channel may use it to drop duplicate deliveries.
    pub idempotency_key: String,
}

/// Delivery acknowledgement from the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
}

/// An outbound messaging channel.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt>;
}
