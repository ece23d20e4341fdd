//! OpenRouter chat-completions client implementing [`DraftingCapability`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use leadflow_shared::{Channel, LeadflowError, Result, endpoint_url};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::prompts::{DRAFT_SYSTEM_PROMPT, RESEARCH_SYSTEM_PROMPT, draft_prompt, research_prompt};
use crate::{DraftingCapability, LeadProfile, OutreachDraft};

const USER_AGENT: &str = concat!("Leadflow/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawDraft {
    channel: String,
    #[serde(default)]
    subject: String,
    body: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Drafting capability backed by an OpenRouter-compatible chat API.
pub struct OpenRouterDrafter {
    endpoint: Url,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenRouterDrafter {
    pub fn new(base_url: &str, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint_url(base_url, "chat/completions")?,
            api_key,
            model,
            client,
        })
    }

    /// Run one chat completion and return the assistant text.
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LeadflowError::GenerationFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadflowError::GenerationFailed(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LeadflowError::GenerationFailed(format!("malformed response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LeadflowError::GenerationFailed("model returned no content".into()));
        }
        debug!(chars = text.len(), model = %self.model, "completion received");
        Ok(text)
    }
}

#[async_trait]
impl DraftingCapability for OpenRouterDrafter {
    #[instrument(skip_all, fields(company = %profile.company_name, channels = channels.len()))]
    async fn generate(
        &self,
        profile: &LeadProfile,
        research: Option<&str>,
        channels: &[Channel],
    ) -> Result<Vec<OutreachDraft>> {
        let text = self
            .complete(DRAFT_SYSTEM_PROMPT, &draft_prompt(profile, research, channels), 0.7)
            .await?;
        let drafts = parse_drafts(&text, channels)?;
        info!(drafts = drafts.len(), "drafts generated");
        Ok(drafts)
    }

    #[instrument(skip_all, fields(company = %profile.company_name))]
    async fn research(&self, profile: &LeadProfile) -> Result<String> {
        self.complete(RESEARCH_SYSTEM_PROMPT, &research_prompt(profile), 0.3)
            .await
    }
}

/// Parse the model's JSON array into drafts for the requested channels.
///
/// Tolerates code fences and prose around the array. Drafts for channels
/// that were not requested, or with an empty body, are dropped.
fn parse_drafts(text: &str, channels: &[Channel]) -> Result<Vec<OutreachDraft>> {
    let start = text.find('[');
    let end = text.rfind(']');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => {
            return Err(LeadflowError::GenerationFailed(
                "response did not contain a JSON array".into(),
            ));
        }
    };

    let raw: Vec<RawDraft> = serde_json::from_str(json)
        .map_err(|e| LeadflowError::GenerationFailed(format!("invalid draft JSON: {e}")))?;

    let generated_at = Utc::now();
    let mut drafts = Vec::new();
    for item in raw {
        let channel = match item.channel.parse::<Channel>() {
            Ok(c) if channels.contains(&c) => c,
            _ => {
                warn!(channel = %item.channel, "dropping draft for unrequested channel");
                continue;
            }
        };
        if item.body.trim().is_empty() {
            continue;
        }
        drafts.push(OutreachDraft {
            channel,
            subject: item.subject.trim().to_string(),
            body: item.body.trim().to_string(),
            generated_at,
        });
    }

    if drafts.is_empty() {
        return Err(LeadflowError::GenerationFailed(
            "no usable drafts in response".into(),
        ));
    }
    Ok(drafts)
}
