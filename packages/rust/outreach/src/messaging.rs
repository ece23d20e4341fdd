//! HTTP messaging channel (`POST {base}/v1/messages`).

use std::time::Duration;

use async_trait::async_trait;
use leadflow_shared::{Channel, LeadflowError, Result, endpoint_url};
use reqwest::Client;
use tracing::{info, instrument};
use url::Url;

use crate::{MessagingChannel, OutboundMessage, SendReceipt};

const USER_AGENT: &str = concat!("Leadflow/", env!("CARGO_PKG_VERSION"));

/// Delivers messages through a messaging gateway. The idempotency key is
/// forwarded as the `Idempotency-Key` header.
pub struct HttpMessagingChannel {
    channel: Channel,
    endpoint: Url,
    api_key: Option<String>,
    client: Client,
}

impl HttpMessagingChannel {
    pub fn new(
        channel: Channel,
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            channel,
            endpoint: endpoint_url(base_url, "v1/messages")?,
            api_key,
            client,
        })
    }

    fn adapter_name(&self) -> String {
        format!("messaging:{}", self.channel)
    }
}

#[async_trait]
impl MessagingChannel for HttpMessagingChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    #[instrument(skip_all, fields(channel = %self.channel, key = %message.idempotency_key))]
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("Idempotency-Key", message.idempotency_key.as_str())
            .json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LeadflowError::adapter(self.adapter_name(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadflowError::adapter(
                self.adapter_name(),
                format!("HTTP {status} from {}", self.endpoint),
            ));
        }

        let receipt: SendReceipt = response.json().await.map_err(|e| {
            LeadflowError::adapter(self.adapter_name(), format!("malformed receipt: {e}"))
        })?;
        info!(message_id = %receipt.message_id, "message accepted");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> OutboundMessage {
        OutboundMessage {
            channel: Channel::Linkedin,
            recipient: "https://linkedin.com/in/jane".into(),
            subject: "Hi Jane".into(),
            body: "Saw Acme is hiring.".into(),
            idempotency_key: "abc123".into(),
        }
    }

    fn channel(server: &MockServer) -> HttpMessagingChannel {
        HttpMessagingChannel::new(
            Channel::Linkedin,
            &server.uri(),
            Some("m-key".into()),
            Duration::from_secs(5),
        )
        .expect("build channel")
    }

    #[tokio::test]
    async fn send_forwards_idempotency_key() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("idempotency-key", "abc123"))
            .and(header("authorization", "Bearer m-key"))
            .and(body_partial_json(serde_json::json!({
                "channel": "linkedin",
                "recipient": "https://linkedin.com/in/jane"
            })))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(serde_json::json!({ "message_id": "m-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = channel(&server).send(&message()).await.expect("send");
        assert_eq!(receipt.message_id, "m-1");
    }

    #[tokio::test]
    async fn rejected_send_is_adapter_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = channel(&server).send(&message()).await.unwrap_err();
        match err {
            LeadflowError::Adapter { adapter, .. } => assert_eq!(adapter, "messaging:linkedin"),
            other => panic!("expected adapter error, got {other:?}"),
        }
    }
}
