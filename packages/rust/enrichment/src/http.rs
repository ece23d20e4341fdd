//! JSON lookup API adapter (`GET {base}/v1/enrich`).

use std::time::Duration;

use async_trait::async_trait;
use leadflow_shared::{EnrichmentFields, LeadflowError, Result, endpoint_url};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::{EnrichmentAdapter, LookupQuery};

const USER_AGENT: &str = concat!("Leadflow/", env!("CARGO_PKG_VERSION"));

/// Enrichment source reached over HTTP. A `404` means "nothing known" and
/// counts as a successful, empty lookup.
pub struct HttpEnrichmentAdapter {
    name: String,
    endpoint: Url,
    api_key: Option<String>,
    client: Client,
}

impl HttpEnrichmentAdapter {
    pub fn new(
        name: impl Into<String>,
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
            name: name.into(),
            endpoint: endpoint_url(base_url, "v1/enrich")?,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EnrichmentAdapter for HttpEnrichmentAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(source = %self.name, company = %query.company_name))]
    async fn lookup(&self, query: &LookupQuery) -> Result<EnrichmentFields> {
        let mut params: Vec<(&str, &str)> = vec![("company", query.company_name.as_str())];
        if let Some(contact) = &query.contact_name {
            params.push(("contact", contact.as_str()));
        }
        if let Some(domain) = &query.domain {
            params.push(("domain", domain.as_str()));
        }

        let mut request = self.client.get(self.endpoint.clone()).query(&params);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LeadflowError::adapter(&self.name, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("source has no record");
                Ok(EnrichmentFields::default())
            }
            status if status.is_success() => response.json().await.map_err(|e| {
                LeadflowError::adapter(&self.name, format!("malformed lookup response: {e}"))
            }),
            status => Err(LeadflowError::adapter(
                &self.name,
                format!("HTTP {status} from {}", self.endpoint),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> HttpEnrichmentAdapter {
        HttpEnrichmentAdapter::new(
            "people-data",
            &server.uri(),
            Some("k".into()),
            Duration::from_secs(5),
        )
        .expect("build adapter")
    }

    fn query() -> LookupQuery {
        LookupQuery {
            company_name: "Acme".into(),
            contact_name: Some("Jane Doe".into()),
            domain: Some("acme.io".into()),
        }
    }

    #[tokio::test]
    async fn lookup_returns_fields() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/enrich"))
            .and(query_param("company", "Acme"))
            .and(query_param("contact", "Jane Doe"))
            .and(query_param("domain", "acme.io"))
            .and(header("authorization", "Bearer k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "email": "jane@acme.io",
                "contact_title": "CTO",
                "unknown_field": 42
            })))
            .mount(&server)
            .await;

        let fields = adapter(&server).lookup(&query()).await.expect("lookup");
        assert_eq!(fields.email.as_deref(), Some("jane@acme.io"));
        assert_eq!(fields.contact_title.as_deref(), Some("CTO"));
        assert!(fields.phone.is_none());
    }

    #[tokio::test]
    async fn not_found_is_empty_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/enrich"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fields = adapter(&server).lookup(&query()).await.expect("lookup");
        assert!(fields.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_adapter_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/enrich"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = adapter(&server).lookup(&query()).await.unwrap_err();
        match err {
            LeadflowError::Adapter { adapter, message } => {
                assert_eq!(adapter, "people-data");
                assert!(message.contains("500"));
            }
            other => panic!("expected adapter error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_source_hits_client_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/enrich"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let adapter =
            HttpEnrichmentAdapter::new("slow", &server.uri(), None, Duration::from_millis(100))
                .unwrap();
        assert!(adapter.lookup(&query()).await.is_err());
    }
}
