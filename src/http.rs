//! HTTP backend for the policy API

use crate::backend::PolicyBackend;
use crate::model::Policy;
use crate::{ClientConfig, ProviderError, ProviderResult, TransportFailure};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

/// Source of the bearer credential attached to every request.
///
/// Token acquisition and refresh belong to the host; this crate only asks for
/// the current token right before each call.
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn bearer_token(&self) -> ProviderResult<String>;
}

/// A fixed token
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> ProviderResult<String> {
        Ok(self.0.clone())
    }
}

/// Policy API client; one attempt per call
pub struct HttpBackend {
    http_client: reqwest::Client,
    collection_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpBackend {
    /// Creates a new backend.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the configuration is invalid or the HTTP
    /// client cannot be created.
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> ProviderResult<Self> {
        let mut collection_url = config.validate()?;
        {
            let mut segments = collection_url
                .path_segments_mut()
                .map_err(|_| ProviderError::Config("base_url cannot be a base URL".into()))?;
            segments.pop_if_empty();
            for segment in config.collection_path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to create HTTP client: {e}").into()))?;

        Ok(Self {
            http_client,
            collection_url,
            tokens,
        })
    }

    /// URL of the collection
    pub fn collection_url(&self) -> &Url {
        &self.collection_url
    }

    fn policy_url(&self, id: &str) -> Url {
        let mut url = self.collection_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }
        url
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: Url,
        body: Option<&Policy>,
    ) -> ProviderResult<reqwest::Response> {
        let token = self.tokens.bearer_token().await?;
        let mut request = self
            .http_client
            .request(method.clone(), url.clone())
            .bearer_auth(token);
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(%method, %url, status = status.as_u16(), "Policy API response");

        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        Err(api_error(status, &error_body))
    }
}

/// Build an API error whose message carries both the canonical reason and the
/// server's own text, so message classification sees either.
fn api_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let reason = status.canonical_reason().unwrap_or("Unknown Status");
    let message = match body.trim() {
        "" => reason.to_owned(),
        text => format!("{reason}: {text}"),
    };
    ProviderError::api(status.as_u16(), message)
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    let kind = if e.is_timeout() {
        TransportFailure::Timeout
    } else if e.is_connect() {
        TransportFailure::Connect
    } else {
        TransportFailure::Other
    };
    ProviderError::transport(kind, e.to_string())
}

async fn decode(response: reqwest::Response) -> ProviderResult<Policy> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl PolicyBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> ProviderResult<Policy> {
        let response = self
            .send(reqwest::Method::GET, self.policy_url(id), None)
            .await?;
        decode(response).await
    }

    #[instrument(skip(self, policy), fields(name = %policy.name))]
    async fn post(&self, policy: &Policy) -> ProviderResult<Policy> {
        let response = self
            .send(reqwest::Method::POST, self.collection_url.clone(), Some(policy))
            .await?;
        decode(response).await
    }

    #[instrument(skip(self, policy))]
    async fn put(&self, id: &str, policy: &Policy) -> ProviderResult<Policy> {
        let response = self
            .send(reqwest::Method::PUT, self.policy_url(id), Some(policy))
            .await?;
        decode(response).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> ProviderResult<()> {
        self.send(reqwest::Method::DELETE, self.policy_url(id), None)
            .await?;
        Ok(())
    }
}
