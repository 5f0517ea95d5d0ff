use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::RepositoryError;
use super::repository::CategoryRepository;
use super::types::{CategoryId, CategoryNode};
use crate::util::validate_base_url;

/// Cap on a single response body. Category lists are small; anything near
/// this size is a misbehaving server.
const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024; // 4MB

/// Connection settings for [`HttpCategoryRepository`].
pub struct HttpSettings {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
    /// Retries for idempotent reads. Mutations are never retried.
    pub max_retries: u32,
    /// Base delay of the exponential backoff between retries.
    pub retry_backoff: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            token: None,
            timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Responses are either the bare payload or wrapped as `{"data": ...}`
/// by the storefront API wrapper.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(inner) => inner,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    name: &'a str,
    parent_id: Option<CategoryId>,
}

#[derive(Serialize)]
struct RenameBody<'a> {
    name: &'a str,
}

/// REST implementation of [`CategoryRepository`].
pub struct HttpCategoryRepository {
    client: reqwest::Client,
    base: String,
    settings: HttpSettings,
}

impl HttpCategoryRepository {
    /// Build a client for `settings.base_url`.
    ///
    /// HTTPS is required unless the host is a loopback address, so a bearer
    /// token is never sent in clear text over the network.
    pub fn new(settings: HttpSettings) -> Result<Self, RepositoryError> {
        let parsed = validate_base_url(&settings.base_url).map_err(|e| match e {
            crate::util::BaseUrlError::Insecure => RepositoryError::InsecureBaseUrl,
            other => RepositoryError::InvalidBaseUrl(other.to_string()),
        })?;
        if parsed.scheme() == "http" {
            tracing::warn!(base_url = %parsed, "Using plain HTTP API base URL (loopback only)");
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("category-tree/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RepositoryError::Network)?;

        let base = parsed.as_str().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base,
            settings,
        })
    }

    fn children_url(&self, parent: Option<CategoryId>) -> String {
        match parent {
            None => format!("{}/categories/roots", self.base),
            Some(id) => format!("{}/categories/{}/children", self.base, id),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Run one request to completion, body included, under the configured
    /// timeout. A server that sends headers and then stalls still times out.
    async fn exchange(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, RepositoryError> {
        let timeout = self.settings.timeout;
        tokio::time::timeout(timeout, self.exchange_untimed(request))
            .await
            .map_err(|_| RepositoryError::Timeout(timeout.as_secs()))?
    }

    async fn exchange_untimed(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, RepositoryError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(RepositoryError::Network)?;

        let status = response.status();
        if status.is_success() {
            return read_limited(response, MAX_RESPONSE_SIZE).await;
        }

        // Best effort: surface the server's own message if it sent one.
        let message = read_limited(response, MAX_RESPONSE_SIZE)
            .await
            .ok()
            .and_then(|body| serde_json::from_slice::<ErrorBody>(&body).ok())
            .map(|b| b.message);
        Err(RepositoryError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RepositoryError> {
        let body = self.exchange(request).await?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)?;
        Ok(envelope.into_inner())
    }

    /// GET with retry and exponential backoff for transient failures.
    async fn get_with_retry<T: DeserializeOwned>(&self, url: &str) -> Result<T, RepositoryError> {
        let mut attempt = 0;
        loop {
            match self.send_json(self.client.get(url)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    let delay = self.settings.retry_backoff * (1u32 << attempt.min(6));
                    tracing::debug!(
                        error = %e,
                        url,
                        retry = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying category request after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl CategoryRepository for HttpCategoryRepository {
    async fn list_children(
        &self,
        parent: Option<CategoryId>,
    ) -> Result<Vec<CategoryNode>, RepositoryError> {
        let url = self.children_url(parent);
        let nodes: Vec<CategoryNode> = self.get_with_retry(&url).await?;
        tracing::debug!(parent = ?parent, count = nodes.len(), "Listed child categories");
        Ok(nodes)
    }

    async fn create(
        &self,
        name: &str,
        parent: Option<CategoryId>,
    ) -> Result<CategoryNode, RepositoryError> {
        let url = format!("{}/categories", self.base);
        let body = CreateBody {
            name,
            parent_id: parent,
        };
        self.send_json(self.client.post(&url).json(&body)).await
    }

    async fn rename(&self, id: CategoryId, name: &str) -> Result<CategoryNode, RepositoryError> {
        let url = format!("{}/categories/{}", self.base, id);
        self.send_json(self.client.put(&url).json(&RenameBody { name }))
            .await
    }

    async fn delete(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let url = format!("{}/categories/{}", self.base, id);
        match self.exchange(self.client.delete(&url)).await {
            Ok(_) => Ok(()),
            Err(RepositoryError::Server { status: 404, .. }) => Err(RepositoryError::NotFound(id)),
            Err(e) => Err(e),
        }
    }
}

/// Read a response body, refusing anything larger than `limit` bytes.
async fn read_limited(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, RepositoryError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(RepositoryError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(RepositoryError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(RepositoryError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
