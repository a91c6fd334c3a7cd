//! JSON-over-HTTP client
//!
//! Sends each operation as `POST <endpoint>/<operation>` with the parameters
//! as the JSON body. Non-2xx answers become a [`ServiceError`] whose code is
//! the body's `error.code` (or `__type`), falling back to the HTTP status.

use super::{Client, ServiceError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP implementation of [`Client`]
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpClient {
    /// Create a client for `endpoint`
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint).context("Invalid service endpoint")?;
        // Url::join replaces the last segment unless the base ends with '/'
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("cloudres/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            token: None,
        })
    }

    /// Send a bearer token with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL for an operation
    pub fn operation_url(&self, operation: &str) -> Result<Url> {
        self.endpoint
            .join(&urlencoding::encode(operation))
            .context("Failed to build operation URL")
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn invoke(&self, operation: &str, params: Value) -> Result<Value> {
        let url = self.operation_url(operation)?;
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url).json(&params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(service_error(status, &body).into());
        }

        // Handle empty response
        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).context("Failed to parse response JSON")
    }
}

/// Build a [`ServiceError`] from an error response
fn service_error(status: StatusCode, body: &str) -> ServiceError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    let code = parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/code")
                .or_else(|| v.get("__type"))
                .or_else(|| v.get("code"))
        })
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| status.as_u16().to_string());

    let message = parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("API request failed: {}", status));

    ServiceError::new(code, message)
}
