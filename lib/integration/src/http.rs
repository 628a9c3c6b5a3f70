//! Authenticated JSON requests against a vendor API.

use crate::error::{AdapterResult, ErrorKind, StandardError};
use crate::retry::RetryExecutor;
use crate::token::TokenLifecycle;
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

/// One vendor API call.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<Value>,
}

impl ApiRequest {
    pub(crate) fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub(crate) fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub(crate) fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub(crate) fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// HTTP client bound to one vendor's token lifecycle.
#[derive(Debug)]
pub(crate) struct VendorClient {
    http: reqwest::Client,
    tokens: TokenLifecycle,
}

impl VendorClient {
    pub(crate) fn new(tokens: TokenLifecycle) -> AdapterResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StandardError::config(format!("HTTP client error: {e}")))?;
        Ok(Self { http, tokens })
    }

    pub(crate) fn tokens(&self) -> &TokenLifecycle {
        &self.tokens
    }

    /// Sends `request` with a bearer token, re-authenticating once on a 401.
    /// Returns `None` for an empty response body.
    pub(crate) async fn send(&self, request: ApiRequest) -> AdapterResult<Option<Value>> {
        RetryExecutor::new(&self.tokens)
            .execute_with_retry(|token| self.send_once(&request, token))
            .await
    }

    /// [`send`](Self::send), requiring a body.
    pub(crate) async fn send_json(&self, request: ApiRequest) -> AdapterResult<Value> {
        let url = request.url.clone();
        self.send(request).await?.ok_or_else(|| {
            StandardError::new(ErrorKind::Http, format!("empty response body from {url}"))
        })
    }

    async fn send_once(&self, request: &ApiRequest, token: String) -> AdapterResult<Option<Value>> {
        let url = if request.query.is_empty() {
            Url::parse(&request.url)
        } else {
            Url::parse_with_params(&request.url, &request.query)
        }
        .map_err(|e| StandardError::config(format!("invalid URL '{}': {e}", request.url)))?;

        debug!(method = %request.method, url = %url, "sending vendor request");
        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .bearer_auth(token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| StandardError::network(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StandardError::network(format!("reading response from {url} failed: {e}")))?;
        debug!(status = %status, url = %url, "received vendor response");

        if !status.is_success() {
            let details = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            let message = vendor_message(&details)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(StandardError::http(status.as_u16(), message).with_details(details));
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text).map(Some).map_err(|e| {
            StandardError::new(ErrorKind::Http, format!("unreadable response from {url}: {e}"))
        })
    }
}

/// Extracts the vendor's error message from an error body: either the
/// object's `message` or the first element's `message` for list-shaped
/// bodies.
fn vendor_message(details: &Value) -> Option<String> {
    let message = match details {
        Value::Array(items) => items.first()?.get("message")?,
        Value::Object(object) => object.get("message")?,
        Value::String(text) if !text.trim().is_empty() => return Some(text.trim().to_string()),
        _ => return None,
    };
    message.as_str().map(str::to_string)
}

/// Rejects identifiers that would change the shape of a request path.
pub(crate) fn path_segment<'a>(what: &str, value: &'a str) -> AdapterResult<&'a str> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && value != "."
        && value != "..";
    if valid {
        Ok(value)
    } else {
        Err(StandardError::validation(format!("invalid {what} '{value}'")))
    }
}
