//! Backend API client: search, classify and reply generation.
//!
//! The three endpoints share one origin. `MailApi` is the seam the session
//! and enrichment pipeline talk to; `HttpMailApi` is the reqwest-backed
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::model::{Email, SearchFilters};

pub const SEARCH_PATH: &str = "/api/search";
pub const CLASSIFY_PATH: &str = "/classify";
pub const GENERATE_REPLY_PATH: &str = "/generate-reply";

/// Body for both `/classify` and `/generate-reply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTextRequest {
    #[serde(rename = "emailText")]
    pub email_text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifyResponse {
    #[serde(default)]
    pub classification: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyResponse {
    #[serde(default)]
    pub reply: Option<String>,
}

/// Remote mail backend.
///
/// `classify` and `generate_reply` return the raw payload value (possibly
/// empty); fallback strings are applied by the enrichment pipeline.
#[async_trait]
pub trait MailApi: Send + Sync {
    /// Search emails matching the non-empty filters.
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Email>, ApiError>;

    /// Classify an email by its text. `None` when the backend returned no label.
    async fn classify(&self, email_text: &str) -> Result<Option<String>, ApiError>;

    /// Generate a suggested reply. `None` when the backend returned no reply.
    async fn generate_reply(&self, email_text: &str) -> Result<Option<String>, ApiError>;
}

/// reqwest-backed client for the mail backend.
pub struct HttpMailApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMailApi {
    /// Create a client against `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| ApiError::Request {
            endpoint: String::new(),
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_email_text<T>(&self, path: &str, email_text: &str) -> Result<T, ApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let body = EmailTextRequest {
            email_text: email_text.to_string(),
        };
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(path, e))?;

        decode(path, resp).await
    }
}

#[async_trait]
impl MailApi for HttpMailApi {
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Email>, ApiError> {
        let resp = self
            .client
            .get(self.url(SEARCH_PATH))
            .query(&filters.query_pairs())
            .send()
            .await
            .map_err(|e| request_error(SEARCH_PATH, e))?;

        let emails: Vec<Email> = decode(SEARCH_PATH, resp).await?;
        tracing::debug!(count = emails.len(), "Search returned emails");
        Ok(emails)
    }

    async fn classify(&self, email_text: &str) -> Result<Option<String>, ApiError> {
        let resp: ClassifyResponse = self.post_email_text(CLASSIFY_PATH, email_text).await?;
        Ok(resp.classification)
    }

    async fn generate_reply(&self, email_text: &str) -> Result<Option<String>, ApiError> {
        let resp: ReplyResponse = self
            .post_email_text(GENERATE_REPLY_PATH, email_text)
            .await?;
        Ok(resp.reply)
    }
}

fn request_error(endpoint: &str, e: reqwest::Error) -> ApiError {
    ApiError::Request {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    }
}

/// Turn a response into `T`, mapping non-success statuses to `ApiError::Status`.
async fn decode<T>(endpoint: &str, resp: reqwest::Response) -> Result<T, ApiError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp.bytes().await.map_err(|e| request_error(endpoint, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_text_request_uses_camel_case_key() {
        let body = EmailTextRequest {
            email_text: "Lunch?".into(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "emailText": "Lunch?" })
        );
    }

    #[test]
    fn responses_tolerate_missing_fields() {
        let c: ClassifyResponse = serde_json::from_str("{}").unwrap();
        assert!(c.classification.is_none());
        let r: ReplyResponse = serde_json::from_str(r#"{"reply":"ok","model":"x"}"#).unwrap();
        assert_eq!(r.reply.as_deref(), Some("ok"));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let api = HttpMailApi::new("http://localhost:3000/", None).unwrap();
        assert_eq!(api.base_url(), "http://localhost:3000");
        assert_eq!(api.url(CLASSIFY_PATH), "http://localhost:3000/classify");
    }
}
