//! Transactional email client. The `Mailer` trait is the seam tests mock;
//! `HttpMailer` is the real client for the provider's HTTP API.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::any::Any;
use std::fmt;
use tracing::{info, warn};

#[async_trait]
pub trait Mailer: Send + Sync + Any {
    /// Deliver a plain-text message, returning the provider's message id.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct HttpMailer {
    http: Client,
    base_url: Url,
    api_key: String,
    sender: String,
}

impl fmt::Debug for HttpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMailer")
            .field("base_url", &self.base_url)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl HttpMailer {
    pub fn new(base_url: &str, api_key: String, sender: String) -> Result<Self> {
        // Normalize to a trailing slash so joining "messages" appends a
        // segment instead of replacing the last one.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).context("invalid mail API base URL")?;
        Ok(Self::with_base_url(base_url, api_key, sender))
    }

    pub fn with_base_url(base_url: Url, api_key: String, sender: String) -> Self {
        let http = Client::builder()
            .user_agent("dining-concierge/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            sender,
        }
    }

    pub fn build_request(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("messages")
            .context("invalid mail API base URL")?;
        self.http
            .post(endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&build_message_form(&self.sender, recipient, subject, body))
            .build()
            .context("failed to build mail request")
    }
}

pub fn build_message_form(
    sender: &str,
    recipient: &str,
    subject: &str,
    body: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("from", sender.to_string()),
        ("to", recipient.to_string()),
        ("subject", subject.to_string()),
        ("text", body.to_string()),
    ]
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<String> {
        let request = self.build_request(recipient, subject, body)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach mail API")?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            warn!(%status, "mail API error: {}", text);
            return Err(anyhow!("mail API error {}: {}", status, text));
        }

        let payload: SendMessageResponse =
            res.json().await.context("invalid mail API response JSON")?;
        info!(message_id = %payload.id, "mail accepted by provider");
        Ok(payload.id)
    }
}

#[derive(Deserialize)]
struct SendMessageResponse {
    id: String,
}
