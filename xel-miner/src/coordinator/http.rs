//! HTTP transport to a coordinator node.
//!
//! Every call is a POST to `{url}?requestType=<type>` with the remaining
//! fields form-encoded in the body. Signed requests carry the account's
//! secret phrase, which never appears in logs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{CoordinatorError, Request, Transport};
use crate::tracing::prelude::*;

/// Request timeout for long-poll calls, which the coordinator may hold open.
pub const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for [`HttpTransport`].
#[derive(Clone)]
pub struct HttpConfig {
    /// Base endpoint, already normalized (scheme and `/nxt` path present).
    pub url: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub secret_phrase: String,
    /// Timeout for every call except long-poll.
    pub timeout: Duration,
}

impl std::fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

pub struct HttpTransport {
    http: Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, CoordinatorError> {
        let http = Client::builder()
            .user_agent(concat!("xel-miner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    fn timeout_for(&self, request: &Request) -> Duration {
        match request {
            Request::LongPoll => LONG_POLL_TIMEOUT,
            _ => self.config.timeout,
        }
    }

    fn body(&self, request: &Request) -> Vec<(&'static str, String)> {
        let mut form = request.form();
        if request.is_signed() {
            form.push(("secretPhrase", self.config.secret_phrase.clone()));
        }
        form
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: &Request) -> Result<Value, CoordinatorError> {
        trace!(url = %self.config.url, request = %request.describe(), "Coordinator call");

        let mut builder = self
            .http
            .post(&self.config.url)
            .query(&[("requestType", request.request_type())])
            .form(&self.body(request))
            .timeout(self.timeout_for(request));

        if let Some(user) = &self.config.user {
            builder = builder.basic_auth(user, self.config.pass.as_ref());
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(CoordinatorError::Http {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        trace!(request = request.request_type(), body = %text, "Coordinator reply");
        Ok(serde_json::from_str(&text)?)
    }
}
