use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::ToolConfig;

#[derive(Debug, Clone)]
pub struct ExternalClientConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl ExternalClientConfig {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
        }
    }
}

/// Status and raw body of an answered request. Callers decide what a
/// non-success status means for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body).context("failed to decode external service JSON response")
    }
}

pub struct ExternalClient {
    client: Client,
    user_agent: String,
}

impl ExternalClient {
    pub fn new(config: &ExternalClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build external HTTP client")?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    pub fn get_query(&self, url: &str, params: &[(&str, String)]) -> Result<HttpReply> {
        let url = Url::parse(url).with_context(|| format!("invalid service URL: {url}"))?;
        debug!(%url, "GET");
        let response = self
            .client
            .get(url.clone())
            .header("User-Agent", self.user_agent.clone())
            .query(params)
            .send()
            .with_context(|| format!("failed to call {url}"))?;
        read_reply(response)
    }

    pub fn post_form(&self, url: &str, params: &[(&str, String)]) -> Result<HttpReply> {
        let url = Url::parse(url).with_context(|| format!("invalid service URL: {url}"))?;
        debug!(%url, "POST");
        let response = self
            .client
            .post(url.clone())
            .header("User-Agent", self.user_agent.clone())
            .header("Accept", "application/sparql-results+json, application/json;q=0.9")
            .form(params)
            .send()
            .with_context(|| format!("failed to call {url}"))?;
        read_reply(response)
    }
}

fn read_reply(response: reqwest::blocking::Response) -> Result<HttpReply> {
    let status = response.status().as_u16();
    let body = response.text().context("failed to read response body")?;
    Ok(HttpReply { status, body })
}

#[cfg(test)]
mod tests {
    use super::HttpReply;

    #[test]
    fn only_200_counts_as_ok() {
        let reply = |status| HttpReply {
            status,
            body: String::new(),
        };
        assert!(reply(200).is_ok());
        assert!(!reply(204).is_ok());
        assert!(!reply(502).is_ok());
    }

    #[test]
    fn json_decode_failure_is_an_error() {
        let reply = HttpReply {
            status: 200,
            body: "<html>busy</html>".to_string(),
        };
        let error = reply.json().expect_err("must fail");
        assert!(error.to_string().contains("failed to decode"));

        let reply = HttpReply {
            status: 200,
            body: r#"{"ok":true}"#.to_string(),
        };
        assert_eq!(reply.json().expect("json")["ok"], true);
    }
}
