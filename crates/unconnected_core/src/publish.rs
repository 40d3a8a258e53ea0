use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::config::ToolConfig;
use crate::pacing::{FixedIntervalPacer, Pacer};

const DEFAULT_REQUEST_INTERVAL_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Bot password from WIKI_BOT_USER / WIKI_BOT_PASS.
    pub fn from_env() -> Result<Self> {
        let username = required_env("WIKI_BOT_USER")?;
        let password = required_env("WIKI_BOT_PASS")?;
        Ok(Self { username, password })
    }
}

/// Full-text overwrite of one page. Edits are always sent as minor and leave
/// the account's watchlist unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEdit {
    pub title: String,
    pub text: String,
    pub summary: String,
}

impl PageEdit {
    pub fn new(title: &str, text: &str, summary: &str) -> Self {
        Self {
            title: title.to_string(),
            text: text.to_string(),
            summary: summary.to_string(),
        }
    }
}

pub trait WikiWriteApi {
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn edit_page(&mut self, edit: &PageEdit) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub request_interval_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            api_url: config.api_url(),
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            request_interval_ms: DEFAULT_REQUEST_INTERVAL_MS,
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    pacer: FixedIntervalPacer,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;
        let pacer = FixedIntervalPacer::from_millis(config.request_interval_ms);

        Ok(Self {
            client,
            config,
            pacer,
            csrf_token: None,
        })
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;
        let pairs = api_pairs(params);

        self.pacer.wait_turn();
        let response = self
            .client
            .get(base_url)
            .header("User-Agent", self.config.user_agent.clone())
            .query(&pairs)
            .send();
        self.pacer.finish_turn();
        decode_api_response(response.context("failed to call MediaWiki API")?)
    }

    fn request_json_post(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let pairs = api_pairs(params);

        self.pacer.wait_turn();
        let response = self
            .client
            .post(&self.config.api_url)
            .header("User-Agent", self.config.user_agent.clone())
            .form(&pairs)
            .send();
        self.pacer.finish_turn();
        decode_api_response(response.context("failed to call MediaWiki API")?)
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

impl WikiWriteApi for MediaWikiClient {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json_post(&[
            ("action", "login".to_string()),
            ("lgname", username.to_string()),
            ("lgpassword", password.to_string()),
            ("lgtoken", login_token),
        ])?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.csrf_token = None;
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    fn edit_page(&mut self, edit: &PageEdit) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        let response = self.request_json_post(&edit_params(edit, token))?;
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let result = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if result.result.as_deref() != Some("Success") {
            bail!(
                "MediaWiki edit failed for {}: {}",
                edit.title,
                result.result.unwrap_or_else(|| "unknown".to_string())
            );
        }
        Ok(())
    }
}

/// Logs in, then overwrites `page_title` with `wikitext`. Nothing is written
/// when login fails.
pub fn publish_report<A: WikiWriteApi>(
    api: &mut A,
    credentials: &Credentials,
    page_title: &str,
    wikitext: &str,
    summary: &str,
) -> Result<()> {
    if page_title.trim().is_empty() {
        bail!("report page title cannot be empty");
    }
    api.login(&credentials.username, &credentials.password)
        .context("report publish login failed")?;
    api.edit_page(&PageEdit::new(page_title, wikitext, summary))
        .with_context(|| format!("failed to publish report to {page_title}"))?;
    info!(page = page_title, bytes = wikitext.len(), "published report");
    Ok(())
}

fn edit_params(edit: &PageEdit, token: String) -> Vec<(&'static str, String)> {
    vec![
        ("action", "edit".to_string()),
        ("title", edit.title.clone()),
        ("text", edit.text.clone()),
        ("summary", edit.summary.clone()),
        ("minor", "1".to_string()),
        ("watchlist", "nochange".to_string()),
        ("bot", "1".to_string()),
        ("assert", "user".to_string()),
        ("token", token),
    ]
}

fn api_pairs(params: &[(&str, String)]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len() + 2);
    pairs.push(("format".to_string(), "json".to_string()));
    pairs.push(("formatversion".to_string(), "2".to_string()));
    for (key, value) in params {
        if !value.is_empty() {
            pairs.push(((*key).to_string(), value.clone()));
        }
    }
    pairs
}

fn decode_api_response(response: reqwest::blocking::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        bail!("MediaWiki API request failed with HTTP {status}");
    }
    let payload: Value = response
        .json()
        .context("failed to decode MediaWiki API JSON response")?;
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(payload)
}

fn required_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => bail!("{key} is required for publishing"),
    }
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}
