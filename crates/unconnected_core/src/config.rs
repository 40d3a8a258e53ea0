use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILENAME: &str = "unconnected.toml";
pub const DEFAULT_USER_AGENT: &str =
    "unconnected/0.2 (Wikidata bot by User:MisterSynergy; mailto:mister.synergy@yahoo.com)";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_PETSCAN_URL: &str = "https://petscan.wmflabs.org/";
pub const DEFAULT_SPARQL_URL: &str = "https://query.wikidata.org/sparql";
pub const DEFAULT_API_URL: &str = "https://www.wikidata.org/w/api.php";
pub const DEFAULT_ENTITY: &str = "Q8683464";
pub const DEFAULT_REPORT_PAGE: &str = "User:MisterSynergy/rowing/unconnected_pages";
pub const DEFAULT_RECORD_DIR: &str = "logs";
pub const DEFAULT_HEADER_TEMPLATE: &str = "User:MisterSynergy/header";
pub const DEFAULT_EDIT_SUMMARY: &str =
    "update page (weekly job via Toolforge) #msynbot #unapproved";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ToolConfig {
    #[serde(default)]
    pub task: TaskSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TaskSection {
    pub entity: Option<String>,
    pub report_page: Option<String>,
    pub record_dir: Option<String>,
    pub record_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub scan_interval_ms: Option<u64>,
    pub petscan_url: Option<String>,
    pub sparql_url: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ReportSection {
    pub header_template: Option<String>,
    pub edit_summary: Option<String>,
}

impl ToolConfig {
    pub fn entity(&self) -> String {
        self.task
            .entity
            .clone()
            .unwrap_or_else(|| DEFAULT_ENTITY.to_string())
    }

    pub fn report_page(&self) -> String {
        self.task
            .report_page
            .clone()
            .unwrap_or_else(|| DEFAULT_REPORT_PAGE.to_string())
    }

    /// Record file for `entity`: explicit `record_file` wins, otherwise
    /// `<record_dir>/unconnected_pages_<entity>.txt`.
    pub fn record_file(&self, entity: &str) -> PathBuf {
        if let Some(file) = &self.task.record_file {
            return PathBuf::from(file);
        }
        let dir = self
            .task
            .record_dir
            .as_deref()
            .unwrap_or(DEFAULT_RECORD_DIR);
        Path::new(dir).join(format!("unconnected_pages_{entity}.txt"))
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.http.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        env_override("WIKI_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.http.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn scan_interval_ms(&self) -> u64 {
        env_override("UNCONNECTED_SCAN_INTERVAL_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.http.scan_interval_ms)
            .unwrap_or(DEFAULT_SCAN_INTERVAL_MS)
    }

    pub fn petscan_url(&self) -> String {
        self.http
            .petscan_url
            .clone()
            .unwrap_or_else(|| DEFAULT_PETSCAN_URL.to_string())
    }

    pub fn sparql_url(&self) -> String {
        self.http
            .sparql_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SPARQL_URL.to_string())
    }

    /// Resolve the publishing wiki API URL: env WIKI_API_URL > config > Wikidata.
    pub fn api_url(&self) -> String {
        env_override("WIKI_API_URL")
            .or_else(|| self.http.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn header_template(&self) -> String {
        self.report
            .header_template
            .clone()
            .unwrap_or_else(|| DEFAULT_HEADER_TEMPLATE.to_string())
    }

    pub fn edit_summary(&self) -> String {
        self.report
            .edit_summary
            .clone()
            .unwrap_or_else(|| DEFAULT_EDIT_SUMMARY.to_string())
    }
}

/// Load and parse a ToolConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ToolConfig> {
    if !config_path.exists() {
        return Ok(ToolConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ToolConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
