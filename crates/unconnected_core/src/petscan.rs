use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::external::{ExternalClient, ExternalClientConfig, HttpReply};
use crate::language::{is_reported_namespace, namespace_label, prefixed_title};

/// Subcategory nesting bound passed to PetScan.
pub const SCAN_DEPTH: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePage {
    pub namespace_id: i64,
    pub namespace_label: String,
    pub title: String,
}

impl CandidatePage {
    pub fn full_title(&self) -> String {
        prefixed_title(self.namespace_id, &self.title)
    }
}

/// Result of scanning one language. Only `Found` contributes records; the
/// other variants are per-language soft failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(Vec<CandidatePage>),
    ServiceUnavailable { status: u16 },
    MalformedResponse { reason: String },
}

pub trait CategoryScanApi {
    fn fetch_unconnected(&mut self, language: &str, category: &str) -> Result<HttpReply>;
}

pub struct PetscanClient {
    client: ExternalClient,
    endpoint: String,
}

impl PetscanClient {
    pub fn new(config: &ExternalClientConfig, endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: ExternalClient::new(config)?,
            endpoint: endpoint.to_string(),
        })
    }
}

impl CategoryScanApi for PetscanClient {
    fn fetch_unconnected(&mut self, language: &str, category: &str) -> Result<HttpReply> {
        self.client
            .get_query(&self.endpoint, &scan_params(language, category))
    }
}

pub fn scan_params(language: &str, category: &str) -> Vec<(&'static str, String)> {
    vec![
        ("language", language.to_string()),
        ("project", "wikipedia".to_string()),
        ("categories", category.to_string()),
        ("depth", SCAN_DEPTH.to_string()),
        ("wikidata_item", "without".to_string()),
        ("show_redirects", "no".to_string()),
        ("format", "json".to_string()),
        ("doit", "1".to_string()),
    ]
}

pub fn scan_unconnected<A: CategoryScanApi>(
    api: &mut A,
    language: &str,
    category: &str,
) -> Result<ScanOutcome> {
    let reply = api
        .fetch_unconnected(language, category)
        .with_context(|| format!("PetScan request failed for {language}:{category}"))?;
    let outcome = interpret_reply(&reply)
        .with_context(|| format!("PetScan returned unreadable data for {language}:{category}"))?;
    match &outcome {
        ScanOutcome::Found(pages) => {
            debug!(language, category, pages = pages.len(), "scan finished");
        }
        ScanOutcome::ServiceUnavailable { status } => {
            warn!(language, category, status, "PetScan unavailable, skipping language");
        }
        ScanOutcome::MalformedResponse { reason } => {
            warn!(
                language,
                category,
                reason = %reason,
                "PetScan payload malformed, skipping language"
            );
        }
    }
    Ok(outcome)
}

/// Status gate, payload marker check, then entry filtering. Undecodable JSON is
/// an error, not a soft failure.
pub fn interpret_reply(reply: &HttpReply) -> Result<ScanOutcome> {
    if !reply.is_ok() {
        return Ok(ScanOutcome::ServiceUnavailable {
            status: reply.status,
        });
    }
    let payload = reply.json()?;
    Ok(interpret_payload(&payload))
}

pub fn interpret_payload(payload: &Value) -> ScanOutcome {
    let Some(segments) = payload.get("*") else {
        return ScanOutcome::MalformedResponse {
            reason: "missing '*' payload marker".to_string(),
        };
    };
    let Some(first) = segments.as_array().and_then(|segments| segments.first()) else {
        return ScanOutcome::MalformedResponse {
            reason: "'*' holds no result segment".to_string(),
        };
    };
    let entries = first
        .get("a")
        .and_then(|value| value.get("*"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    ScanOutcome::Found(entries.iter().filter_map(candidate_from_entry).collect())
}

fn candidate_from_entry(entry: &Value) -> Option<CandidatePage> {
    if entry.get("q").is_some() {
        return None;
    }
    let namespace_id = entry.get("namespace").and_then(Value::as_i64)?;
    if !is_reported_namespace(namespace_id) {
        return None;
    }
    let title = entry.get("title").and_then(Value::as_str)?;
    Some(CandidatePage {
        namespace_id,
        namespace_label: namespace_label(namespace_id)?.to_string(),
        title: title.to_string(),
    })
}
