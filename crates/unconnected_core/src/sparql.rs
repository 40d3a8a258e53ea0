use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::external::{ExternalClient, ExternalClientConfig};
use crate::language::map_language;

/// Wikidata class every category item is an instance of (transitively).
pub const CATEGORY_CLASS: &str = "Q4167836";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageCategoryLink {
    pub language: String,
    pub category_title: String,
}

pub trait SitelinkQueryApi {
    fn run_query(&mut self, query: &str) -> Result<Value>;
}

pub struct WdqsClient {
    client: ExternalClient,
    endpoint: String,
}

impl WdqsClient {
    pub fn new(config: &ExternalClientConfig, endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: ExternalClient::new(config)?,
            endpoint: endpoint.to_string(),
        })
    }
}

impl SitelinkQueryApi for WdqsClient {
    fn run_query(&mut self, query: &str) -> Result<Value> {
        let reply = self.client.post_form(
            &self.endpoint,
            &[("format", "json".to_string()), ("query", query.to_string())],
        )?;
        if !(200..300).contains(&reply.status) {
            bail!("SPARQL endpoint returned HTTP {}", reply.status);
        }
        reply.json().context("failed to decode SPARQL response")
    }
}

pub fn validate_entity_id(entity_id: &str) -> Result<()> {
    let digits = entity_id.strip_prefix('Q').unwrap_or("");
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        bail!("invalid entity id: {entity_id:?} (expected Q<digits>)");
    }
    Ok(())
}

pub fn sitelink_query(entity_id: &str) -> String {
    format!(
        "SELECT ?sitelink WHERE {{
  BIND(wd:{entity_id} AS ?item) .
  ?item wdt:P31/wdt:P279* wd:{CATEGORY_CLASS} .
  ?item ^schema:about [ schema:isPartOf/wikibase:wikiGroup 'wikipedia'; schema:name ?sitelink ] .
}}"
    )
}

/// Per-language category pages of `entity_id`, in the order the query service
/// returned them.
pub fn resolve_category_links<A: SitelinkQueryApi>(
    api: &mut A,
    entity_id: &str,
) -> Result<Vec<LanguageCategoryLink>> {
    validate_entity_id(entity_id)?;
    let payload = api
        .run_query(&sitelink_query(entity_id))
        .with_context(|| format!("sitelink query failed for {entity_id}"))?;
    let parsed: SparqlResponse =
        serde_json::from_value(payload).context("unexpected SPARQL response shape")?;

    let mut links = Vec::new();
    for binding in parsed.results.bindings {
        let Some(sitelink) = binding.sitelink else {
            warn!(entity = entity_id, "binding without sitelink value");
            continue;
        };
        let Some((_, title)) = sitelink.value.split_once(':') else {
            warn!(entity = entity_id, value = %sitelink.value, "sitelink without namespace prefix");
            continue;
        };
        let language = map_language(sitelink.lang.as_deref().unwrap_or(""));
        links.push(LanguageCategoryLink {
            language,
            category_title: title.to_string(),
        });
    }
    info!(entity = entity_id, count = links.len(), "resolved category sitelinks");
    Ok(links)
}

#[derive(Debug, Deserialize, Default)]
struct SparqlResponse {
    #[serde(default)]
    results: SparqlResults,
}

#[derive(Debug, Deserialize, Default)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<SparqlBinding>,
}

#[derive(Debug, Deserialize)]
struct SparqlBinding {
    sitelink: Option<SparqlLiteral>,
}

#[derive(Debug, Deserialize)]
struct SparqlLiteral {
    value: String,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
}
