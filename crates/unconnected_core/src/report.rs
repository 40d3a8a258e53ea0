use chrono::{DateTime, Utc};
use url::form_urlencoded::byte_serialize;

use crate::config::DEFAULT_HEADER_TEMPLATE;
use crate::records::FindingRecord;

const TABLE_HEADER: &str = "{| class=\"wikitable sortable\"
|-
! cnt !! project !! namespace !! pagetitle !! duplicity !! find in Wikidata !! new item
";
const TABLE_FOOTER: &str = "|}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub header_template: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            header_template: DEFAULT_HEADER_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub cnt: usize,
    pub language: String,
    pub namespace_label: String,
    pub display_title: String,
    pub path_escaped: String,
    pub query_escaped: String,
}

impl ReportRow {
    pub fn from_record(cnt: usize, record: &FindingRecord) -> Self {
        let display_title = record.full_title.replace('_', " ");
        Self {
            cnt,
            language: record.language.clone(),
            namespace_label: record.namespace_label.clone(),
            path_escaped: escape_path(&display_title),
            query_escaped: escape_query(&display_title),
            display_title,
        }
    }

    pub fn to_wikitext(&self) -> String {
        let Self {
            cnt,
            language,
            namespace_label,
            display_title,
            path_escaped,
            query_escaped,
        } = self;
        format!(
            "|-
| {cnt}
| {language}
| {namespace_label}
| [[:{language}:{display_title}]]
| [//wikidata-todo.toolforge.org/duplicity.php?wiki={language}wiki&norand=1&page={path_escaped} duplicity]
| [//www.wikidata.org/w/index.php?&search={query_escaped} find in Wikidata]
| [//www.wikidata.org/wiki/Special:NewItem?site={language}wiki&page={path_escaped}&label={path_escaped}&lang={language} create]
"
        )
    }
}

/// Rows numbered from 1 in record order.
pub fn report_rows(records: &[FindingRecord]) -> Vec<ReportRow> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| ReportRow::from_record(index + 1, record))
        .collect()
}

pub fn render(entity_id: &str, records: &[FindingRecord]) -> String {
    render_at(entity_id, records, &ReportOptions::default(), Utc::now())
}

pub fn render_at(
    entity_id: &str,
    records: &[FindingRecord],
    options: &ReportOptions,
    generated_at: DateTime<Utc>,
) -> String {
    let mut wikitext = format!(
        "{{{{{header}}}}}
List of all pages categorized (including subcategories) in any of the (Wikipedia) sitelinks of {{{{Q|{entity_id}}}}} that are not linked to a Wikidata item. Latest update: {updated}.
",
        header = options.header_template,
        updated = format_update_time(generated_at),
    );
    wikitext.push_str(TABLE_HEADER);
    for row in report_rows(records) {
        wikitext.push_str(&row.to_wikitext());
    }
    wikitext.push_str(TABLE_FOOTER);
    wikitext
}

pub fn format_update_time(generated_at: DateTime<Utc>) -> String {
    generated_at.format("%-d %B %Y, ~%-H:%M (UTC)").to_string()
}

/// Percent-encodes for use inside a URL path or query value; keeps unreserved
/// characters and `/`, spaces become `%20`.
pub fn escape_path(value: &str) -> String {
    normalize_unreserved(&form_encode(value))
        .replace('+', "%20")
        .replace("%2F", "/")
}

/// Form-style encoding: spaces become `+`, `/` is encoded.
pub fn escape_query(value: &str) -> String {
    normalize_unreserved(&form_encode(value))
}

fn form_encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

// The form serializer leaves `*` bare and encodes `~`; flip both to the
// RFC 3986 unreserved set.
fn normalize_unreserved(encoded: &str) -> String {
    encoded.replace('*', "%2A").replace("%7E", "~")
}
