use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};

use crate::petscan::CandidatePage;

const FIELD_SEPARATOR: char = '\t';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingRecord {
    pub language: String,
    pub namespace_label: String,
    pub full_title: String,
}

/// Truncates (or creates) the record file and stamps it with the current time.
pub fn begin_run(path: &Path) -> Result<()> {
    begin_run_at(path, unix_timestamp()?)
}

pub fn begin_run_at(path: &Path, generated_at_unix: u64) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, format!("# file generated: {generated_at_unix}\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Appends one line per page and returns the number of lines written.
pub fn append_findings(path: &Path, language: &str, pages: &[CandidatePage]) -> Result<usize> {
    if pages.is_empty() {
        return Ok(0);
    }

    let mut buffer = String::new();
    for page in pages {
        let full_title = page.full_title();
        for field in [language, page.namespace_label.as_str(), full_title.as_str()] {
            if field.contains(['\t', '\n', '\r']) {
                bail!("record field contains a tab or line break: {field:?}");
            }
        }
        buffer.push_str(&format!(
            "{language}\t{}\t{full_title}\n",
            page.namespace_label
        ));
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {} for append", path.display()))?;
    file.write_all(buffer.as_bytes())
        .with_context(|| format!("failed to append to {}", path.display()))?;
    Ok(pages.len())
}

/// Reads every data line in file order. Comment and blank lines are skipped;
/// any other line must hold exactly three tab-separated fields.
pub fn load_all(path: &Path) -> Result<Vec<FindingRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_records(&content).with_context(|| format!("invalid record file {}", path.display()))
}

pub fn parse_records(content: &str) -> Result<Vec<FindingRecord>> {
    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim_end();
        if line.trim_start().starts_with('#') || line.trim_start().is_empty() {
            continue;
        }
        let fields = line.split(FIELD_SEPARATOR).collect::<Vec<_>>();
        let [language, namespace_label, full_title] = fields.as_slice() else {
            bail!(
                "line {}: expected 3 tab-separated fields, found {}",
                index + 1,
                fields.len()
            );
        };
        records.push(FindingRecord {
            language: (*language).to_string(),
            namespace_label: (*namespace_label).to_string(),
            full_title: (*full_title).to_string(),
        });
    }
    Ok(records)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn unix_timestamp() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")
        .map(|duration| duration.as_secs())
}
