use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const NS_MAIN: i64 = 0;
pub const NS_PROJECT: i64 = 4;
pub const NS_TEMPLATE: i64 = 10;
pub const NS_HELP: i64 = 12;
pub const NS_CATEGORY: i64 = 14;

/// Sitelink language tags that PetScan knows under a different wiki code.
static LANGUAGE_MAPPINGS: LazyLock<BTreeMap<&'static str, &'static str>> = LazyLock::new(|| {
    BTreeMap::from([("en-simple", "simple"), ("nb", "no"), ("yue", "zh-yue")])
});

/// Namespaces worth reporting, with the prefix used when building full titles.
static NAMESPACE_LABELS: LazyLock<BTreeMap<i64, &'static str>> = LazyLock::new(|| {
    BTreeMap::from([
        (NS_MAIN, ""),
        (NS_PROJECT, "Wikipedia"),
        (NS_TEMPLATE, "Template"),
        (NS_HELP, "Help"),
        (NS_CATEGORY, "Category"),
    ])
});

pub fn map_language(raw_code: &str) -> String {
    LANGUAGE_MAPPINGS
        .get(raw_code)
        .copied()
        .unwrap_or(raw_code)
        .to_string()
}

/// Label for an allow-listed namespace, `None` for everything outside the list.
pub fn namespace_label(namespace_id: i64) -> Option<&'static str> {
    NAMESPACE_LABELS.get(&namespace_id).copied()
}

pub fn is_reported_namespace(namespace_id: i64) -> bool {
    NAMESPACE_LABELS.contains_key(&namespace_id)
}

pub fn prefixed_title(namespace_id: i64, title: &str) -> String {
    match namespace_label(namespace_id) {
        Some(label) if namespace_id != NS_MAIN => format!("{label}:{title}"),
        _ => title.to_string(),
    }
}
