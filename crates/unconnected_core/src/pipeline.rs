use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::pacing::Pacer;
use crate::petscan::{CategoryScanApi, ScanOutcome, scan_unconnected};
use crate::publish::{Credentials, WikiWriteApi, publish_report};
use crate::records::{append_findings, begin_run, load_all};
use crate::report::{ReportOptions, render_at};
use crate::sparql::{SitelinkQueryApi, resolve_category_links, validate_entity_id};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewReport {
    pub entity: String,
    pub languages: usize,
    pub scanned: usize,
    pub unavailable: Vec<String>,
    pub malformed: Vec<String>,
    pub findings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    pub entity: String,
    pub report_page: String,
    pub edit_summary: String,
    pub report: ReportOptions,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub renew: RenewReport,
    pub wikitext: String,
    pub published: bool,
}

/// Rebuilds the record file for `entity_id` from scratch.
///
/// The entity id is checked first; the file is then truncated before the
/// graph query runs. Languages whose scan fails softly contribute no rows and
/// are listed in the returned report. The pacer gap is measured from the end
/// of each scan.
pub fn renew_records<Q, S, P>(
    resolver: &mut Q,
    scanner: &mut S,
    pacer: &mut P,
    entity_id: &str,
    record_path: &Path,
) -> Result<RenewReport>
where
    Q: SitelinkQueryApi,
    S: CategoryScanApi,
    P: Pacer,
{
    validate_entity_id(entity_id)?;
    begin_run(record_path)?;
    let links = resolve_category_links(resolver, entity_id)?;

    let mut report = RenewReport {
        entity: entity_id.to_string(),
        languages: links.len(),
        ..RenewReport::default()
    };
    for link in &links {
        pacer.wait_turn();
        let outcome = scan_unconnected(scanner, &link.language, &link.category_title);
        pacer.finish_turn();
        match outcome? {
            ScanOutcome::Found(pages) => {
                report.scanned += 1;
                report.findings += append_findings(record_path, &link.language, &pages)?;
            }
            ScanOutcome::ServiceUnavailable { .. } => {
                report.unavailable.push(link.language.clone());
            }
            ScanOutcome::MalformedResponse { .. } => {
                report.malformed.push(link.language.clone());
            }
        }
    }

    info!(
        entity = entity_id,
        languages = report.languages,
        findings = report.findings,
        skipped = report.unavailable.len() + report.malformed.len(),
        "record file renewed"
    );
    Ok(report)
}

pub fn render_records(
    entity_id: &str,
    record_path: &Path,
    options: &ReportOptions,
) -> Result<String> {
    let records = load_all(record_path)?;
    Ok(render_at(entity_id, &records, options, chrono::Utc::now()))
}

/// Scan, render, publish. Any hard failure aborts before the wiki is touched.
pub fn run_task<Q, S, P, W>(
    resolver: &mut Q,
    scanner: &mut S,
    pacer: &mut P,
    publisher: Option<(&mut W, &Credentials)>,
    options: &TaskOptions,
    record_path: &Path,
) -> Result<TaskReport>
where
    Q: SitelinkQueryApi,
    S: CategoryScanApi,
    P: Pacer,
    W: WikiWriteApi,
{
    let renew = renew_records(resolver, scanner, pacer, &options.entity, record_path)?;
    let wikitext = render_records(&options.entity, record_path, &options.report)?;

    let published = match publisher {
        Some((api, credentials)) if !options.dry_run => {
            publish_report(
                api,
                credentials,
                &options.report_page,
                &wikitext,
                &options.edit_summary,
            )?;
            true
        }
        _ => false,
    };

    Ok(TaskReport {
        renew,
        wikitext,
        published,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::time::Duration;

    use anyhow::bail;
    use serde_json::{Value, json};
    use tempfile::tempdir;

    use super::{TaskOptions, renew_records, run_task};
    use crate::external::HttpReply;
    use crate::pacing::FixedIntervalPacer;
    use crate::pacing::testing::FakeClock;
    use crate::petscan::CategoryScanApi;
    use crate::publish::Credentials;
    use crate::publish::testing::MockWikiApi;
    use crate::records::load_all;
    use crate::report::ReportOptions;
    use crate::sparql::SitelinkQueryApi;

    struct MockResolver {
        sitelinks: Vec<(String, String)>,
        fail: bool,
    }

    impl MockResolver {
        fn with(sitelinks: &[(&str, &str)]) -> Self {
            Self {
                sitelinks: sitelinks
                    .iter()
                    .map(|(value, lang)| (value.to_string(), lang.to_string()))
                    .collect(),
                fail: false,
            }
        }
    }

    impl SitelinkQueryApi for MockResolver {
        fn run_query(&mut self, _query: &str) -> anyhow::Result<Value> {
            if self.fail {
                bail!("query service timeout");
            }
            let bindings = self
                .sitelinks
                .iter()
                .map(|(value, lang)| json!({"sitelink": {"value": value, "xml:lang": lang}}))
                .collect::<Vec<_>>();
            Ok(json!({"results": {"bindings": bindings}}))
        }
    }

    #[derive(Default)]
    struct MockScanner {
        replies: BTreeMap<String, HttpReply>,
        calls: Vec<(String, String)>,
    }

    impl MockScanner {
        fn reply(mut self, language: &str, status: u16, body: Value) -> Self {
            self.replies.insert(
                language.to_string(),
                HttpReply {
                    status,
                    body: body.to_string(),
                },
            );
            self
        }
    }

    impl CategoryScanApi for MockScanner {
        fn fetch_unconnected(
            &mut self,
            language: &str,
            category: &str,
        ) -> anyhow::Result<HttpReply> {
            self.calls.push((language.to_string(), category.to_string()));
            match self.replies.get(language) {
                Some(reply) => Ok(reply.clone()),
                None => bail!("no reply configured for {language}"),
            }
        }
    }

    /// Scanner whose every call takes `delay` on the fake clock.
    struct SlowScanner<'a> {
        inner: MockScanner,
        clock: &'a FakeClock,
        delay: Duration,
    }

    impl CategoryScanApi for SlowScanner<'_> {
        fn fetch_unconnected(
            &mut self,
            language: &str,
            category: &str,
        ) -> anyhow::Result<HttpReply> {
            self.clock.advance(self.delay);
            self.inner.fetch_unconnected(language, category)
        }
    }

    fn entries(items: Value) -> Value {
        json!({"*": [{"a": {"*": items}}]})
    }

    fn options(dry_run: bool) -> TaskOptions {
        TaskOptions {
            entity: "Q8683464".to_string(),
            report_page: "User:Example/rowing/unconnected_pages".to_string(),
            edit_summary: "weekly".to_string(),
            report: ReportOptions::default(),
            dry_run,
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "Bot@weekly".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn soft_failures_skip_languages_and_keep_order() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("logs").join("records.txt");
        let mut resolver = MockResolver::with(&[
            ("Category:Rowing", "en"),
            ("Kategorie:Rudern", "de"),
            ("Kategori:Roing", "nb"),
            ("Catégorie:Aviron", "fr"),
        ]);
        let mut scanner = MockScanner::default()
            .reply(
                "en",
                200,
                entries(json!([
                    {"namespace": 0, "title": "Rowing_club"},
                    {"namespace": 0, "title": "Linked", "q": "Q5"},
                    {"namespace": 14, "title": "Sub"}
                ])),
            )
            .reply("de", 502, json!("bad gateway"))
            .reply("no", 200, json!({"error": "query timed out"}))
            .reply("fr", 200, entries(json!([{"namespace": 10, "title": "Aviron"}])));
        let clock = FakeClock::new();
        let mut pacer = FixedIntervalPacer::with_clock(&clock, Duration::from_secs(1));

        let report = renew_records(&mut resolver, &mut scanner, &mut pacer, "Q8683464", &path)
            .expect("renew");

        assert_eq!(report.languages, 4);
        assert_eq!(report.scanned, 2);
        assert_eq!(report.unavailable, vec!["de".to_string()]);
        assert_eq!(report.malformed, vec!["no".to_string()]);
        assert_eq!(report.findings, 3);
        assert_eq!(
            scanner.calls,
            vec![
                ("en".to_string(), "Rowing".to_string()),
                ("de".to_string(), "Rudern".to_string()),
                ("no".to_string(), "Roing".to_string()),
                ("fr".to_string(), "Aviron".to_string()),
            ]
        );
        assert_eq!(clock.sleeps.borrow().len(), 3);

        let records = load_all(&path).expect("load");
        let rows = records
            .iter()
            .map(|record| format!("{}:{}", record.language, record.full_title))
            .collect::<Vec<_>>();
        assert_eq!(rows, vec!["en:Rowing_club", "en:Category:Sub", "fr:Template:Aviron"]);
    }

    #[test]
    fn resolver_failure_aborts_and_publishes_nothing() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("records.txt");
        let mut resolver = MockResolver {
            sitelinks: Vec::new(),
            fail: true,
        };
        let mut scanner = MockScanner::default();
        let clock = FakeClock::new();
        let mut pacer = FixedIntervalPacer::with_clock(&clock, Duration::from_secs(1));
        let mut wiki = MockWikiApi::default();
        let creds = credentials();

        let error = run_task(
            &mut resolver,
            &mut scanner,
            &mut pacer,
            Some((&mut wiki, &creds)),
            &options(false),
            &path,
        )
        .expect_err("must fail");
        assert!(format!("{error:#}").contains("query service timeout"));
        assert!(wiki.edits.is_empty());
        assert!(scanner.calls.is_empty());
        assert!(load_all(&path).expect("load").is_empty());
    }

    #[test]
    fn undecodable_scan_reply_aborts_run() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("records.txt");
        let mut resolver = MockResolver::with(&[("Category:Rowing", "en")]);
        let mut scanner = MockScanner::default();
        scanner.replies.insert(
            "en".to_string(),
            HttpReply {
                status: 200,
                body: "<html>".to_string(),
            },
        );
        let clock = FakeClock::new();
        let mut pacer = FixedIntervalPacer::with_clock(&clock, Duration::from_secs(1));

        let result = renew_records(&mut resolver, &mut scanner, &mut pacer, "Q8683464", &path);
        assert!(result.is_err());
    }

    #[test]
    fn entity_without_sitelinks_publishes_empty_table() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("records.txt");
        let mut resolver = MockResolver::with(&[]);
        let mut scanner = MockScanner::default();
        let clock = FakeClock::new();
        let mut pacer = FixedIntervalPacer::with_clock(&clock, Duration::from_secs(1));
        let mut wiki = MockWikiApi::default();
        let creds = credentials();

        let report = run_task(
            &mut resolver,
            &mut scanner,
            &mut pacer,
            Some((&mut wiki, &creds)),
            &options(false),
            &path,
        )
        .expect("run");

        assert!(report.published);
        assert_eq!(report.renew.findings, 0);
        assert!(report.wikitext.contains("{{Q|Q8683464}}"));
        assert!(!report.wikitext.contains("\n| 1\n"));
        assert!(report.wikitext.ends_with("new item\n|}"));
        assert_eq!(wiki.edits.len(), 1);
        assert_eq!(wiki.edits[0].title, "User:Example/rowing/unconnected_pages");
        assert_eq!(wiki.edits[0].text, report.wikitext);
    }

    #[test]
    fn dry_run_renders_without_publishing() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("records.txt");
        let mut resolver = MockResolver::with(&[("Category:Rowing", "en")]);
        let mut scanner = MockScanner::default().reply(
            "en",
            200,
            entries(json!([{"namespace": 0, "title": "Foo_Bar"}])),
        );
        let clock = FakeClock::new();
        let mut pacer = FixedIntervalPacer::with_clock(&clock, Duration::from_secs(1));
        let mut wiki = MockWikiApi::default();
        let creds = credentials();

        let report = run_task(
            &mut resolver,
            &mut scanner,
            &mut pacer,
            Some((&mut wiki, &creds)),
            &options(true),
            &path,
        )
        .expect("run");

        assert!(!report.published);
        assert!(wiki.edits.is_empty());
        assert!(report.wikitext.contains("| [[:en:Foo Bar]]"));
        assert!(report.wikitext.contains("search=Foo+Bar find in Wikidata"));
        assert!(clock.sleeps.borrow().is_empty());
    }

    #[test]
    fn slow_scans_are_still_separated_by_full_interval() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("records.txt");
        let mut resolver = MockResolver::with(&[
            ("Category:Rowing", "en"),
            ("Kategorie:Rudern", "de"),
            ("Catégorie:Aviron", "fr"),
        ]);
        let empty = entries(json!([]));
        let clock = FakeClock::new();
        let mut scanner = SlowScanner {
            inner: MockScanner::default()
                .reply("en", 200, empty.clone())
                .reply("de", 200, empty.clone())
                .reply("fr", 200, empty),
            clock: &clock,
            delay: Duration::from_millis(1_500),
        };
        let mut pacer = FixedIntervalPacer::with_clock(&clock, Duration::from_secs(1));

        let report = renew_records(&mut resolver, &mut scanner, &mut pacer, "Q8683464", &path)
            .expect("renew");

        assert_eq!(report.scanned, 3);
        assert_eq!(scanner.inner.calls.len(), 3);
        assert_eq!(
            *clock.sleeps.borrow(),
            vec![Duration::from_secs(1), Duration::from_secs(1)]
        );
    }

    #[test]
    fn invalid_entity_keeps_previous_record_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("records.txt");
        fs::write(&path, "# file generated: 1\nen\t\tRowing_club\n").expect("write records");
        let mut resolver = MockResolver::with(&[("Category:Rowing", "en")]);
        let mut scanner = MockScanner::default();
        let clock = FakeClock::new();
        let mut pacer = FixedIntervalPacer::with_clock(&clock, Duration::from_secs(1));

        let error = renew_records(&mut resolver, &mut scanner, &mut pacer, "P31", &path)
            .expect_err("must fail");

        assert!(error.to_string().contains("invalid entity id"));
        assert!(scanner.calls.is_empty());
        assert_eq!(load_all(&path).expect("load").len(), 1);
    }
}
