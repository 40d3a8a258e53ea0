use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use unconnected_core::config::{DEFAULT_CONFIG_FILENAME, ToolConfig, load_config};
use unconnected_core::external::ExternalClientConfig;
use unconnected_core::pacing::FixedIntervalPacer;
use unconnected_core::petscan::PetscanClient;
use unconnected_core::pipeline::{
    RenewReport, TaskOptions, render_records, renew_records, run_task,
};
use unconnected_core::publish::{
    Credentials, MediaWikiClient, MediaWikiClientConfig, publish_report,
};
use unconnected_core::report::ReportOptions;
use unconnected_core::sparql::WdqsClient;

#[derive(Debug, Parser)]
#[command(
    name = "unconnected",
    version,
    about = "Report Wikipedia pages in a category tree that lack a Wikidata item"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "QID", help = "Category item to scan")]
    entity: Option<String>,
    #[arg(long, global = true, value_name = "PATH")]
    record_file: Option<PathBuf>,
    #[arg(long, global = true, value_name = "TITLE", help = "Wiki page receiving the report")]
    report_page: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Scan all languages, render the report and publish it")]
    Run(RunArgs),
    #[command(about = "Rebuild the record file only")]
    Scan,
    #[command(about = "Render the existing record file as wikitext")]
    Render(RenderArgs),
    #[command(about = "Render the existing record file and publish it")]
    Publish,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, help = "Print the report instead of publishing it")]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[arg(long, value_name = "PATH", help = "Write wikitext to a file instead of stdout")]
    output: Option<PathBuf>,
}

struct Task {
    config: ToolConfig,
    entity: String,
    record_file: PathBuf,
    report_page: String,
}

impl Task {
    fn resolve(cli: &Cli) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
        let config = load_config(&config_path)?;
        let entity = cli.entity.clone().unwrap_or_else(|| config.entity());
        let record_file = cli
            .record_file
            .clone()
            .unwrap_or_else(|| config.record_file(&entity));
        let report_page = cli
            .report_page
            .clone()
            .unwrap_or_else(|| config.report_page());
        Ok(Self {
            config,
            entity,
            record_file,
            report_page,
        })
    }

    fn report_options(&self) -> ReportOptions {
        ReportOptions {
            header_template: self.config.header_template(),
        }
    }

    fn clients(&self) -> Result<(WdqsClient, PetscanClient, FixedIntervalPacer)> {
        let http = ExternalClientConfig::from_config(&self.config);
        Ok((
            WdqsClient::new(&http, &self.config.sparql_url())?,
            PetscanClient::new(&http, &self.config.petscan_url())?,
            FixedIntervalPacer::from_millis(self.config.scan_interval_ms()),
        ))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("unconnected=info,unconnected_core=info")
                }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let task = Task::resolve(&cli)?;

    match cli.command {
        Commands::Run(args) => run_full(&task, args),
        Commands::Scan => run_scan(&task),
        Commands::Render(args) => run_render(&task, args),
        Commands::Publish => run_publish(&task),
    }
}

fn run_full(task: &Task, args: RunArgs) -> Result<()> {
    let (mut resolver, mut scanner, mut pacer) = task.clients()?;
    let options = TaskOptions {
        entity: task.entity.clone(),
        report_page: task.report_page.clone(),
        edit_summary: task.config.edit_summary(),
        report: task.report_options(),
        dry_run: args.dry_run,
    };

    let report = if args.dry_run {
        run_task(
            &mut resolver,
            &mut scanner,
            &mut pacer,
            None::<(&mut MediaWikiClient, &Credentials)>,
            &options,
            &task.record_file,
        )?
    } else {
        let credentials = Credentials::from_env()?;
        let mut wiki = MediaWikiClient::new(MediaWikiClientConfig::from_config(&task.config))?;
        run_task(
            &mut resolver,
            &mut scanner,
            &mut pacer,
            Some((&mut wiki, &credentials)),
            &options,
            &task.record_file,
        )?
    };

    print_renew_summary(&report.renew, &task.record_file);
    if report.published {
        println!("published: {}", task.report_page);
    } else {
        println!("published: no (dry run)");
        println!();
        println!("{}", report.wikitext);
    }
    Ok(())
}

fn run_scan(task: &Task) -> Result<()> {
    let (mut resolver, mut scanner, mut pacer) = task.clients()?;
    let report = renew_records(
        &mut resolver,
        &mut scanner,
        &mut pacer,
        &task.entity,
        &task.record_file,
    )?;
    print_renew_summary(&report, &task.record_file);
    Ok(())
}

fn run_render(task: &Task, args: RenderArgs) -> Result<()> {
    let wikitext = render_records(&task.entity, &task.record_file, &task.report_options())?;
    match args.output {
        Some(path) => {
            fs::write(&path, &wikitext)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %normalize_path(&path), "report written");
        }
        None => println!("{wikitext}"),
    }
    Ok(())
}

fn run_publish(task: &Task) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let wikitext = render_records(&task.entity, &task.record_file, &task.report_options())?;
    let mut wiki = MediaWikiClient::new(MediaWikiClientConfig::from_config(&task.config))?;
    publish_report(
        &mut wiki,
        &credentials,
        &task.report_page,
        &wikitext,
        &task.config.edit_summary(),
    )?;
    println!("published: {}", task.report_page);
    Ok(())
}

fn print_renew_summary(report: &RenewReport, record_file: &Path) {
    println!("entity: {}", report.entity);
    println!("record_file: {}", normalize_path(record_file));
    println!("languages: {}", report.languages);
    println!("scanned: {}", report.scanned);
    println!("findings: {}", report.findings);
    println!("unavailable: {}", format_languages(&report.unavailable));
    println!("malformed: {}", format_languages(&report.malformed));
}

fn format_languages(languages: &[String]) -> String {
    if languages.is_empty() {
        "<none>".to_string()
    } else {
        languages.join(", ")
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
