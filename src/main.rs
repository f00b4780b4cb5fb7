use anyhow::{bail, Context, Result};
use cfp_guardian_lib::models::{CorpusEntry, Submission};
use cfp_guardian_lib::services::{ConfigStore, CorpusStore, PlatformCrawler, ScreeningPipeline};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const USAGE: &str = "Usage:
  cfpGuardian --title <title> --abstract <abstract> [--description <text>] [options]
  cfpGuardian --submission <submission.json> [options]

Options:
  --corpus <corpus.json>   JSON array of historical talks to load
  --crawl                  Also fetch talks from the configured platforms
  --out <report.json>      Write the report to a file instead of stdout";

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn read_submission(args: &[String]) -> Result<Submission> {
    if let Some(path) = parse_arg_value(args, "--submission") {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read submission file {}", path))?;
        return serde_json::from_str(&raw).with_context(|| format!("parse submission {}", path));
    }

    let (Some(title), Some(abstract_text)) = (
        parse_arg_value(args, "--title"),
        parse_arg_value(args, "--abstract"),
    ) else {
        bail!("a submission is required\n\n{}", USAGE);
    };
    let description = parse_arg_value(args, "--description");
    Ok(Submission::new(title, abstract_text, description)?)
}

fn load_corpus_file(path: &str, store: &mut CorpusStore) -> Result<usize> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read corpus file {}", path))?;
    let entries: Vec<CorpusEntry> =
        serde_json::from_str(&raw).with_context(|| format!("parse corpus file {}", path))?;
    Ok(store.add_entries(entries))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || has_flag(&args, "--help") {
        eprintln!("{}", USAGE);
        return Ok(());
    }

    cfp_guardian_lib::init_logging();

    let submission = read_submission(&args)?;
    let config = ConfigStore::load_effective().context("load configuration")?;

    let mut store = CorpusStore::new();
    if let Some(path) = parse_arg_value(&args, "--corpus") {
        let added = load_corpus_file(&path, &mut store)?;
        info!("Loaded {} talks from {}", added, path);
    }

    let proxy = config.proxy.as_ref().and_then(|p| p.active_url());
    if has_flag(&args, "--crawl") {
        let crawler = PlatformCrawler::from_config(&config.ingestion, proxy)
            .context("build platform crawler")?;
        let summary = crawler.crawl_into(&mut store).await;
        info!(
            "Crawl added {} of {} fetched talks",
            summary.stored, summary.fetched
        );
    }

    if store.is_empty() {
        warn!("Corpus is empty; similarity checks will find nothing");
    }

    let pipeline = ScreeningPipeline::from_config(&config).context("build screening pipeline")?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing with default scores");
            ctrl_c_token.cancel();
        }
    });

    let report = pipeline
        .analyze_with_cancel(&submission, &store.all_entries(), &cancel)
        .await?;
    pipeline.shutdown().await;

    let json = serde_json::to_string_pretty(&report)?;
    match parse_arg_value(&args, "--out") {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("write report {}", path))?;
            info!("Report written to {}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}
