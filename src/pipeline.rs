use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use tokio::time::Instant;
use url::Url;

use crate::browser::ChromiumBackend;
use crate::cli::{ParseArgs, ScrapeArgs, SourceArgs};
use crate::extraction::{RetryPolicy, Summary, extract_all};
use crate::fetch::{self, BrowserBackend, FetchResult, FetchSettings};
use crate::formats::{OutcomeRecord, OutputLine, SegmentRecord};
use crate::ollama::{OllamaClient, OllamaConfig};
use crate::reduce;
use crate::segment::{self, Provenance, Segment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    Url(Url),
    File(PathBuf),
}

impl PageSource {
    pub fn from_args(args: &SourceArgs) -> anyhow::Result<Self> {
        match (args.url.as_deref(), args.html.as_deref()) {
            (Some(url), _) => Ok(Self::Url(validate_url(url)?)),
            (None, Some(path)) => Ok(Self::File(PathBuf::from(path))),
            (None, None) => anyhow::bail!("either --url or --html is required"),
        }
    }
}

/// Accepts absolute http/https URLs with a host.
pub fn validate_url(input: &str) -> anyhow::Result<Url> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("please enter a valid URL (got an empty string)");
    }

    let url = Url::parse(input).with_context(|| format!("please enter a valid URL: {input}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("please enter a valid URL: must be http/https: {url}");
    }
    if url.host_str().is_none_or(str::is_empty) {
        anyhow::bail!("please enter a valid URL: missing host: {url}");
    }
    Ok(url)
}

#[derive(Debug, thiserror::Error)]
#[error(
    "page load timed out after {seconds} seconds; the site may use infinite scroll or dynamic loading"
)]
pub struct PageLoadTimedOut {
    pub seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub fetch: FetchSettings,
    pub marker: String,
    pub max_chunk_chars: Option<usize>,
}

impl ScrapeOptions {
    pub fn from_args(args: &SourceArgs) -> Self {
        Self {
            fetch: FetchSettings {
                headless: !args.headed,
                max_duration: Duration::from_secs(args.max_duration),
                poll_interval: Duration::from_millis(args.poll_interval_ms),
            },
            marker: args.marker.clone(),
            max_chunk_chars: args.max_chunk_chars,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub source_url: String,
    pub cleaned_text: String,
    pub segments: Vec<Segment>,
}

/// Fetch (or read) the page, reduce it to text and cut it into segments.
///
/// A page-load timeout fails with [`PageLoadTimedOut`] so callers can tell it
/// apart from a page that simply had no text.
pub async fn scrape(
    backend: &dyn BrowserBackend,
    source: &PageSource,
    options: &ScrapeOptions,
) -> anyhow::Result<ScrapeReport> {
    let started_at = Instant::now();

    let (source_url, raw_html) = match source {
        PageSource::Url(url) => {
            let result = fetch::fetch(backend, url.as_str(), &options.fetch)
                .await
                .with_context(|| format!("fetch {url}"))?;
            match result {
                FetchResult::Html(html) => (url.to_string(), html),
                FetchResult::TimedOut => {
                    return Err(PageLoadTimedOut {
                        seconds: options.fetch.max_duration.as_secs(),
                    }
                    .into());
                }
            }
        }
        PageSource::File(path) => {
            let html = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("read html file: {}", path.display()))?;
            (file_url(path)?, html)
        }
    };

    let provenance = Provenance::now(source_url);
    let reduced = reduce::reduce(&raw_html);
    tracing::info!(
        url = %provenance.source_url,
        chars = reduced.cleaned_text.chars().count(),
        "cleaned content length"
    );

    let pieces = segment::segment(
        &reduced.cleaned_text,
        &options.marker,
        options.max_chunk_chars,
    );
    let segments = provenance.attach(pieces);
    if segments.is_empty() {
        tracing::warn!(url = %provenance.source_url, "page has no readable text");
    }

    let elapsed = started_at.elapsed();
    tracing::info!(
        url = %provenance.source_url,
        segments = segments.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "scraping completed"
    );

    Ok(ScrapeReport {
        source_url: provenance.source_url,
        cleaned_text: reduced.cleaned_text,
        segments,
    })
}

pub async fn run_scrape(args: ScrapeArgs) -> anyhow::Result<()> {
    let source = PageSource::from_args(&args.source)?;
    let backend = browser_backend(&args.source);
    let report = scrape(&backend, &source, &ScrapeOptions::from_args(&args.source)).await?;

    let mut out = std::io::stdout().lock();
    for (index, segment) in report.segments.iter().enumerate() {
        write_line(
            &mut out,
            &OutputLine::Segment(SegmentRecord::new(index, segment)),
        )?;
    }
    out.flush().context("flush stdout")?;
    Ok(())
}

pub async fn run_parse(args: ParseArgs) -> anyhow::Result<()> {
    if args.description.trim().is_empty() {
        anyhow::bail!("please enter a description before parsing");
    }
    let source = PageSource::from_args(&args.source)?;

    let mut config = OllamaConfig::from_env();
    if let Some(base_url) = args.ollama_url.clone() {
        config.base_url = base_url;
    }
    if let Some(model) = args.model.clone() {
        config.model = model;
    }
    let client = OllamaClient::new(&config).context("build Ollama client")?;

    let backend = browser_backend(&args.source);
    let report = scrape(&backend, &source, &ScrapeOptions::from_args(&args.source)).await?;

    let policy = RetryPolicy {
        retries: args.retries,
        max_duration: Duration::from_secs(args.budget_secs),
        delay: Duration::from_millis(args.retry_delay_ms),
    };
    tracing::info!(
        model = client.model(),
        segments = report.segments.len(),
        "parsing content"
    );
    let outcomes = extract_all(&client, &report.segments, &args.description, &policy).await;

    let summary = Summary::from_outcomes(&outcomes);
    tracing::info!(
        total = summary.total,
        matched = summary.matched,
        no_match = summary.no_match,
        error = summary.error,
        "parse summary"
    );

    let mut out = std::io::stdout().lock();
    for (index, outcome) in outcomes.iter().enumerate() {
        write_line(
            &mut out,
            &OutputLine::Outcome(OutcomeRecord::new(index, outcome)),
        )?;
    }
    write_line(&mut out, &OutputLine::Summary(summary))?;
    out.flush().context("flush stdout")?;
    Ok(())
}

fn browser_backend(args: &SourceArgs) -> ChromiumBackend {
    ChromiumBackend::new(args.chrome.as_deref().map(PathBuf::from))
}

fn file_url(path: &Path) -> anyhow::Result<String> {
    let absolute = std::fs::canonicalize(path)
        .with_context(|| format!("canonicalize html path: {}", path.display()))?;
    let url = Url::from_file_path(&absolute)
        .map_err(|()| anyhow::anyhow!("html path is not absolute: {}", absolute.display()))?;
    Ok(url.to_string())
}

fn write_line(out: &mut impl std::io::Write, line: &OutputLine) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, line).context("serialize output line")?;
    out.write_all(b"\n").context("write output newline")?;
    Ok(())
}
