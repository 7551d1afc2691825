use clap::{ArgAction, Args, Parser, Subcommand};

use crate::reduce::SECTION_BREAK;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a page and print its text segments as JSON lines.
    Scrape(ScrapeArgs),
    /// Fetch a page and extract the described facts from every segment.
    Parse(ParseArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Page URL (must be http/https).
    #[arg(long, required_unless_present = "html", conflicts_with = "html")]
    pub url: Option<String>,

    /// Saved HTML file to reduce instead of launching a browser.
    #[arg(long)]
    pub html: Option<String>,

    /// Show the browser window instead of running headless.
    #[arg(long)]
    pub headed: bool,

    /// Browser executable (default: auto-detect Chrome/Chromium).
    #[arg(long)]
    pub chrome: Option<String>,

    /// Seconds to wait for the page to finish loading.
    #[arg(long, default_value_t = 30)]
    pub max_duration: u64,

    /// Interval between readiness checks.
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Split segments longer than this many characters (0 disables).
    #[arg(long)]
    pub max_chunk_chars: Option<usize>,

    /// Section-break marker to split the cleaned text on.
    #[arg(long, default_value = SECTION_BREAK)]
    pub marker: String,
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// What to extract from each segment, in plain language.
    #[arg(long)]
    pub description: String,

    /// Extra attempts per segment after the first one fails.
    #[arg(long, default_value_t = 1)]
    pub retries: u32,

    /// Wall-clock budget per segment, in seconds.
    #[arg(long, default_value_t = 120)]
    pub budget_secs: u64,

    /// Pause between failed attempts.
    #[arg(long, default_value_t = 500)]
    pub retry_delay_ms: u64,

    /// Ollama base URL (default: $PAGESIFT_OLLAMA_URL or http://localhost:11434).
    #[arg(long)]
    pub ollama_url: Option<String>,

    /// Ollama model name (default: $PAGESIFT_OLLAMA_MODEL or mistral).
    #[arg(long)]
    pub model: Option<String>,
}
