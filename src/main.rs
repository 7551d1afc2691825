use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = pagesift::cli::Cli::parse();
    pagesift::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        pagesift::cli::Command::Scrape(args) => {
            pagesift::pipeline::run_scrape(args)
                .await
                .context("scrape")?;
        }
        pagesift::cli::Command::Parse(args) => {
            pagesift::pipeline::run_parse(args).await.context("parse")?;
        }
    }

    Ok(())
}
