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
    interlink::logging::init().context("init logging")?;

    let cli = interlink::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        interlink::cli::Command::Annotate(args) => {
            interlink::annotate::run(args).await.context("annotate")?;
        }
        interlink::cli::Command::Analyze(args) => {
            interlink::suggest::run(args).await.context("analyze")?;
        }
        interlink::cli::Command::Stats(args) => {
            interlink::stats::run(args).await.context("stats")?;
        }
    }

    Ok(())
}
