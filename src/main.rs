use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use sns_digest::cli::Cli;
use sns_digest::report::JsonReportWriter;
use sns_digest::sources::{ensure_sources_file, load_sources};
use sns_digest::{Config, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.create_sources {
        let created = ensure_sources_file(&cli.sources)
            .with_context(|| format!("writing {}", cli.sources.display()))?;
        if created {
            println!("Source file created: {}", cli.sources.display());
        } else {
            println!("Source file already exists: {}", cli.sources.display());
        }
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    config.apply_env();
    cli.apply(&mut config);
    let run_config = config.to_run_config();

    let pipeline = Pipeline::build(
        run_config,
        config.anthropic_api_key.as_deref(),
        &config.ai_model,
    )
    .await?;

    if cli.purge_only {
        let removed = pipeline.purge().await;
        pipeline.cache().flush().await;
        println!("Purged {} cache entries", removed);
        return Ok(());
    }

    let sources = load_sources(&cli.sources)?;
    let sink = JsonReportWriter::new(&cli.output);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; finishing with partial results");
            on_signal.cancel();
        }
    });

    let summary = pipeline.run(&sources, &sink, &cancel).await?;
    summary.log();

    println!(
        "Collected {} posts from {} sources ({} new in report, {} total) -> {}",
        summary.unique,
        summary.sources,
        summary.report_added,
        summary.report_total,
        cli.output.display()
    );
    Ok(())
}
