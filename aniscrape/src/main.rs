use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use serde_json::{Value, json};

use common::{AbortController, AbortSignal, DetailRecord, ResolveError};

mod cli;
mod sources;

use cli::{Cli, Commands};
use sources::Sources;

const EXIT_FAILURE: u8 = 1;
/// 被 Ctrl-C 取消时的退出码
const EXIT_CANCELED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let sources = match Sources::from_env() {
        Ok(sources) => sources,
        Err(e) => {
            log::error!("Failed to initialise sources: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Sources ready: {}", sources.names().join(", "));

    let controller = Arc::new(AbortController::new());
    let signal = controller.signal();
    tokio::spawn({
        let controller = Arc::clone(&controller);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, canceling in-flight requests...");
                controller.abort();
            }
        }
    });

    match run(cli.command, &sources, &signal).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("Failed to serialize output: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => ExitCode::from(report(&e)),
    }
}

/// 输出错误并返回退出码，取消不输出任何内容
fn report(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<ResolveError>() {
        Some(e) if e.is_silent() => EXIT_CANCELED,
        Some(e) => {
            log::error!("{}", e);
            eprintln!("{}", e.user_message());
            EXIT_FAILURE
        }
        None => {
            log::error!("{:#}", error);
            eprintln!("{:#}", error);
            EXIT_FAILURE
        }
    }
}

async fn run(command: Commands, sources: &Sources, signal: &AbortSignal) -> Result<Value> {
    match command {
        Commands::Listing { url, page } => {
            let source = route(sources, &url)?;
            log::info!("Resolving listing with {}: {}", source.name(), url);
            let record = source.resolve_listing(&url, page, signal).await?;
            Ok(serde_json::to_value(record)?)
        }
        Commands::Detail { url } => {
            let source = route(sources, &url)?;
            log::info!("Resolving detail with {}: {}", source.name(), url);
            let record = source.resolve_detail(&url, signal).await?;
            Ok(serde_json::to_value(record)?)
        }
        Commands::Play { url, quality } => {
            let source = route(sources, &url)?;
            log::info!("Resolving stream with {}: {}", source.name(), url);
            let record = source.resolve_detail(&url, signal).await?;

            let DetailRecord::Streaming(page) = &record else {
                log::info!("{} is not a streaming page, nothing to play", url);
                return Ok(json!({ "page": record, "stream": null }));
            };
            let stream = source
                .resolve_source(&page.candidates, quality.as_deref(), signal)
                .await?;
            log::info!(
                "Resolved {} stream(s) at {}",
                stream.sources.len(),
                stream.resolution_used
            );
            Ok(json!({ "page": record, "stream": stream }))
        }
        Commands::Search {
            source,
            query,
            page,
        } => {
            let source = by_name(sources, &source)?;
            log::info!("Searching {} for {:?}", source.name(), query);
            let results = source.search(&query, page, signal).await?;
            Ok(serde_json::to_value(results)?)
        }
        Commands::Asset {
            path,
            width,
            quality,
            source,
        } => {
            let source = by_name(sources, &source)?;
            Ok(json!({ "url": source.build_asset_url(&path, width, quality) }))
        }
    }
}

fn route<'a>(sources: &'a Sources, url: &str) -> Result<&'a dyn common::ContentSource> {
    sources.route(url).ok_or_else(|| {
        log::warn!("No source matches {}", url);
        ResolveError::UnsupportedSource.into()
    })
}

fn by_name<'a>(sources: &'a Sources, name: &str) -> Result<&'a dyn common::ContentSource> {
    sources.by_name(name).ok_or_else(|| {
        anyhow::anyhow!(
            "未知的内容源: {}（可选: {}）",
            name,
            sources.names().join(", ")
        )
    })
}
