use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use douyin_mcp::cli::{Cli, Commands};
use douyin_mcp::config::Config;
use douyin_mcp::pipeline::{LinkToolResult, Pipeline};
use douyin_mcp::server::{tools, HttpServer};
use douyin_mcp::{output, utils, ERROR_PREFIX};

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("douyin_mcp=debug,tower_http=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "douyin_mcp=info,tower_http=info".into())
    };

    // Logs go to stderr so tool output on stdout stays clean
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}

/// Startup warnings for things only needed by `extract_text`
async fn check_environment(config: &Config) {
    if config.transcription.resolve_api_key().is_none() {
        tracing::warn!(
            "No speech recognition key configured; set {} to enable extract_text",
            config.transcription.api_key_env
        );
    }

    if config.audio.extract_audio {
        for dep in utils::check_dependencies(&config.audio.ffmpeg_path).await {
            tracing::warn!("Optional dependency missing: {}", dep);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = Config::load()?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            check_environment(&config).await;

            let pipeline = Arc::new(Pipeline::new(&config)?);
            tracing::info!(
                provider = %config.transcription.provider,
                model = %config.transcription.default_model,
                "Starting douyin-mcp v{}",
                env!("CARGO_PKG_VERSION")
            );

            HttpServer::new(config.server.clone(), pipeline)
                .run_with_shutdown(shutdown_signal())
                .await
                .context("HTTP server failed")?;
        }
        Commands::Link {
            share,
            format,
            output,
            download,
        } => {
            let pipeline = Pipeline::new(&config)?;
            let result = pipeline.get_download_link(&share).await;
            let content = output::format_link_result(&result, &format)?;

            match output {
                Some(path) if !result.is_error() => {
                    output::save_to_file(&content, &path)?;
                    println!("Result saved to: {}", path.display());
                }
                _ => output::print_to_console(&content),
            }

            let LinkToolResult::Success(metadata) = result else {
                std::process::exit(1);
            };

            if let Some(dir) = download {
                let (data, format) = pipeline
                    .download_media(&metadata.play_url)
                    .await
                    .context("Failed to download video")?;
                let path = output::save_video(
                    &data,
                    &dir,
                    &metadata.title,
                    metadata.video_id.as_str(),
                    format,
                )?;
                println!("Video saved to: {}", path.display());
            }
        }
        Commands::Text {
            share,
            model,
            output,
        } => {
            let pipeline = Pipeline::new(&config)?;
            let text = pipeline.extract_text(&share, model.as_deref()).await;

            if text.starts_with(ERROR_PREFIX) {
                output::print_to_console(&text);
                std::process::exit(1);
            }

            match output {
                Some(path) => {
                    output::save_to_file(&text, &path)?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => output::print_to_console(&text),
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                match Config::config_path() {
                    Some(path) => println!("Config file: {}", path.display()),
                    None => println!("No configuration directory available"),
                }
                println!("\nDefault configuration:\n");
                print!(
                    "{}",
                    serde_yaml::to_string(&Config::default())
                        .context("Failed to render default configuration")?
                );
            }
        }
        Commands::Tools => {
            println!("Available tools:");
            for tool in tools::tool_definitions(&config.transcription.default_model) {
                println!("  • {} - {}", tool.name, tool.description);
            }
        }
    }

    Ok(())
}
