//! AcadBot: question answering over course PDFs.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use acadbot_core::AcadbotConfig;
use acadbot_server::{build_router, AppState};

fn resolve_data_dir() -> PathBuf {
    std::env::var("ACADBOT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_help() {
    println!("AcadBot: answers questions from course PDFs");
    println!();
    println!("Usage: acadbot [command]");
    println!();
    println!("Commands:");
    println!("  serve                    Start the server (default)");
    println!("  build [corpus-dir]       Rebuild the index from the corpus");
    println!("  ask <question> [k]       Answer one question and print sources");
    println!("  help                     Show this help message");
}

/// Configuration with an optional corpus directory taking precedence over the environment.
fn load_config(corpus: Option<&str>) -> anyhow::Result<AcadbotConfig> {
    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());
    let config = AcadbotConfig::load(&data_dir, |name| match (name, corpus) {
        ("ACADBOT_CORPUS_DIR", Some(dir)) => Some(dir.to_string()),
        _ => std::env::var(name).ok(),
    })?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        None | Some("serve") => serve().await,
        Some("build") => build(args.get(2).map(|s| s.as_str())).await,
        Some("ask") => {
            let Some(question) = args.get(2) else {
                eprintln!("Usage: acadbot ask <question> [k]");
                std::process::exit(1);
            };
            let k = match args.get(3) {
                Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                    anyhow::anyhow!("k must be a positive integer, got {:?}", raw)
                })?),
                None => None,
            };
            ask(question, k).await
        }
        Some("--help" | "-h" | "help") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}. Use 'acadbot help' for usage.", other);
            std::process::exit(1);
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = load_config(None)?;
    let port = config.port;
    let state = Arc::new(AppState::from_config(config)?);

    match state.pipeline.load_or_build().await {
        Ok(report) => info!(
            "Index ready: {} documents, {} chunks (reused={})",
            report.documents, report.chunks, report.reused
        ),
        Err(e) => error!("Index unavailable until rebuilt: {}", e),
    }

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("AcadBot server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn build(corpus: Option<&str>) -> anyhow::Result<()> {
    let state = AppState::from_config(load_config(corpus)?)?;
    let report = state.pipeline.build_from_corpus().await?;

    println!(
        "Indexed {} documents into {} chunks with {}",
        report.documents, report.chunks, report.model_id
    );
    for failure in &report.failed_files {
        println!("  skipped {}: {}", failure.path.display(), failure.error);
    }
    Ok(())
}

async fn ask(question: &str, k: Option<usize>) -> anyhow::Result<()> {
    let state = AppState::from_config(load_config(None)?)?;
    state.pipeline.load_or_build().await?;

    match state.pipeline.ask(question, k, None).await {
        Ok(answer) => {
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for s in &answer.sources {
                    println!("  [{}] {} p.{} (score {:.3})", s.index, s.source, s.page, s.score);
                }
            }
            Ok(())
        }
        Err(e) if e.provider_failure().is_some() => {
            eprintln!("Unable to answer: {}", e);
            if e.is_retryable() {
                eprintln!("The provider failure is transient; try again shortly.");
            }
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
