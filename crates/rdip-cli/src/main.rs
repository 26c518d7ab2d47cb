use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rdip_client::{HttpAnalysisService, build_service};
use rdip_core::job::JobStatus;
use rdip_core::traits::AnalysisStore;
use rdip_core::{AnalyzeRequest, Settings};
use rdip_db::{AnalysisRepository, CacheDbConfig, Database};

type Service = HttpAnalysisService<AnalysisRepository>;

#[derive(Parser)]
#[command(name = "rdip", version, about = "Summarize and score discussion threads")]
struct Cli {
    /// Durable cache database URL
    #[arg(long, global = true, env = "RDIP_CACHE_DB")]
    cache_db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a thread and print the result as JSON
    Analyze {
        /// Thread URL
        #[arg(short, long)]
        url: String,

        /// Pull a larger slice of the comment tree
        #[arg(long, default_value_t = false)]
        deep_scan: bool,

        /// Truncate content to keep prompts small
        #[arg(long, default_value_t = false)]
        lite_mode: bool,

        /// Ignore any cached analysis
        #[arg(long, default_value_t = false)]
        force_refresh: bool,

        /// Groq API key (reads from GROQ_API_KEY if not provided)
        #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
        groq_api_key: Option<String>,

        /// Google API key (reads from GOOGLE_API_KEY if not provided)
        #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
        google_api_key: Option<String>,

        /// Status polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },

    /// Drop a thread's cached analysis
    Invalidate {
        /// Thread URL
        #[arg(short, long)]
        url: String,
    },

    /// Show cached analyses, most recently updated first
    Cached {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Print cache and rate-limit usage as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries the JSON output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rdip=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = connect_db(cli.cache_db).await?;

    match cli.command {
        Commands::Analyze {
            url,
            deep_scan,
            lite_mode,
            force_refresh,
            groq_api_key,
            google_api_key,
            poll_ms,
        } => {
            if groq_api_key.is_some() {
                settings.groq_api_key = groq_api_key;
            }
            if google_api_key.is_some() {
                settings.google_api_key = google_api_key;
            }
            let service = build_service(&settings, db.analysis_repo())
                .context("Failed to build analysis service")?;
            let request = AnalyzeRequest::new(url)
                .with_deep_scan(deep_scan)
                .with_lite_mode(lite_mode)
                .with_force_refresh(force_refresh);
            let outcome = cmd_analyze(&service, request, Duration::from_millis(poll_ms)).await;
            service.shutdown().await;
            outcome?;
        }
        Commands::Invalidate { url } => {
            let service = build_service(&settings, db.analysis_repo())
                .context("Failed to build analysis service")?;
            let removed = service.invalidate(&url).await;
            if removed {
                println!("Removed cached analysis for {url}");
            } else {
                println!("No cached analysis for {url}");
            }
            service.shutdown().await;
        }
        Commands::Cached { limit } => {
            let repo = db.analysis_repo();
            cmd_cached(&repo, limit).await?;
            repo.close().await;
        }
        Commands::Stats => {
            let service = build_service(&settings, db.analysis_repo())
                .context("Failed to build analysis service")?;
            println!("{}", serde_json::to_string_pretty(&service.stats().await)?);
            service.shutdown().await;
        }
    }

    Ok(())
}

/// Open and migrate the durable cache database.
async fn connect_db(url: Option<String>) -> Result<Database> {
    let mut config = CacheDbConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(url) = url {
        config.url = url;
    }

    let db = Database::connect(&config)
        .await
        .with_context(|| format!("Failed to open cache database {}", config.url))?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;

    Ok(db)
}

async fn cmd_analyze(service: &Service, request: AnalyzeRequest, poll: Duration) -> Result<()> {
    let url = request.url.clone();
    let mut job = service
        .submit(request)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(job_id = %job.job_id, %url, "Submitted");

    let mut last_progress = job.progress;
    while !job.status.is_terminal() {
        tokio::time::sleep(poll).await;
        job = service
            .status(&job.job_id)
            .with_context(|| format!("Job {} expired before finishing", job.job_id))?;
        if job.progress != last_progress {
            tracing::info!(progress = job.progress, status = %job.status, "Progress");
            last_progress = job.progress;
        }
    }

    println!("{}", serde_json::to_string_pretty(&job)?);

    if job.status == JobStatus::Failed {
        anyhow::bail!(
            "Analysis failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn cmd_cached(repo: &AnalysisRepository, limit: usize) -> Result<()> {
    let entries = repo.recent(limit).await.map_err(|e| anyhow::anyhow!(e))?;

    if entries.is_empty() {
        println!("No cached analyses");
        return Ok(());
    }

    println!("Cached analyses:\n");

    for entry in &entries {
        let title = entry
            .analysis
            .pointer("/meta/title")
            .and_then(|v| v.as_str())
            .unwrap_or("(untitled)");
        println!(
            "  {} [{}] {} (accessed {}x)\n      {}",
            entry.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.url_hash,
            title,
            entry.access_count,
            entry.url,
        );
    }

    println!("\nTotal: {} entries", entries.len());

    Ok(())
}
