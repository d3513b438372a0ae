//! Lumi CLI
//!
//! Runs the tutoring server and renders learner progress reports.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use lumi_content::{
    AvailabilityMonitor, ContentPipeline, Curriculum, DocumentStore, EmotionClassifier,
    GeminiClient, GenerativeClient, JsonFileStore, OfflineClient,
};
use lumi_orchestrator::{create_router, Config, Provider, SessionOrchestrator};
use lumi_report::{json::JsonGenerator, MarkdownGenerator};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Lumi - Adaptive Tutoring Server
///
/// Serves curriculum lessons, quizzes and re-explanations that adapt to the
/// learner's style, and keeps working when the generative service is down.
#[derive(Parser, Debug)]
#[command(name = "lumi")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: lumi.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP and WebSocket server (default)
    Serve {
        /// Address to bind, overriding the config file
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overriding the config file
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Render a learner's progress report
    Report {
        /// Learner id
        #[arg(value_name = "LEARNER")]
        learner: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List the topics in the curriculum
    Topics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    let result = match args.command {
        None => serve(args.config.as_deref(), None, None).await,
        Some(Commands::Serve { host, port }) => serve(args.config.as_deref(), host, port).await,
        Some(Commands::Report {
            learner,
            format,
            output,
        }) => report(args.config.as_deref(), &learner, format, output.as_deref()).await,
        Some(Commands::Topics) => topics(args.config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Everything the server and the report command share.
struct Services {
    orchestrator: Arc<SessionOrchestrator>,
    pipeline: Arc<ContentPipeline>,
    monitor: AvailabilityMonitor,
}

/// Runs the server until Ctrl+C.
async fn serve(config_path: Option<&str>, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    // Re-validate after overrides
    config.validate()?;

    print_config(&config);

    let services = build_services(&config)?;

    let _ticker = services.monitor.spawn_ticker();
    let _probe = services.monitor.spawn_probe(Arc::clone(&services.pipeline));
    let _relay = services
        .orchestrator
        .broadcaster()
        .relay_availability(&services.monitor);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port")
    })?;

    let router = create_router(Arc::clone(&services.orchestrator));

    println!();
    println!("Lumi running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(
        addr = %addr,
        tiers = ?services.pipeline.tier_names(),
        "Server started"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

    let open = services.orchestrator.active_sessions().await;
    tracing::info!(open_sessions = open, "Server stopped");
    Ok(())
}

/// Renders a learner report to stdout or a file.
async fn report(
    config_path: Option<&str>,
    learner_id: &str,
    format: ReportFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let services = build_services(&config)?;

    let learner_report = services.orchestrator.learner_report(learner_id).await?;
    tracing::info!(
        learner_id,
        sessions = learner_report.report.session_count,
        origin = %learner_report.narrative.origin,
        "Report built"
    );

    let rendered = match format {
        ReportFormat::Json => JsonGenerator::new(&learner_report.report).generate_pretty()?,
        ReportFormat::Markdown => MarkdownGenerator::new(&learner_report.report).generate(),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered).map_err(|e| {
                anyhow::anyhow!("Failed to write report: {e}\n\nPath: {}", path.display())
            })?;
            println!("Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// Prints the curriculum topics.
fn topics(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let curriculum = load_curriculum(&config)?;
    for topic in curriculum.topic_names() {
        let levels = curriculum.final_level(topic).unwrap_or(0);
        println!("{topic} ({levels} levels)");
    }
    Ok(())
}

/// Wires the client, store, monitor, pipeline and orchestrator.
fn build_services(config: &Config) -> anyhow::Result<Services> {
    let client: Arc<dyn GenerativeClient> = match config.api_key() {
        Some(key) => Arc::new(GeminiClient::new(
            &config.generative.base_url,
            &config.generative.model,
            key,
        )),
        None => {
            if config.generative.provider == Provider::Gemini {
                tracing::warn!(
                    env = %config.generative.api_key_env,
                    "No API key set; serving curriculum and offline content only"
                );
            }
            Arc::new(OfflineClient)
        }
    };

    let monitor = AvailabilityMonitor::new(config.availability_config());
    let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(config.data_path()));
    let curriculum = Arc::new(load_curriculum(config)?);

    let pipeline = Arc::new(
        ContentPipeline::builder(Arc::clone(&client), Arc::clone(&store), monitor.clone())
            .curriculum(Arc::clone(&curriculum))
            .validity(config.cache_validity())
            .retry_policy(config.retry_policy())
            .settings(config.generation_settings())
            .build(),
    );
    let classifier = Arc::new(EmotionClassifier::new(client, monitor.clone()));

    let orchestrator = SessionOrchestrator::new(
        Arc::clone(&pipeline),
        classifier,
        store,
        curriculum,
    )
    .with_mastery_threshold(config.mastery_threshold);

    Ok(Services {
        orchestrator: Arc::new(orchestrator),
        pipeline,
        monitor,
    })
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the configured curriculum file, or the built-in one.
fn load_curriculum(config: &Config) -> anyhow::Result<Curriculum> {
    match &config.curriculum {
        Some(path) => Curriculum::load(path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to load curriculum: {e}\n\nSuggestion: Check the \"curriculum\" path in lumi.json"
            )
        }),
        None => Ok(Curriculum::builtin()?),
    }
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Provider: {:?}", config.generative.provider);
    println!("  Model: {}", config.generative.model);
    println!("  Data directory: {}", config.data_dir);
    println!(
        "  Curriculum: {}",
        config.curriculum.as_deref().unwrap_or("built-in")
    );
    println!("  Mastery threshold: {}", config.mastery_threshold);
    println!("  Cooldown: {}s", config.availability.cooldown_seconds);
}

/// Resolves when the process receives Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}
