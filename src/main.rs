//! # echolens
//!
//! Serves the streaming analysis API, or runs a single analysis and prints
//! its event stream to stdout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use echolens_core::agents::Roster;
use echolens_core::request::AnalysisRequest;
use echolens_engine::{AnalysisPipeline, EventEmitter, PipelineConfig};
use echolens_llm::gemini::DEFAULT_MODEL;
use echolens_llm::{GeminiConfig, GeminiProvider};
use echolens_server::wire;
use echolens_telemetry::{init_telemetry, parse_module_level, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "echolens", about = "Multi-agent echo-chamber analysis")]
struct Cli {
    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[arg(long, env = "ECHOLENS_MODEL", default_value = DEFAULT_MODEL, global = true)]
    model: String,

    /// Override the Gemini API base URL.
    #[arg(long, env = "ECHOLENS_GEMINI_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Seconds to wait for an upstream stream to start.
    #[arg(long, env = "ECHOLENS_START_TIMEOUT_SECS", default_value_t = 30, global = true)]
    start_timeout_secs: u64,

    /// Seconds to wait between two fragments of one stream.
    #[arg(long, env = "ECHOLENS_IDLE_TIMEOUT_SECS", default_value_t = 90, global = true)]
    idle_timeout_secs: u64,

    /// Log as JSON lines.
    #[arg(long, env = "ECHOLENS_LOG_JSON", global = true)]
    log_json: bool,

    /// Default log level (RUST_LOG takes precedence).
    #[arg(long, default_value = "info", global = true)]
    log_level: tracing::Level,

    /// Per-target level override, e.g. `echolens_llm=debug`. Repeatable.
    #[arg(long = "log-module", value_parser = parse_module_level, global = true)]
    log_modules: Vec<(String, tracing::Level)>,

    /// Reviewer agents to run, in report order. Defaults to the full roster.
    #[arg(long, env = "ECHOLENS_AGENTS", value_delimiter = ',', global = true)]
    agents: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        #[arg(long, env = "ECHOLENS_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to bind (0 for auto-assign).
        #[arg(long, env = "ECHOLENS_PORT", default_value_t = 9191)]
        port: u16,
    },
    /// Analyze one video and print the event stream.
    Analyze {
        #[arg(long)]
        video_url: String,

        #[arg(long)]
        prompt: String,
    },
}

impl Cli {
    fn pipeline(&self) -> Result<Arc<AnalysisPipeline>> {
        let api_key = self
            .api_key
            .clone()
            .context("GEMINI_API_KEY is not set")?;

        let idle_timeout = Duration::from_secs(self.idle_timeout_secs);
        let mut gemini = GeminiConfig::new(SecretString::from(api_key));
        gemini.model = self.model.clone();
        gemini.base_url = self.base_url.clone();
        gemini.idle_timeout = idle_timeout;
        let provider = GeminiProvider::new(gemini).context("failed to build Gemini client")?;

        let roster = if self.agents.is_empty() {
            Roster::default()
        } else {
            Roster::from_names(&self.agents).context("invalid --agents")?
        };

        let config = PipelineConfig {
            start_timeout: Duration::from_secs(self.start_timeout_secs),
            idle_timeout,
            ..PipelineConfig::default()
        };
        Ok(Arc::new(AnalysisPipeline::new(
            Arc::new(provider),
            roster,
            config,
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let telemetry = init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        module_levels: cli.log_modules.clone(),
        json: cli.log_json,
    });
    if telemetry.installed() {
        tracing::debug!(filter = telemetry.filter(), "telemetry initialized");
    }

    let pipeline = cli.pipeline()?;

    match cli.command {
        Command::Serve { host, port } => serve(pipeline, host, port).await,
        Command::Analyze { video_url, prompt } => analyze(pipeline, &video_url, &prompt).await,
    }
}

async fn serve(pipeline: Arc<AnalysisPipeline>, host: String, port: u16) -> Result<()> {
    let handle = echolens_server::start(echolens_server::ServerConfig { host, port }, pipeline)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "echolens server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

async fn analyze(pipeline: Arc<AnalysisPipeline>, video_url: &str, prompt: &str) -> Result<()> {
    let request = AnalysisRequest::new(video_url, prompt)?;
    let (emitter, mut rx) = EventEmitter::channel(pipeline.config().event_buffer);
    let cancel = CancellationToken::new();

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match wire::encode_frame(&event) {
                Ok(frame) => print!("{frame}"),
                Err(e) => tracing::error!(error = %e, "failed to encode event"),
            }
        }
    });

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let outcome = pipeline.run(&request, emitter, cancel).await;
    printer.await.context("printer task failed")?;

    let result = outcome?;
    tracing::info!(echo_score = result.echo_score, "analysis finished");
    Ok(())
}
