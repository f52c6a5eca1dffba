use anyhow::{Context, Result};
use batch_transcriber::{
    client::{BatchClient, ClientOptions, RetryPolicy},
    config::{Settings, SpeechServiceSection, DEFAULT_SETTINGS_FILE},
    orchestrator::{FailurePolicy, Orchestrator, OrchestratorConfig, SweepStrategy},
    VERSION,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "batch-transcriber")]
#[command(about = "Submit an audio container to the speech batch transcription API and print the results")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Settings file with a "SpeechService" section
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    pub config: PathBuf,

    /// Speech resource region, e.g. westus
    #[arg(long, env = "SPEECH_REGION")]
    pub region: Option<String>,

    /// Speech resource subscription key
    #[arg(long, env = "SPEECH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// SAS URL of the blob container holding the audio
    #[arg(long, env = "SPEECH_AUDIO_CONTAINER_URL")]
    pub audio_container_url: Option<String>,

    /// Custom model reference
    #[arg(long)]
    pub custom_model: Option<String>,

    /// Base URL replacing the regional host
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Which existing transcriptions to delete before submitting
    #[arg(long, value_enum, default_value = "all")]
    pub sweep: SweepStrategy,

    /// What to do when the submitted transcription fails
    #[arg(long, value_enum, default_value = "abort")]
    pub on_failure: FailurePolicy,

    /// Seconds between status checks
    #[arg(long, default_value = "60")]
    pub poll_interval: u64,

    /// Retries per request on transient failures
    #[arg(long, default_value = "5")]
    pub max_retries: u32,

    /// Per-request timeout in minutes (at least 20)
    #[arg(long, default_value = "25", value_parser = clap::value_parser!(u64).range(20..))]
    pub timeout_minutes: u64,

    /// Exit without waiting for Enter
    #[arg(long)]
    pub no_wait: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

impl Args {
    fn overrides(&self) -> SpeechServiceSection {
        SpeechServiceSection {
            region: self.region.clone(),
            api_key: self.api_key.clone(),
            audio_blob_container: self.audio_container_url.clone(),
            custom_model: self.custom_model.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.timeout_minutes.saturating_mul(60)),
            retry: RetryPolicy::new(self.max_retries),
        }
    }

    fn orchestrator_config(&self, settings: &Settings) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::new(settings.audio_container_url.clone());
        config.sweep = self.sweep;
        config.on_failure = self.on_failure;
        config.poll_interval = Duration::from_secs(self.poll_interval);
        config
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(unix)]
async fn wait_for_term_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    if let Ok(mut stream) = signal(SignalKind::terminate()) {
        stream.recv().await;
    }
}

#[cfg(not(unix))]
async fn wait_for_term_signal() {
    futures::future::pending::<()>().await;
}

/// Hold the console open until the operator presses Enter or interrupts
async fn wait_for_operator() -> Result<()> {
    println!("Press Enter to exit.");
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        read = stdin.read_line(&mut line) => {
            read.context("Failed to read from stdin")?;
        }
        _ = signal::ctrl_c() => {}
        _ = wait_for_term_signal() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level: tracing::Level = args.log_level.into();
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("Starting Batch Transcriber v{}", VERSION);

    let settings = Settings::load(&args.config, args.overrides())
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    info!("Configuration:");
    info!("  Region: {}", settings.region);
    info!("  Audio container: {}", settings.audio_container_url.host_str().unwrap_or("<none>"));
    info!("  Sweep: {:?}, on failure: {:?}", args.sweep, args.on_failure);
    info!("  Poll interval: {}s", args.poll_interval);

    let client = BatchClient::from_settings(&settings, &args.client_options())
        .context("Failed to create speech service client")?;
    let mut orchestrator = Orchestrator::new(client, args.orchestrator_config(&settings));

    let outcome = tokio::select! {
        result = orchestrator.run() => Some(result),
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C signal");
            None
        }
        _ = wait_for_term_signal() => {
            info!("Received TERM signal");
            None
        }
    };

    let Some(result) = outcome else {
        info!("Stopped during {:?}", orchestrator.phase());
        return Ok(());
    };

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            error!("Batch transcription failed: {}", e);
            return Err(e).context("Batch transcription failed");
        }
    };

    info!(
        "Deleted {} transcriptions, created {}, {} status passes, {} result files",
        summary.deleted,
        summary.created,
        summary.passes,
        summary.results.len()
    );
    println!("Finished processing batch transcription.");

    if !args.no_wait {
        wait_for_operator().await?;
    }

    Ok(())
}
