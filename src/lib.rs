//! Batch Transcriber - a runner for the Azure Speech batch transcription API
//!
//! This crate drives the Speech-to-Text v3.0 REST API through a single
//! transcription lifecycle. It features:
//!
//! - A pooled HTTP transport with exponential-backoff retry on transient failures
//! - Typed operations for listing, creating and deleting transcriptions
//! - Cursor-based pagination over every list endpoint
//! - A polling orchestrator that sweeps old jobs, submits a new one and fetches
//!   recognized text once it succeeds
//!
//! # Example
//!
//! ```rust,no_run
//! use batch_transcriber::{
//!     client::{BatchClient, ClientOptions},
//!     config::Settings,
//!     orchestrator::{Orchestrator, OrchestratorConfig},
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(Path::new("appsettings.json"), Default::default())?;
//!     let client = BatchClient::from_settings(&settings, &ClientOptions::default())?;
//!
//!     let config = OrchestratorConfig::new(settings.audio_container_url.clone());
//!     let mut orchestrator = Orchestrator::new(client, config);
//!     let summary = orchestrator.run().await?;
//!
//!     println!("{} result files", summary.results.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod orchestrator;
pub mod protocol;
pub mod tracker;

// Re-export commonly used types for convenience
pub use client::{BatchClient, ClientOptions, RetryPolicy, ServiceError, Sleeper, Transport};
pub use config::Settings;
pub use orchestrator::{FailurePolicy, Orchestrator, OrchestratorConfig, RunSummary, SweepStrategy};
pub use protocol::{
    ArtifactKind, Paginated, RecognitionResult, Transcription, TranscriptionFile,
    TranscriptionStatus,
};

use thiserror::Error;
use url::Url;

/// Errors that can occur while talking to the batch transcription service
#[derive(Error, Debug)]
pub enum BatchError {
    /// The service answered with a non-success status
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// The request could not be completed (retries exhausted or non-transient failure)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A required argument was missing
    #[error("Invalid argument: {0} must be provided")]
    InvalidArgument(&'static str),

    /// Response payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A URL could not be built or parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A tracked transcription reached the Failed state
    #[error("Transcription {job} failed: {message}")]
    TranscriptionFailed { job: Url, message: String },
}

/// Result type alias for batch transcriber operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "batch-transcriber");
    }

    #[test]
    fn test_invalid_argument_is_distinct_from_service_error() {
        let err = BatchError::InvalidArgument("files");
        assert!(!matches!(err, BatchError::Service(_)));
        assert_eq!(err.to_string(), "Invalid argument: files must be provided");
    }

    #[test]
    fn test_transcription_failed_message() {
        let job = Url::parse("https://westus.api.cognitive.microsoft.com/speechtotext/v3.0/transcriptions/1").unwrap();
        let err = BatchError::TranscriptionFailed {
            job,
            message: "Audio is corrupt".to_string(),
        };
        assert!(err.to_string().ends_with("failed: Audio is corrupt"));
    }
}
