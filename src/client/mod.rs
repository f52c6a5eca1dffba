//! Typed access to the batch transcription endpoints.
//!
//! Each operation performs one logical remote call through the [`Transport`],
//! which retries transient failures before a response reaches this layer.
//! Non-success responses become [`ServiceError`]s.

pub mod error;
pub mod retry;
pub mod transport;

pub use error::ServiceError;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper, BACKOFF_BASE_SECS, MAX_RETRIES};
pub use transport::{regional_base_url, Reply, Transport, DEFAULT_TIMEOUT, SUBSCRIPTION_KEY_HEADER};

use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Settings;
use crate::protocol::{self, Paginated, RecognitionResult, Transcription, TranscriptionFile};
use crate::{BatchError, Result};

/// API version prefix for every collection path
pub const SPEECH_TO_TEXT_BASE_PATH: &str = "speechtotext/v3.0/";

/// Transport tuning for a [`BatchClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Client for the transcription endpoints of one speech resource
#[derive(Debug, Clone)]
pub struct BatchClient {
    transport: Transport,
}

impl BatchClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Connect to the host named by the settings
    pub fn from_settings(settings: &Settings, options: &ClientOptions) -> Result<Self> {
        let transport = Transport::new(
            settings.base_url()?,
            &settings.api_key,
            options.timeout,
            options.retry.clone(),
        )?;
        Ok(Self::new(transport))
    }

    /// Fetch one page of transcriptions; the first page when `continuation` is `None`
    pub async fn list_transcriptions(&self, continuation: Option<&Url>) -> Result<Paginated<Transcription>> {
        let url = match continuation {
            Some(link) => self.transport.rebase(link),
            None => self.collection_url()?,
        };
        self.get_json(url).await
    }

    /// Every transcription visible to the subscription, following `nextLink` to the end
    pub async fn list_all_transcriptions(&self) -> Result<Vec<Transcription>> {
        let mut all = Vec::new();
        let mut continuation: Option<Url> = None;
        loop {
            let page = self.list_transcriptions(continuation.as_ref()).await?;
            all.extend(page.values);
            match page.next_link {
                Some(next) => continuation = Some(next),
                None => return Ok(all),
            }
        }
    }

    /// Fetch one page of a transcription's files
    pub async fn list_files(&self, files: Option<&Url>) -> Result<Paginated<TranscriptionFile>> {
        let files = files.ok_or(BatchError::InvalidArgument("files location"))?;
        self.get_json(self.transport.rebase(files)).await
    }

    /// All files of a transcription, following `nextLink` to the end
    pub async fn list_all_files(&self, files: Option<&Url>) -> Result<Vec<TranscriptionFile>> {
        let mut page = self.list_files(files).await?;
        let mut all = std::mem::take(&mut page.values);
        while let Some(next) = page.next_link.take() {
            page = self.list_files(Some(&next)).await?;
            all.append(&mut page.values);
        }
        Ok(all)
    }

    /// Download a recognition result; content links point at blob storage and are used as-is
    pub async fn get_result(&self, content: Option<&Url>) -> Result<RecognitionResult> {
        let content = content.ok_or(BatchError::InvalidArgument("content location"))?;
        self.get_json(content.clone()).await
    }

    /// Submit a job definition and return the resource the service created
    pub async fn create_transcription(&self, definition: &Transcription) -> Result<Transcription> {
        let body = protocol::to_wire_json(definition)?;
        let reply = self.transport.post_json(self.collection_url()?, body).await?;
        read_json(reply)
    }

    /// Delete a transcription by its `self` link.
    ///
    /// An unknown or already deleted job yields a 404 [`ServiceError`].
    pub async fn delete_transcription(&self, location: Option<&Url>) -> Result<()> {
        let location = location.ok_or(BatchError::InvalidArgument("transcription location"))?;
        let reply = self.transport.delete(self.transport.rebase(location)).await?;
        if reply.status.is_success() {
            return Ok(());
        }
        Err(ServiceError::from_reply(&reply).into())
    }

    fn collection_url(&self) -> Result<Url> {
        self.transport
            .resolve(&format!("{}transcriptions", SPEECH_TO_TEXT_BASE_PATH))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let reply = self.transport.get(url).await?;
        read_json(reply)
    }
}

fn read_json<T: DeserializeOwned>(reply: Reply) -> Result<T> {
    if !reply.status.is_success() {
        return Err(ServiceError::from_reply(&reply).into());
    }
    debug!("Received {} bytes ({})", reply.body.len(), reply.status);
    Ok(protocol::from_wire_json(&reply.body)?)
}
