//! Data model for the Speech-to-Text v3.0 batch transcription API.
//!
//! Field names travel in camelCase, enumerations as their string name, and
//! fields without a value are left out of outgoing payloads.

pub mod wire;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use wire::wire_enum;

wire_enum! {
    /// Lifecycle state reported by the service for a transcription
    pub enum TranscriptionStatus {
        NotStarted,
        Running,
        Succeeded,
        Failed,
    }
}

impl TranscriptionStatus {
    /// Whether the service has finished with the job, successfully or not
    pub fn is_completed(&self) -> bool {
        matches!(self, TranscriptionStatus::Succeeded | TranscriptionStatus::Failed)
    }
}

wire_enum! {
    /// Kind of artifact attached to a completed transcription
    pub enum ArtifactKind {
        DatasetReport,
        Audio,
        LanguageData,
        PronunciationData,
        AcousticDataArchive,
        AcousticDataTranscriptionV2,
        Transcription,
        TranscriptionReport,
        EvaluationDetails,
        ModelReport,
    }
}

wire_enum! {
    pub enum PunctuationMode {
        None,
        Dictated,
        Automatic,
        DictatedAndAutomatic,
    }
}

wire_enum! {
    pub enum ProfanityFilterMode {
        None,
        Removed,
        Tags,
        Masked,
    }
}

/// One page of a list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// Items on this page
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    /// Link to the following page; absent on the last one
    #[serde(rename = "@nextLink", alias = "nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<Url>,
}

impl<T> Paginated<T> {
    /// Whether this is the final page of the collection
    pub fn is_last(&self) -> bool {
        self.next_link.is_none()
    }
}

/// Reference to another entity by its `self` link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    #[serde(rename = "self")]
    pub self_uri: Url,
}

/// Error detail attached to a failed entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A batch transcription job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    /// Identity of the job, assigned by the service
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Blob container holding the source audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_container_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_urls: Option<Vec<Url>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TranscriptionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<TranscriptionProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<TranscriptionLinks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire::timestamp")]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire::timestamp")]
    pub last_action_date_time: Option<DateTime<Utc>>,
}

impl Transcription {
    /// Create a job definition that transcribes every file in a blob container
    pub fn from_container(display_name: &str, locale: &str, container: Url) -> Self {
        Self {
            display_name: Some(display_name.to_string()),
            locale: Some(locale.to_string()),
            content_container_url: Some(container),
            ..Default::default()
        }
    }

    /// Attach job properties
    pub fn with_properties(mut self, properties: TranscriptionProperties) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Link to the job's file listing, once the service provides it
    pub fn files_url(&self) -> Option<&Url> {
        self.links.as_ref().and_then(|links| links.files.as_ref())
    }

    /// Error message reported by the service for a failed job
    pub fn error_message(&self) -> Option<&str> {
        self.properties
            .as_ref()
            .and_then(|properties| properties.error.as_ref())
            .and_then(|error| error.message.as_deref())
    }
}

/// Job options and service-reported details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_level_timestamps_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diarization_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub punctuation_mode: Option<PunctuationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profanity_filter_mode: Option<ProfanityFilterMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<u32>>,
    /// How long the service keeps the job after it completes
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire::duration")]
    pub time_to_live: Option<Duration>,
    /// Total audio duration, reported after processing
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire::duration")]
    pub duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EntityError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Url>,
}

/// A file produced by a transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionFile {
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<FileProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire::timestamp")]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub links: FileLinks,
}

impl TranscriptionFile {
    /// Whether the file carries recognized text
    pub fn is_transcription(&self) -> bool {
        self.kind == ArtifactKind::Transcription
    }

    pub fn content_url(&self) -> Option<&Url> {
        self.links.content_url.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<Url>,
}

/// Recognized text for one source audio file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    /// Identifier of the originating audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire::timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_ticks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire::duration")]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub combined_recognized_phrases: Vec<CombinedRecognizedPhrase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recognized_phrases: Vec<RecognizedPhrase>,
}

/// All recognized text of one channel joined together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedRecognizedPhrase {
    #[serde(default)]
    pub channel: u32,
    #[serde(default)]
    pub lexical: String,
    #[serde(default)]
    pub itn: String,
    #[serde(rename = "maskedITN", default)]
    pub masked_itn: String,
    #[serde(default)]
    pub display: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedPhrase {
    #[serde(default)]
    pub recognition_status: String,
    #[serde(default)]
    pub channel: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_in_ticks: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_ticks: Option<f64>,
    #[serde(default)]
    pub n_best: Vec<NBest>,
}

/// A recognition hypothesis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NBest {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub lexical: String,
    #[serde(default)]
    pub itn: String,
    #[serde(rename = "maskedITN", default)]
    pub masked_itn: String,
    #[serde(default)]
    pub display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_in_ticks: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_ticks: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Serialize an outgoing payload the way the service expects it
pub fn to_wire_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

/// Deserialize a service response
pub fn from_wire_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(bytes)
}
