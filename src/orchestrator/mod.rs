//! Job lifecycle driver.
//!
//! A run moves through `Sweeping -> Submitting -> Polling -> Done`: it clears
//! out earlier jobs, submits one new job for the configured audio container,
//! then re-enumerates the whole collection on every poll pass until each job
//! it created has succeeded. Recognized text is fetched once per job.

use clap::ValueEnum;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::{BatchClient, Sleeper, TokioSleeper};
use crate::protocol::{self, RecognitionResult, Transcription, TranscriptionProperties};
use crate::tracker::{JobTracker, Observation, PassTally};
use crate::{BatchError, Result};

/// Display name given to submitted jobs
pub const DISPLAY_NAME: &str = "Simple transcription";

/// Locale of submitted jobs
pub const LOCALE: &str = "en-US";

/// Delay between two poll passes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// How long the service keeps a submitted job, in days
pub const DEFAULT_TIME_TO_LIVE_DAYS: i64 = 1;

/// Which listed jobs the sweep deletes
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SweepStrategy {
    /// Every listed job, whatever its status or owner
    #[default]
    All,
    /// Only jobs that already succeeded or failed
    Completed,
}

impl SweepStrategy {
    pub fn should_delete(&self, transcription: &Transcription) -> bool {
        match self {
            SweepStrategy::All => true,
            SweepStrategy::Completed => transcription.status.is_some_and(|s| s.is_completed()),
        }
    }
}

/// What the poll loop does once a tracked job fails
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// End the run with an error once every tracked job has finished
    #[default]
    Abort,
    /// Keep polling; the failed job never counts toward completion
    Wait,
}

/// Loop state of a run
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sweeping,
    Submitting,
    Polling,
    Done,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Blob container holding the audio to transcribe
    pub audio_container_url: Url,
    pub display_name: String,
    pub locale: String,
    pub time_to_live: chrono::Duration,
    pub poll_interval: Duration,
    pub sweep: SweepStrategy,
    pub on_failure: FailurePolicy,
}

impl OrchestratorConfig {
    pub fn new(audio_container_url: Url) -> Self {
        Self {
            audio_container_url,
            display_name: DISPLAY_NAME.to_string(),
            locale: LOCALE.to_string(),
            time_to_live: chrono::Duration::days(DEFAULT_TIME_TO_LIVE_DAYS),
            poll_interval: DEFAULT_POLL_INTERVAL,
            sweep: SweepStrategy::default(),
            on_failure: FailurePolicy::default(),
        }
    }

    /// Job definition submitted by a run
    pub fn definition(&self) -> Transcription {
        Transcription::from_container(&self.display_name, &self.locale, self.audio_container_url.clone())
            .with_properties(TranscriptionProperties {
                word_level_timestamps_enabled: Some(true),
                time_to_live: Some(self.time_to_live),
                ..Default::default()
            })
    }
}

/// Destination for downloaded recognition results
pub trait ResultSink: Send + Sync {
    fn emit(&self, result: &RecognitionResult) -> Result<()>;
}

/// Writes combined recognized phrases to stdout as indented JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl ResultSink for StdoutSink {
    fn emit(&self, result: &RecognitionResult) -> Result<()> {
        let phrases = protocol::to_wire_json(&result.combined_recognized_phrases)?;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(
            out,
            "==== File: {}. Combined recognized phrases:",
            result.source.as_deref().unwrap_or("<unknown source>")
        )?;
        writeln!(out, "{}", phrases)?;
        Ok(())
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Jobs removed by the sweep
    pub deleted: usize,
    /// `self` link of the submitted job
    pub created: Url,
    /// Full enumerations performed by the poll loop
    pub passes: u32,
    pub results: Vec<RecognitionResult>,
}

pub struct Orchestrator {
    client: BatchClient,
    config: OrchestratorConfig,
    tracker: JobTracker,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn ResultSink>,
    phase: Phase,
    results: Vec<RecognitionResult>,
}

impl Orchestrator {
    pub fn new(client: BatchClient, config: OrchestratorConfig) -> Self {
        Self {
            client,
            config,
            tracker: JobTracker::new(),
            sleeper: Arc::new(TokioSleeper),
            sink: Arc::new(StdoutSink),
            phase: Phase::Idle,
            results: Vec::new(),
        }
    }

    /// Replace the timer used between poll passes
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Sweep, submit, then poll until every tracked job is resolved
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.phase = Phase::Sweeping;
        let deleted = self.sweep().await?;

        self.phase = Phase::Submitting;
        let created = self.submit().await?;

        self.phase = Phase::Polling;
        let passes = self.poll().await?;

        self.phase = Phase::Done;
        Ok(RunSummary {
            deleted,
            created,
            passes,
            results: std::mem::take(&mut self.results),
        })
    }

    /// Delete the jobs selected by the sweep strategy; returns how many were deleted.
    ///
    /// The collection is enumerated to the end before anything is deleted so
    /// that deletions cannot shift the pages still to be read.
    pub async fn sweep(&mut self) -> Result<usize> {
        info!("Deleting existing transcriptions ({:?})", self.config.sweep);
        let listed = self.client.list_all_transcriptions().await?;

        let mut deleted = 0;
        for transcription in listed.iter().filter(|t| self.config.sweep.should_delete(t)) {
            let Some(location) = transcription.self_uri.as_ref() else {
                warn!(
                    "Skipping transcription '{}' without a self link",
                    transcription.display_name.as_deref().unwrap_or_default()
                );
                continue;
            };
            match self.client.delete_transcription(Some(location)).await {
                Ok(()) => {
                    deleted += 1;
                    info!("Deleted transcription {}", location);
                }
                Err(BatchError::Service(e)) if e.is_not_found() => {
                    debug!("Transcription {} was already gone", location);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Deleted {} of {} listed transcriptions", deleted, listed.len());
        Ok(deleted)
    }

    /// Submit the configured job and start tracking it
    pub async fn submit(&mut self) -> Result<Url> {
        info!("Creating transcription for {}", self.config.audio_container_url);
        let created = self.client.create_transcription(&self.config.definition()).await?;
        let location = created
            .self_uri
            .ok_or(BatchError::InvalidArgument("created transcription location"))?;

        info!("Created transcription {}", location);
        self.tracker.track(location.clone());
        Ok(location)
    }

    /// Poll until every tracked job succeeded; returns the number of passes
    pub async fn poll(&mut self) -> Result<u32> {
        let mut passes = 0;
        loop {
            passes += 1;
            let tally = self.poll_pass().await?;
            info!("{}", tally);

            if self.tracker.all_succeeded(&tally) {
                return Ok(passes);
            }

            if self.config.on_failure == FailurePolicy::Abort && self.tracker.all_resolved(&tally) {
                if let Some((job, message)) = self.tracker.first_failure() {
                    return Err(BatchError::TranscriptionFailed {
                        job: job.clone(),
                        message: message.to_string(),
                    });
                }
            }

            info!("Waiting {:?} before checking again", self.config.poll_interval);
            self.sleeper.sleep(self.config.poll_interval).await;
        }
    }

    /// One full enumeration of the collection
    async fn poll_pass(&mut self) -> Result<PassTally> {
        let mut tally = self.tracker.begin_pass();
        let mut continuation: Option<Url> = None;

        loop {
            let page = self.client.list_transcriptions(continuation.as_ref()).await?;
            for transcription in &page.values {
                match self.tracker.observe(transcription, &mut tally) {
                    Observation::Succeeded { fetch_results: true } => {
                        self.fetch_results(transcription).await?;
                        if let Some(job) = transcription.self_uri.as_ref() {
                            self.tracker.mark_results_fetched(job);
                        }
                    }
                    Observation::Failed {
                        message,
                        first_report: true,
                    } => {
                        if let Some(job) = transcription.self_uri.as_ref() {
                            error!("Transcription {} failed: {}", job, message);
                        }
                    }
                    _ => {}
                }
            }

            match page.next_link {
                Some(next) => continuation = Some(next),
                None => return Ok(tally),
            }
        }
    }

    /// Download and emit every transcription artifact of a succeeded job
    async fn fetch_results(&mut self, transcription: &Transcription) -> Result<usize> {
        let files = self.client.list_all_files(transcription.files_url()).await?;

        let mut fetched = 0;
        for file in files.iter().filter(|f| f.is_transcription()) {
            let result = self.client.get_result(file.content_url()).await?;
            self.sink.emit(&result)?;
            self.results.push(result);
            fetched += 1;
        }

        debug!("Fetched {} result files of {} listed", fetched, files.len());
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RetryPolicy, Transport};
    use crate::testing::RecordingSleeper;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const COLLECTION: &str = "/speechtotext/v3.0/transcriptions";

    #[derive(Default)]
    struct CollectingSink {
        sources: Mutex<Vec<String>>,
    }

    impl ResultSink for CollectingSink {
        fn emit(&self, result: &RecognitionResult) -> Result<()> {
            self.sources.lock().unwrap().push(result.source.clone().unwrap_or_default());
            Ok(())
        }
    }

    fn link(server: &MockServer, path_and_query: &str) -> String {
        format!("{}{}", server.uri(), path_and_query)
    }

    fn job_url(server: &MockServer, id: &str) -> Url {
        Url::parse(&link(server, &format!("{}/{}", COLLECTION, id))).unwrap()
    }

    fn job(server: &MockServer, id: &str, status: &str) -> serde_json::Value {
        json!({
            "self": link(server, &format!("{}/{}", COLLECTION, id)),
            "displayName": format!("job {}", id),
            "locale": "en-US",
            "status": status,
            "links": { "files": link(server, &format!("{}/{}/files", COLLECTION, id)) }
        })
    }

    async fn mount_results(server: &MockServer, id: &str, expected: u64) {
        Mock::given(method("GET"))
            .and(path(format!("{}/{}/files", COLLECTION, id).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [
                    { "kind": "TranscriptionReport", "links": { "contentUrl": link(server, &format!("/blob/{}/report.json", id)) } },
                    { "kind": "Transcription", "links": { "contentUrl": link(server, &format!("/blob/{}/audio.json", id)) } }
                ]
            })))
            .expect(expected)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/blob/{}/audio.json", id).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "source": format!("{}.wav", id),
                "combinedRecognizedPhrases": [{ "channel": 0, "display": "Hello world." }]
            })))
            .expect(expected)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/blob/{}/report.json", id).as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(server)
            .await;
    }

    fn orchestrator(server: &MockServer, config: OrchestratorConfig) -> (Orchestrator, Arc<RecordingSleeper>) {
        let transport = Transport::new(
            Url::parse(&server.uri()).unwrap(),
            "test-key",
            Duration::from_secs(5),
            RetryPolicy::default().with_sleeper(Arc::new(RecordingSleeper::default())),
        )
        .unwrap();
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = Orchestrator::new(BatchClient::new(transport), config)
            .with_sleeper(sleeper.clone())
            .with_sink(Arc::new(CollectingSink::default()));
        (orchestrator, sleeper)
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig::new(Url::parse("https://account.blob.core.windows.net/audio?sv=2020").unwrap())
    }

    #[test]
    fn test_definition_matches_submitted_job_shape() {
        let definition = config().definition();
        assert_eq!(definition.display_name.as_deref(), Some("Simple transcription"));
        assert_eq!(definition.locale.as_deref(), Some("en-US"));

        let properties = definition.properties.unwrap();
        assert_eq!(properties.word_level_timestamps_enabled, Some(true));
        assert_eq!(properties.time_to_live, Some(chrono::Duration::days(1)));
    }

    #[test]
    fn test_sweep_strategy_selection() {
        let with_status = |status| Transcription {
            status: Some(status),
            ..Default::default()
        };
        use crate::protocol::TranscriptionStatus::*;

        assert!(SweepStrategy::All.should_delete(&with_status(Running)));
        assert!(SweepStrategy::Completed.should_delete(&with_status(Succeeded)));
        assert!(SweepStrategy::Completed.should_delete(&with_status(Failed)));
        assert!(!SweepStrategy::Completed.should_delete(&with_status(NotStarted)));
        assert!(!SweepStrategy::Completed.should_delete(&Transcription::default()));
    }

    #[tokio::test]
    async fn test_run_succeeds_on_first_pass_without_sleeping() {
        let server = MockServer::start().await;

        // Sweep listing, then every later listing
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [job(&server, "old", "Succeeded"), job(&server, "busy", "Running")]
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [job(&server, "foreign", "Succeeded"), job(&server, "new", "Succeeded")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        for id in ["old", "busy"] {
            Mock::given(method("DELETE"))
                .and(path(format!("{}/{}", COLLECTION, id).as_str()))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;
        }

        Mock::given(method("POST"))
            .and(path(COLLECTION))
            .and(body_partial_json(json!({
                "displayName": "Simple transcription",
                "contentContainerUrl": "https://account.blob.core.windows.net/audio?sv=2020"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(job(&server, "new", "NotStarted")))
            .expect(1)
            .mount(&server)
            .await;

        mount_results(&server, "new", 1).await;
        mount_results(&server, "foreign", 0).await;

        let (mut orchestrator, sleeper) = orchestrator(&server, config());
        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.created, job_url(&server, "new"));
        assert_eq!(summary.passes, 1);
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].source.as_deref(), Some("new.wav"));
        assert!(sleeper.delays().is_empty());
        assert_eq!(orchestrator.phase(), Phase::Done);
    }

    #[tokio::test]
    async fn test_completed_sweep_tolerates_missing_jobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [
                    job(&server, "done", "Succeeded"),
                    job(&server, "broken", "Failed"),
                    job(&server, "busy", "Running")
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/done", COLLECTION).as_str()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/broken", COLLECTION).as_str()))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/busy", COLLECTION).as_str()))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config();
        config.sweep = SweepStrategy::Completed;
        let (mut orchestrator, _) = orchestrator(&server, config);

        assert_eq!(orchestrator.sweep().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_propagates_other_service_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [job(&server, "locked", "Succeeded")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let (mut orchestrator, _) = orchestrator(&server, config());
        let err = orchestrator.sweep().await.unwrap_err();
        assert!(matches!(err, BatchError::Service(ref e) if e.status == reqwest::StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_results_fetched_once_across_passes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [job(&server, "a", "Succeeded"), job(&server, "b", "Running")]
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [job(&server, "a", "Succeeded")],
                "@nextLink": link(&server, &format!("{}?skip=1&top=1", COLLECTION))
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [job(&server, "b", "Succeeded")]
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_results(&server, "a", 1).await;
        mount_results(&server, "b", 1).await;

        let (mut orchestrator, sleeper) = orchestrator(&server, config());
        orchestrator.tracker.track(job_url(&server, "a"));
        orchestrator.tracker.track(job_url(&server, "b"));

        let passes = orchestrator.poll().await.unwrap();

        assert_eq!(passes, 2);
        assert_eq!(sleeper.delays(), vec![DEFAULT_POLL_INTERVAL]);
        assert_eq!(orchestrator.results.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_job_aborts_run() {
        let server = MockServer::start().await;
        let mut failed = job(&server, "bad", "Failed");
        failed["properties"] = json!({ "error": { "code": "InvalidData", "message": "Audio is corrupt" } });
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "values": [failed] })))
            .expect(1)
            .mount(&server)
            .await;

        let (mut orchestrator, sleeper) = orchestrator(&server, config());
        orchestrator.tracker.track(job_url(&server, "bad"));

        match orchestrator.poll().await.unwrap_err() {
            BatchError::TranscriptionFailed { job, message } => {
                assert_eq!(job, job_url(&server, "bad"));
                assert_eq!(message, "Audio is corrupt");
            }
            other => panic!("expected transcription failure, got {:?}", other),
        }
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_keeps_waiting_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [job(&server, "bad", "Failed")]
            })))
            .mount(&server)
            .await;

        let mut config = config();
        config.on_failure = FailurePolicy::Wait;
        let (mut orchestrator, sleeper) = orchestrator(&server, config);
        orchestrator.tracker.track(job_url(&server, "bad"));

        let outcome = tokio::time::timeout(Duration::from_millis(500), orchestrator.poll()).await;

        assert!(outcome.is_err(), "poll loop must not end while the tracked job is failed");
        assert!(sleeper.delays().len() >= 2);
        assert!(sleeper.delays().iter().all(|d| *d == DEFAULT_POLL_INTERVAL));
    }

    #[tokio::test]
    async fn test_failure_waits_for_other_tracked_jobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [job(&server, "bad", "Failed"), job(&server, "slow", "Running")]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [job(&server, "bad", "Failed"), job(&server, "slow", "Succeeded")]
            })))
            .mount(&server)
            .await;
        mount_results(&server, "slow", 1).await;

        let (mut orchestrator, sleeper) = orchestrator(&server, config());
        orchestrator.tracker.track(job_url(&server, "bad"));
        orchestrator.tracker.track(job_url(&server, "slow"));

        let err = orchestrator.poll().await.unwrap_err();
        assert!(matches!(err, BatchError::TranscriptionFailed { .. }));
        assert_eq!(sleeper.delays().len(), 1);
        assert_eq!(orchestrator.results.len(), 1);
    }
}
