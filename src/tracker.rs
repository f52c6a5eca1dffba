use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};
use url::Url;

use crate::protocol::{Transcription, TranscriptionStatus};

/// Last known state of a job this run created
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    /// Submitted, not yet seen in a terminal state
    Pending,
    /// Seen as succeeded at least once
    Succeeded,
    /// Reported as failed by the service
    Failed { message: String },
}

/// Bookkeeping for one tracked job
#[derive(Debug, Clone)]
pub struct TrackedJob {
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Whether recognition results were already downloaded
    pub results_fetched: bool,
}

impl TrackedJob {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            state: JobState::Pending,
            submitted_at: now,
            last_updated: now,
            results_fetched: false,
        }
    }

    fn update_state(&mut self, state: JobState) {
        self.state = state;
        self.last_updated = Utc::now();
    }
}

/// What the orchestrator should do with one listed transcription
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Not created by this run, or already counted in this pass
    Ignored,
    /// A tracked job succeeded; `fetch_results` is set the first time
    Succeeded { fetch_results: bool },
    /// A tracked job failed; `first_report` is set the first time
    Failed { message: String, first_report: bool },
    Running,
    NotStarted,
}

/// Counts gathered over one full enumeration of the collection
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassTally {
    /// Tracked jobs seen as succeeded
    pub completed: usize,
    /// Tracked jobs seen as failed
    pub failed: usize,
    /// Running jobs, tracked or not
    pub running: usize,
    /// Jobs not started yet, tracked or not
    pub not_started: usize,
}

impl fmt::Display for PassTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transcriptions status: {} completed, {} running, {} not started yet",
            self.completed, self.running, self.not_started
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// The set of jobs created by this run.
///
/// The listing endpoint returns every job on the subscription, so only jobs
/// recorded here count toward completion.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: HashMap<Url, TrackedJob>,
    /// Jobs already counted in the current pass
    seen: HashSet<Url>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a job by its `self` link
    pub fn track(&mut self, job: Url) {
        info!("Tracking transcription {}", job);
        self.jobs.insert(job, TrackedJob::new());
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn contains(&self, job: &Url) -> bool {
        self.jobs.contains_key(job)
    }

    pub fn get(&self, job: &Url) -> Option<&TrackedJob> {
        self.jobs.get(job)
    }

    /// Forget which jobs were counted; call before each enumeration
    pub fn begin_pass(&mut self) -> PassTally {
        self.seen.clear();
        PassTally::default()
    }

    /// Classify one listed transcription and add it to the tally
    pub fn observe(&mut self, transcription: &Transcription, tally: &mut PassTally) -> Observation {
        let status = match transcription.status {
            Some(status) => status,
            None => return Observation::Ignored,
        };

        match status {
            TranscriptionStatus::Running => {
                tally.running += 1;
                Observation::Running
            }
            TranscriptionStatus::NotStarted => {
                tally.not_started += 1;
                Observation::NotStarted
            }
            TranscriptionStatus::Succeeded | TranscriptionStatus::Failed => {
                let Some(job) = transcription.self_uri.as_ref() else {
                    return Observation::Ignored;
                };
                let Some(tracked) = self.jobs.get_mut(job) else {
                    return Observation::Ignored;
                };
                if !self.seen.insert(job.clone()) {
                    debug!("Transcription {} listed twice in one pass", job);
                    return Observation::Ignored;
                }

                if status == TranscriptionStatus::Succeeded {
                    tally.completed += 1;
                    if tracked.state != JobState::Succeeded {
                        tracked.update_state(JobState::Succeeded);
                    }
                    Observation::Succeeded {
                        fetch_results: !tracked.results_fetched,
                    }
                } else {
                    tally.failed += 1;
                    let message = transcription
                        .error_message()
                        .unwrap_or("no error detail provided")
                        .to_string();
                    let first_report = !matches!(tracked.state, JobState::Failed { .. });
                    if first_report {
                        tracked.update_state(JobState::Failed {
                            message: message.clone(),
                        });
                    }
                    Observation::Failed { message, first_report }
                }
            }
        }
    }

    /// Record that results for `job` were downloaded
    pub fn mark_results_fetched(&mut self, job: &Url) {
        if let Some(tracked) = self.jobs.get_mut(job) {
            tracked.results_fetched = true;
        }
    }

    /// Whether every tracked job was seen as succeeded in the tally's pass
    pub fn all_succeeded(&self, tally: &PassTally) -> bool {
        tally.completed >= self.jobs.len()
    }

    /// Whether every tracked job reached a terminal state in the tally's pass
    pub fn all_resolved(&self, tally: &PassTally) -> bool {
        tally.completed + tally.failed >= self.jobs.len()
    }

    /// First tracked job currently in the failed state
    pub fn first_failure(&self) -> Option<(&Url, &str)> {
        self.jobs.iter().find_map(|(job, tracked)| match &tracked.state {
            JobState::Failed { message } => Some((job, message.as_str())),
            _ => None,
        })
    }
}
