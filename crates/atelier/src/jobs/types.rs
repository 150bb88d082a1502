//! Persisted job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateSummary;
use crate::analysis::{AnalysisRecord, ImageReference};

/// The two job classes. Each owns exactly one slot in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobClass {
    SingleImage,
    Board,
}

impl JobClass {
    pub const ALL: [JobClass; 2] = [JobClass::SingleImage, JobClass::Board];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobClass::SingleImage => "single-image",
            JobClass::Board => "board",
        }
    }

    /// Key of this class's record in the state store.
    pub fn store_key(&self) -> String {
        format!("job_status:{}", self.as_str())
    }
}

impl std::fmt::Display for JobClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Analyzing,
    Complete,
    Error,
}

/// What a job is analyzing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobSubject {
    #[serde(rename_all = "camelCase")]
    Image { image_reference: ImageReference },
    #[serde(rename_all = "camelCase")]
    Board {
        board_id: String,
        display_name: String,
        declared_total: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Snapshot of one job class. Absent fields are omitted on the wire, so the
/// idle sentinel serializes as `{"state":"idle"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<JobSubject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<Vec<AnalysisRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl JobStatus {
    /// The "no record" sentinel.
    pub fn idle() -> Self {
        Self {
            state: JobState::Idle,
            job_id: None,
            generation: 0,
            created_at: None,
            completed_at: None,
            subject: None,
            progress: None,
            partial_results: None,
            aggregate: None,
            error: None,
        }
    }

    /// Initial `analyzing` record for a freshly started job.
    pub fn started(job_id: &str, generation: u64, subject: JobSubject, total: usize) -> Self {
        Self {
            state: JobState::Analyzing,
            job_id: Some(job_id.to_string()),
            generation,
            created_at: Some(Utc::now()),
            subject: Some(subject),
            progress: Some(Progress {
                completed: 0,
                total,
            }),
            partial_results: Some(Vec::new()),
            ..Self::idle()
        }
    }

    /// Initial record of a board job whose items are still being fetched.
    /// It has no progress until the sample is drawn.
    pub fn fetching(job_id: &str, generation: u64, subject: JobSubject) -> Self {
        Self {
            progress: None,
            ..Self::started(job_id, generation, subject, 0)
        }
    }

    /// Fixes the item count once fetched candidates have been sampled. A
    /// board subject without a declared total takes the candidate count.
    pub fn with_sample(&self, total: usize, candidates: usize) -> Self {
        let subject = match &self.subject {
            Some(JobSubject::Board {
                board_id,
                display_name,
                declared_total,
            }) => Some(JobSubject::Board {
                board_id: board_id.clone(),
                display_name: display_name.clone(),
                declared_total: if *declared_total == 0 {
                    candidates
                } else {
                    *declared_total
                },
            }),
            other => other.clone(),
        };
        Self {
            subject,
            progress: Some(Progress {
                completed: 0,
                total,
            }),
            ..self.clone()
        }
    }

    /// Progress snapshot derived from the initial record.
    pub fn with_progress(&self, completed: usize, records: &[AnalysisRecord]) -> Self {
        let total = self.progress.map(|p| p.total).unwrap_or(completed);
        Self {
            progress: Some(Progress { completed, total }),
            partial_results: Some(records.to_vec()),
            ..self.clone()
        }
    }

    /// Terminal `complete` record.
    pub fn completed(
        &self,
        records: Vec<AnalysisRecord>,
        aggregate: Option<AggregateSummary>,
    ) -> Self {
        let total = self.progress.map(|p| p.total).unwrap_or(records.len());
        Self {
            state: JobState::Complete,
            completed_at: Some(Utc::now()),
            progress: Some(Progress {
                completed: total,
                total,
            }),
            partial_results: Some(records),
            aggregate,
            error: None,
            ..self.clone()
        }
    }

    /// Terminal `error` record.
    pub fn failed(&self, message: &str) -> Self {
        Self {
            state: JobState::Error,
            completed_at: Some(Utc::now()),
            error: Some(message.to_string()),
            ..self.clone()
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == JobState::Idle
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Complete | JobState::Error)
    }
}
