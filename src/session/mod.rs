pub mod orchestrator;
pub mod schedule;

pub use orchestrator::*;
pub use schedule::*;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::assessment::{OptionLetter, SubjectScores};
use crate::config::ProctoringSettings;
use crate::database::{AssessmentResult, DatabaseError, ResultSink};
use crate::profile::LocalProfile;
use crate::proctor::{CameraDevice, FaceAnalyzer, VerificationSummary};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Rules,
    Assessment,
    Completed,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    TimerExpired,
}

/// Progress of saving a submitted result.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    Unsubmitted,
    Saving,
    Saved,
    Failed,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Operation not allowed in the {actual:?} stage (expected {expected:?})")]
    InvalidStage {
        expected: SessionStage,
        actual: SessionStage,
    },
    #[error("No reference face embedding is enrolled")]
    MissingReferenceEmbedding,
    #[error("The question set is empty")]
    NoQuestions,
    #[error("Camera could not be acquired")]
    CameraUnavailable,
    #[error("Assessment start already in progress")]
    AlreadyStarting,
    #[error("Question index {index} is out of range (question count: {len})")]
    QuestionOutOfRange { index: usize, len: usize },
    #[error("Nothing to persist: the session has not been submitted")]
    NothingToPersist,
    #[error("Result is already being persisted")]
    PersistInFlight,
    #[error("Result was submitted but could not be saved, retry the submission")]
    Unsaved,
    #[error("Session has been shut down")]
    Closed,
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(#[from] validator::ValidationErrors),
    #[error("Failed to persist result: {0}")]
    Persist(#[source] DatabaseError),
}

/// Everything the orchestrator needs that would otherwise be read from
/// ambient client storage.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    #[validate(email)]
    pub candidate_email: String,
    #[validate(length(min = 1))]
    pub discipline: String,
    pub reference_embedding: Vec<f32>,
    pub subcategories: Vec<String>,
    #[validate]
    pub proctoring: ProctoringSettings,
}

impl SessionConfig {
    pub fn from_profile(
        candidate_email: impl Into<String>,
        discipline: impl Into<String>,
        profile: &LocalProfile,
        proctoring: ProctoringSettings,
    ) -> Self {
        Self {
            candidate_email: candidate_email.into(),
            discipline: discipline.into(),
            reference_embedding: profile.reference_embedding.clone().unwrap_or_default(),
            subcategories: profile.subcategories.clone(),
            proctoring,
        }
    }
}

/// External collaborators of one session.
#[derive(Clone)]
pub struct SessionDeps {
    pub camera: Arc<dyn CameraDevice>,
    pub analyzer: Arc<dyn FaceAnalyzer>,
    pub sink: Arc<dyn ResultSink>,
}

/// Computed result of a submitted session, kept in memory until persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentOutcome {
    pub trigger: SubmitTrigger,
    pub completed_at: DateTime<Utc>,
    pub subject_scores: SubjectScores,
    pub summary: VerificationSummary,
    pub result: AssessmentResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub options: [String; 4],
    pub subject: String,
}

/// Read-only snapshot of the session for the UI layer. Never exposes the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub stage: SessionStage,
    pub current_index: usize,
    pub question_count: usize,
    pub question: Option<QuestionView>,
    pub selected: Option<OptionLetter>,
    pub answered_count: usize,
    pub remaining_seconds: u64,
    pub remaining_display: String,
    pub snapshots_taken: usize,
    pub submitted: bool,
    pub persisted: bool,
    pub save_state: SaveState,
}
