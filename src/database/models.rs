use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::proctor::{VerificationRecord, VerificationSummary};

/// Verification section of the persisted result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationLog {
    pub summary: VerificationSummary,
    pub records: Vec<VerificationRecord>,
}

/// Payload of the write-once "submit result" call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    #[validate(email)]
    pub email: String,
    pub score: u32,
    /// JSON-encoded subject score map.
    pub subject_scores_json: String,
    #[validate(length(min = 1))]
    pub discipline: String,
    pub question_count: u32,
    pub verification_log: VerificationLog,
    pub submitted_at: DateTime<Utc>,
}

/// Per-discipline question bank size, as reported by `backend_check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisciplineCount {
    pub discipline: String,
    pub questions: i64,
}
