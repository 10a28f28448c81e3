use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one snapshot, assigned once at capture time.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    WrongPerson,
    MultipleFaces,
    NoFace,
    Error,
}

impl VerificationStatus {
    /// Exactly one face was embedded and compared.
    pub fn is_single_face(self) -> bool {
        matches!(self, VerificationStatus::Verified | VerificationStatus::WrongPerson)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub taken_at: DateTime<Utc>,
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl VerificationRecord {
    pub fn new(status: VerificationStatus) -> Self {
        Self {
            taken_at: Utc::now(),
            status,
            similarity: None,
            image: None,
            detail: None,
            embedding: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::new(VerificationStatus::Error)
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSummary {
    pub total: u32,
    pub verified: u32,
    pub wrong_person: u32,
    pub multiple_faces: u32,
    pub no_face: u32,
    pub error: u32,
    /// Percentage of single-face samples that matched the reference.
    pub verification_rate: f64,
    pub verified_overall: bool,
}

impl VerificationSummary {
    /// The overall flag requires at least one match and a match rate of 50% or
    /// more over single-face samples.
    pub fn from_records(records: &[VerificationRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.total += 1;
            match record.status {
                VerificationStatus::Verified => summary.verified += 1,
                VerificationStatus::WrongPerson => summary.wrong_person += 1,
                VerificationStatus::MultipleFaces => summary.multiple_faces += 1,
                VerificationStatus::NoFace => summary.no_face += 1,
                VerificationStatus::Error => summary.error += 1,
            }
        }

        let single_face = summary.single_face_samples();
        if single_face > 0 {
            summary.verification_rate = summary.verified as f64 * 100.0 / single_face as f64;
        }
        summary.verified_overall = summary.verified > 0 && summary.verification_rate >= 50.0;
        summary
    }

    pub fn single_face_samples(&self) -> u32 {
        self.verified + self.wrong_person
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log_is_not_verified() {
        let summary = VerificationSummary::from_records(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.verification_rate, 0.0);
        assert!(!summary.verified_overall);
    }

    #[test]
    fn test_exactly_half_passes() {
        let records = vec![
            VerificationRecord::new(VerificationStatus::Verified),
            VerificationRecord::new(VerificationStatus::WrongPerson),
            VerificationRecord::new(VerificationStatus::Error),
        ];
        let summary = VerificationSummary::from_records(&records);
        assert_eq!(summary.verification_rate, 50.0);
        assert!(summary.verified_overall);
    }

    #[test]
    fn test_only_multiple_faces_is_not_verified() {
        let records = vec![VerificationRecord::new(VerificationStatus::MultipleFaces); 3];
        let summary = VerificationSummary::from_records(&records);
        assert_eq!(summary.multiple_faces, 3);
        assert!(!summary.verified_overall);
    }

    #[test]
    fn test_status_serializes_snake_case_and_embedding_is_dropped() {
        let mut record = VerificationRecord::new(VerificationStatus::WrongPerson);
        record.embedding = Some(vec![0.1, 0.2]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "wrong_person");
        assert!(json.get("embedding").is_none());
        assert!(json.get("takenAt").is_some());
    }
}
