use std::sync::Arc;

use log::{debug, info, warn};

use super::camera::CameraSession;
use super::face::{cosine_similarity, FaceAnalyzer, FaceError};
use super::frame::jpeg_data_url;
use super::verification::{VerificationRecord, VerificationStatus};

/// Captures stills from the session camera and checks them against the
/// enrolled reference embedding.
pub struct SnapshotSampler {
    analyzer: Arc<dyn FaceAnalyzer>,
    reference: Arc<[f32]>,
    threshold: f32,
    jpeg_quality: u8,
    keep_image: bool,
}

impl SnapshotSampler {
    pub fn new(analyzer: Arc<dyn FaceAnalyzer>, reference: Arc<[f32]>, threshold: f32) -> Self {
        Self {
            analyzer,
            reference,
            threshold,
            jpeg_quality: 70,
            keep_image: true,
        }
    }

    pub fn with_image_encoding(mut self, keep_image: bool, jpeg_quality: u8) -> Self {
        self.keep_image = keep_image;
        self.jpeg_quality = jpeg_quality;
        self
    }

    /// Always yields a record; failures become `error` records.
    pub async fn capture(&self, camera: &CameraSession) -> VerificationRecord {
        let frame = match camera.grab_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("📸 Snapshot frame grab failed: {}", e);
                return VerificationRecord::failed(e.to_string());
            }
        };

        let image = if self.keep_image {
            match jpeg_data_url(&frame, self.jpeg_quality) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Snapshot still could not be encoded: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let (faces, embedding) = futures::join!(
            self.analyzer.detect_faces(&frame),
            self.analyzer.extract_embedding(&frame)
        );

        let mut record = classify_snapshot(faces, embedding, &self.reference, self.threshold);
        record.image = image;

        match record.status {
            VerificationStatus::Verified => debug!("📸 Snapshot verified ({:?})", record.similarity),
            VerificationStatus::Error => warn!("📸 Snapshot check failed: {:?}", record.detail),
            status => info!("📸 Snapshot flagged: {:?}", status),
        }
        record
    }
}

/// Decides a snapshot's status from the two independent face checks.
///
/// More than one face wins over everything else. Otherwise any failure is an
/// `error`, an embedding is compared against `reference`, and no embedding is
/// `no_face`.
pub fn classify_snapshot(
    faces: Result<usize, FaceError>,
    embedding: Result<Option<Vec<f32>>, FaceError>,
    reference: &[f32],
    threshold: f32,
) -> VerificationRecord {
    if let Ok(count) = faces {
        if count > 1 {
            let mut record = VerificationRecord::new(VerificationStatus::MultipleFaces);
            record.detail = Some(format!("{} faces detected", count));
            record.embedding = embedding.ok().flatten();
            return record;
        }
    }

    if let Err(e) = faces {
        return VerificationRecord::failed(e.to_string());
    }

    let embedding = match embedding {
        Ok(Some(embedding)) => embedding,
        Ok(None) => return VerificationRecord::new(VerificationStatus::NoFace),
        Err(e) => return VerificationRecord::failed(e.to_string()),
    };

    match cosine_similarity(&embedding, reference) {
        Ok(similarity) => {
            let status = if similarity >= threshold {
                VerificationStatus::Verified
            } else {
                VerificationStatus::WrongPerson
            };
            let mut record = VerificationRecord::new(status);
            record.similarity = Some(similarity);
            record.embedding = Some(embedding);
            record
        }
        Err(e) => VerificationRecord::failed(e.to_string()),
    }
}
