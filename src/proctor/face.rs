use async_trait::async_trait;
use base64::Engine;
use image::RgbaImage;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use super::frame::encode_jpeg;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("Face detection failed: {0}")]
    Detection(String),
    #[error("Embedding extraction failed: {0}")]
    Embedding(String),
    #[error("Embedding has {actual} dimensions, reference has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Embedding is empty or has zero magnitude")]
    Degenerate,
    #[error("Face service request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Face detection and embedding boundary.
#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    async fn detect_faces(&self, frame: &RgbaImage) -> Result<usize, FaceError>;

    /// `Ok(None)` when no face could be embedded.
    async fn extract_embedding(&self, frame: &RgbaImage) -> Result<Option<Vec<f32>>, FaceError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, FaceError> {
    if a.len() != b.len() {
        return Err(FaceError::DimensionMismatch {
            expected: b.len(),
            actual: a.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if a.is_empty() || norm_a == 0.0 || norm_b == 0.0 || !dot.is_finite() {
        return Err(FaceError::Degenerate);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

#[derive(Deserialize)]
struct DetectResponse {
    faces: usize,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Option<Vec<f32>>,
}

/// `FaceAnalyzer` backed by an HTTP face service exposing `/detect` and
/// `/embed`, both taking a base64 JPEG.
pub struct RemoteFaceAnalyzer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    jpeg_quality: u8,
}

impl RemoteFaceAnalyzer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, jpeg_quality: u8) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            jpeg_quality,
        }
    }

    async fn post(&self, route: &str, frame: &RgbaImage) -> Result<reqwest::Response, FaceError> {
        let jpeg = encode_jpeg(frame, self.jpeg_quality).map_err(|e| FaceError::Detection(e.to_string()))?;
        let body = json!({
            "image": base64::engine::general_purpose::STANDARD.encode(jpeg),
        });

        let mut request = self.client.post(format!("{}/{}", self.endpoint, route)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response)
    }
}

#[async_trait]
impl FaceAnalyzer for RemoteFaceAnalyzer {
    async fn detect_faces(&self, frame: &RgbaImage) -> Result<usize, FaceError> {
        let parsed: DetectResponse = self.post("detect", frame).await?.json().await?;
        debug!("Face service detected {} face(s)", parsed.faces);
        Ok(parsed.faces)
    }

    async fn extract_embedding(&self, frame: &RgbaImage) -> Result<Option<Vec<f32>>, FaceError> {
        let parsed: EmbedResponse = self.post("embed", frame).await?.json().await?;
        match parsed.embedding {
            Some(embedding) if embedding.is_empty() => {
                Err(FaceError::Embedding("service returned an empty embedding".to_string()))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_basics() {
        let same = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((same - 1.0).abs() < 1e-6);

        let orthogonal = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(orthogonal.abs() < 1e-6);

        let opposite = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((opposite + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_rejects_bad_input() {
        assert!(matches!(
            cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]),
            Err(FaceError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(cosine_similarity(&[], &[]), Err(FaceError::Degenerate)));
        assert!(matches!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), Err(FaceError::Degenerate)));
    }
}
