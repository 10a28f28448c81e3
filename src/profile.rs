use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

const PROFILE_FILE: &str = "profile.json";

/// Candidate state kept on this machine between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalProfile {
    pub reference_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub subcategories: Vec<String>,
    pub enrolled_at: Option<DateTime<Utc>>,
}

impl LocalProfile {
    pub fn has_reference(&self) -> bool {
        self.reference_embedding.as_ref().map_or(false, |e| !e.is_empty())
    }
}

pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(PROFILE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means a fresh profile.
    pub fn load(&self) -> Result<LocalProfile> {
        if !self.path.exists() {
            info!("No local profile at {}, starting empty", self.path.display());
            return Ok(LocalProfile::default());
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read profile {}", self.path.display()))?;
        let profile: LocalProfile = serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt profile {}", self.path.display()))?;

        if !profile.has_reference() {
            warn!("⚠️ Local profile has no enrolled reference embedding");
        }
        Ok(profile)
    }

    pub fn save(&self, profile: &LocalProfile) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_string_pretty(profile)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    pub fn enroll_reference(&self, embedding: Vec<f32>) -> Result<LocalProfile> {
        if embedding.is_empty() {
            return Err(anyhow!("Cannot enroll an empty embedding"));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("Embedding contains non-finite values"));
        }

        let mut profile = self.load()?;
        profile.reference_embedding = Some(embedding);
        profile.enrolled_at = Some(Utc::now());
        self.save(&profile)?;
        info!(
            "✅ Reference embedding enrolled ({} dimensions)",
            profile.reference_embedding.as_ref().map_or(0, Vec::len)
        );
        Ok(profile)
    }

    pub fn set_subcategories(&self, subcategories: Vec<String>) -> Result<LocalProfile> {
        let mut profile = self.load()?;
        profile.subcategories = subcategories;
        self.save(&profile)?;
        Ok(profile)
    }
}
