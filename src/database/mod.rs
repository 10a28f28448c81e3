pub mod models;
pub mod postgres;
pub mod rest;

pub use models::{AssessmentResult, DisciplineCount, VerificationLog};
pub use postgres::DatabaseManager;
pub use rest::RestBackend;

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use thiserror::Error;

use crate::assessment::{build_question_set, Question, QuestionRecord};
use crate::config::AppConfig;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid result payload: {0}")]
    InvalidPayload(String),
    #[error("Backend rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Read side of the question bank.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn fetch_questions(&self, discipline: &str) -> Result<Vec<QuestionRecord>>;
}

/// Write-once persistence of a finished assessment.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn submit_result(&self, result: &AssessmentResult) -> Result<()>;
}

/// Fetches the bank for `discipline` and turns it into a session question set.
pub async fn load_question_set(
    source: &dyn QuestionSource,
    discipline: &str,
    subcategories: &[String],
) -> Result<Vec<Question>> {
    let records = source.fetch_questions(discipline).await?;
    let fetched = records.len();
    let questions = build_question_set(records, subcategories);
    info!(
        "📚 Loaded {} of {} question(s) for discipline {}",
        questions.len(),
        fetched,
        discipline
    );
    Ok(questions)
}

/// REST backend when one is configured, otherwise PostgreSQL.
pub async fn connect_backend(config: &AppConfig) -> Result<(Arc<dyn QuestionSource>, Arc<dyn ResultSink>)> {
    if let Some(url) = &config.backend.rest_url {
        let backend = Arc::new(RestBackend::new(url, config.backend.api_key.clone())?);
        let source: Arc<dyn QuestionSource> = backend.clone();
        let sink: Arc<dyn ResultSink> = backend;
        return Ok((source, sink));
    }

    let db = Arc::new(DatabaseManager::new(&config.database).await?);
    let source: Arc<dyn QuestionSource> = db.clone();
    let sink: Arc<dyn ResultSink> = db;
    Ok((source, sink))
}
