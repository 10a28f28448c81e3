use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use log::{error, info};
use tokio_postgres::types::Json;
use tokio_postgres::NoTls;
use uuid::Uuid;
use validator::Validate;

use super::models::{AssessmentResult, DisciplineCount};
use super::{DatabaseError, QuestionSource, Result, ResultSink};
use crate::assessment::QuestionRecord;
use crate::config::DatabaseSettings;

#[derive(Debug)]
pub struct DatabaseManager {
    pool: Pool,
}

impl DatabaseManager {
    pub async fn new(settings: &DatabaseSettings) -> Result<Self> {
        info!(
            "Connecting to database: {}@{}:{}/{}",
            settings.user, settings.host, settings.port, settings.name
        );

        let mut cfg = Config::new();
        cfg.url = Some(settings.url());
        cfg.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Pool creation failed: {}", e)))?;

        // Test connection
        let _client = pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Connection test failed: {}", e)))?;

        info!("Database connection established successfully");

        Ok(DatabaseManager { pool })
    }

    pub async fn count_questions_by_discipline(&self) -> Result<Vec<DisciplineCount>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let rows = client
            .query(
                r#"
                SELECT COALESCE(discipline, '(none)'), COUNT(*)
                FROM questions
                GROUP BY 1
                ORDER BY 1
                "#,
                &[],
            )
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Failed to count questions: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| DisciplineCount {
                discipline: row.get(0),
                questions: row.get(1),
            })
            .collect())
    }
}

#[async_trait]
impl QuestionSource for DatabaseManager {
    async fn fetch_questions(&self, discipline: &str) -> Result<Vec<QuestionRecord>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let rows = client
            .query(
                r#"
                SELECT id::text, question, option_a, option_b, option_c, option_d,
                       correct_option, subject, discipline, timing::float8
                FROM questions
                WHERE discipline = $1
                ORDER BY created_at, id
                "#,
                &[&discipline],
            )
            .await
            .map_err(|e| {
                error!("Failed to fetch questions for {}: {}", discipline, e);
                DatabaseError::QueryFailed(format!("Failed to fetch questions: {}", e))
            })?;

        Ok(rows
            .iter()
            .map(|row| QuestionRecord {
                id: row.get(0),
                question: row.get(1),
                option_a: row.get(2),
                option_b: row.get(3),
                option_c: row.get(4),
                option_d: row.get(5),
                correct_option: row.get(6),
                subject: row.get(7),
                discipline: row.get(8),
                timing_minutes: row.get(9),
            })
            .collect())
    }
}

#[async_trait]
impl ResultSink for DatabaseManager {
    async fn submit_result(&self, result: &AssessmentResult) -> Result<()> {
        result
            .validate()
            .map_err(|e| DatabaseError::InvalidPayload(e.to_string()))?;

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let result_id = Uuid::new_v4();
        let subject_scores: serde_json::Value = serde_json::from_str(&result.subject_scores_json)
            .map_err(|e| DatabaseError::InvalidPayload(format!("subject scores: {}", e)))?;

        client
            .execute(
                r#"
                INSERT INTO results
                (id, email, score, subject_scores, discipline, question_count, verification_log, submitted_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
                &[
                    &result_id,
                    &result.email,
                    &(result.score as i32),
                    &subject_scores,
                    &result.discipline,
                    &(result.question_count as i32),
                    &Json(&result.verification_log),
                    &result.submitted_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to insert assessment result: {}", e);
                DatabaseError::QueryFailed(format!("Failed to insert result: {}", e))
            })?;

        info!("💾 Stored result {} for {} (score {})", result_id, result.email, result.score);
        Ok(())
    }
}
