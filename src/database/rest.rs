use async_trait::async_trait;
use log::{error, info};
use reqwest::{Client, RequestBuilder, Response};
use url::Url;
use validator::Validate;

use super::models::AssessmentResult;
use super::{DatabaseError, QuestionSource, Result, ResultSink};
use crate::assessment::QuestionRecord;

/// Hosted backend reached over its table REST API (`/rest/v1/<table>`).
pub struct RestBackend {
    client: Client,
    base: Url,
    api_key: Option<String>,
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Invalid backend URL {}: {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: Client::new(),
            base,
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.base
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| DatabaseError::RequestFailed(e.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!("Backend returned {}: {}", status, body);
        Err(DatabaseError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl QuestionSource for RestBackend {
    async fn fetch_questions(&self, discipline: &str) -> Result<Vec<QuestionRecord>> {
        let mut url = self.table_url("questions")?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("discipline", &format!("eq.{}", discipline));

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| DatabaseError::RequestFailed(format!("Question fetch failed: {}", e)))?;

        let records: Vec<QuestionRecord> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DatabaseError::RequestFailed(format!("Failed to parse questions: {}", e)))?;

        Ok(records)
    }
}

#[async_trait]
impl ResultSink for RestBackend {
    async fn submit_result(&self, result: &AssessmentResult) -> Result<()> {
        result
            .validate()
            .map_err(|e| DatabaseError::InvalidPayload(e.to_string()))?;

        let response = self
            .authorize(self.client.post(self.table_url("results")?))
            .header("Prefer", "return=minimal")
            .json(result)
            .send()
            .await
            .map_err(|e| DatabaseError::RequestFailed(format!("Result submission failed: {}", e)))?;

        Self::check(response).await?;
        info!("💾 Result for {} submitted to backend (score {})", result.email, result.score);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_keeps_base_path() {
        let backend = RestBackend::new("https://example.test/api", None).unwrap();
        assert_eq!(
            backend.table_url("results").unwrap().as_str(),
            "https://example.test/api/rest/v1/results"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            RestBackend::new("not a url", None),
            Err(DatabaseError::ConnectionFailed(_))
        ));
    }
}
