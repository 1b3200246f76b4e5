//! Pluggable challenge-solver seam
//!
//! The engine never solves challenges computationally. A [`ChallengeSolver`]
//! either brokers a token from an external solving service or reports that
//! the attempt needs human follow-up. The default is [`ManualSolver`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::types::DefenseKind;

/// Everything a solver needs to know about one detected challenge.
#[derive(Debug, Clone)]
pub struct ChallengeContext {
    pub kind: DefenseKind,
    pub page_url: String,
    /// Site key scraped from the page, when the challenge exposes one.
    pub site_key: Option<String>,
}

/// Solver errors.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("API key not configured")]
    ApiKeyMissing,

    #[error("Solver API error: {0}")]
    ApiError(String),

    #[error("Task creation failed: {0}")]
    TaskCreationFailed(String),

    #[error("Solve timeout after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A challenge-token broker.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// Attempt to obtain a solve token. `Ok(None)` means the solver declines
    /// and the attempt should end as manual-required.
    async fn solve(&self, challenge: &ChallengeContext) -> Result<Option<String>, SolverError>;
}

/// Default solver: never solves, always defers to a human.
pub struct ManualSolver;

#[async_trait]
impl ChallengeSolver for ManualSolver {
    async fn solve(&self, challenge: &ChallengeContext) -> Result<Option<String>, SolverError> {
        info!(
            "Challenge {} on {} deferred to manual follow-up",
            challenge.kind.as_str(),
            challenge.page_url
        );
        Ok(None)
    }
}

// ========== Remote token service (2Captcha-compatible API) ==========

#[derive(Debug, Serialize)]
struct CreateTaskRequest {
    #[serde(rename = "clientKey")]
    client_key: String,
    task: SolverTask,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum SolverTask {
    #[serde(rename = "RecaptchaV2TaskProxyless")]
    RecaptchaV2Proxyless {
        #[serde(rename = "websiteURL")]
        website_url: String,
        #[serde(rename = "websiteKey")]
        website_key: String,
    },

    #[serde(rename = "HCaptchaTaskProxyless")]
    HCaptchaProxyless {
        #[serde(rename = "websiteURL")]
        website_url: String,
        #[serde(rename = "websiteKey")]
        website_key: String,
    },
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    #[serde(rename = "errorId")]
    error_id: i32,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "errorDescription")]
    error_description: Option<String>,
    #[serde(rename = "taskId")]
    task_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GetResultRequest {
    #[serde(rename = "clientKey")]
    client_key: String,
    #[serde(rename = "taskId")]
    task_id: i64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct GetResultResponse {
    #[serde(rename = "errorId")]
    error_id: i32,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "errorDescription")]
    error_description: Option<String>,
    status: Option<String>,
    solution: Option<Solution>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Solution {
    #[serde(rename = "gRecaptchaResponse")]
    g_recaptcha_response: Option<String>,
    token: Option<String>,
}

impl GetResultResponse {
    fn is_processing(&self) -> bool {
        self.status.as_deref() == Some("processing")
    }

    fn token(&self) -> Option<&str> {
        self.solution
            .as_ref()
            .and_then(|s| s.g_recaptcha_response.as_deref().or(s.token.as_deref()))
    }
}

/// Solver that brokers tokens from a 2Captcha-compatible HTTP API.
pub struct RemoteSolver {
    api_key: String,
    api_base: String,
    client: Client,
    poll_interval: Duration,
    max_solve_time: Duration,
}

impl RemoteSolver {
    pub fn new(api_key: &str) -> Result<Self, SolverError> {
        if api_key.is_empty() {
            return Err(SolverError::ApiKeyMissing);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SolverError::NetworkError(e.to_string()))?;

        Ok(Self {
            api_key: api_key.to_string(),
            api_base: "https://api.2captcha.com".to_string(),
            client,
            poll_interval: Duration::from_secs(5),
            max_solve_time: Duration::from_secs(120),
        })
    }

    /// Override the API endpoint (compatible services, tests).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_solve_time(mut self, timeout: Duration) -> Self {
        self.max_solve_time = timeout;
        self
    }

    fn task_for(&self, challenge: &ChallengeContext) -> Option<SolverTask> {
        let website_key = challenge.site_key.clone()?;
        match challenge.kind {
            DefenseKind::CaptchaRecaptcha => Some(SolverTask::RecaptchaV2Proxyless {
                website_url: challenge.page_url.clone(),
                website_key,
            }),
            DefenseKind::CaptchaHCaptcha => Some(SolverTask::HCaptchaProxyless {
                website_url: challenge.page_url.clone(),
                website_key,
            }),
            _ => None,
        }
    }

    async fn create_task(&self, task: SolverTask) -> Result<i64, SolverError> {
        let url = format!("{}/createTask", self.api_base);
        let request = CreateTaskRequest {
            client_key: self.api_key.clone(),
            task,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SolverError::NetworkError(e.to_string()))?;

        let result: CreateTaskResponse = response
            .json()
            .await
            .map_err(|e| SolverError::InvalidResponse(e.to_string()))?;

        if result.error_id != 0 {
            return Err(SolverError::TaskCreationFailed(format!(
                "errorId={}, code={}, desc={}",
                result.error_id,
                result.error_code.as_deref().unwrap_or("none"),
                result.error_description.as_deref().unwrap_or("none"),
            )));
        }

        result
            .task_id
            .ok_or_else(|| SolverError::InvalidResponse("No task ID in response".into()))
    }

    async fn get_result(&self, task_id: i64) -> Result<Option<String>, SolverError> {
        let url = format!("{}/getTaskResult", self.api_base);
        let request = GetResultRequest {
            client_key: self.api_key.clone(),
            task_id,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SolverError::NetworkError(e.to_string()))?;

        let result: GetResultResponse = response
            .json()
            .await
            .map_err(|e| SolverError::InvalidResponse(e.to_string()))?;

        if result.error_id != 0 {
            let message = result
                .error_description
                .or(result.error_code)
                .unwrap_or_else(|| format!("Error ID: {}", result.error_id));
            return Err(SolverError::ApiError(message));
        }

        if result.is_processing() {
            return Ok(None);
        }

        Ok(result.token().map(str::to_string))
    }
}

#[async_trait]
impl ChallengeSolver for RemoteSolver {
    async fn solve(&self, challenge: &ChallengeContext) -> Result<Option<String>, SolverError> {
        let Some(task) = self.task_for(challenge) else {
            // Cloudflare interstitials and text CAPTCHAs have no token API.
            debug!(
                "Remote solver has no task type for {} - deferring to manual",
                challenge.kind.as_str()
            );
            return Ok(None);
        };

        let start = Instant::now();
        let task_id = self.create_task(task).await?;
        debug!("Remote solver task created: ID={}", task_id);

        let deadline = Instant::now() + self.max_solve_time;
        loop {
            if Instant::now() > deadline {
                return Err(SolverError::Timeout(self.max_solve_time.as_secs()));
            }

            tokio::time::sleep(self.poll_interval).await;

            if let Some(token) = self.get_result(task_id).await? {
                info!(
                    "Challenge token obtained in {}ms for {}",
                    start.elapsed().as_millis(),
                    challenge.page_url
                );
                return Ok(Some(token));
            }
            debug!("Task {} still processing...", task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_solver_always_defers() {
        let challenge = ChallengeContext {
            kind: DefenseKind::CaptchaRecaptcha,
            page_url: "https://dir.example/submit".to_string(),
            site_key: Some("key".to_string()),
        };
        assert!(ManualSolver.solve(&challenge).await.unwrap().is_none());
    }

    #[test]
    fn test_remote_solver_rejects_empty_key() {
        assert!(matches!(RemoteSolver::new(""), Err(SolverError::ApiKeyMissing)));
    }

    #[test]
    fn test_remote_solver_skips_unsupported_kinds() {
        let solver = RemoteSolver::new("key").unwrap();
        let cloudflare = ChallengeContext {
            kind: DefenseKind::ChallengeCloudflare,
            page_url: "https://dir.example".to_string(),
            site_key: None,
        };
        assert!(solver.task_for(&cloudflare).is_none());

        let recaptcha_without_key = ChallengeContext {
            kind: DefenseKind::CaptchaRecaptcha,
            page_url: "https://dir.example".to_string(),
            site_key: None,
        };
        assert!(solver.task_for(&recaptcha_without_key).is_none());
    }
}
