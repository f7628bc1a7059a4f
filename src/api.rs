use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::config::ApiConfig;
use crate::credentials::CredentialStore;
use crate::error::{ResolutionError, SubmissionError};
use crate::session::SessionMetrics;

/// Metrics block of the submission request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub top_speed: f64,
    pub distance: f64,
    pub elevation_gain: f64,
    pub duration: u64,
}

/// Body of `POST /sessions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    #[serde(rename = "sessionData")]
    pub session_data: SessionData,
    #[serde(rename = "runID")]
    pub run_id: String,
    #[serde(rename = "mountainID")]
    pub mountain_id: String,
}

impl SubmissionPayload {
    pub fn from_metrics(metrics: &SessionMetrics, run_id: String, mountain_id: String) -> Self {
        Self {
            session_data: SessionData {
                top_speed: metrics.top_speed,
                distance: metrics.total_distance_meters,
                elevation_gain: metrics.current_elevation_meters,
                duration: metrics.elapsed_seconds,
            },
            run_id,
            mountain_id,
        }
    }
}

/// Body of `POST /alerts`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub latitude: f64,
    pub longitude: f64,
}

/// Receives frozen session metrics
pub trait RunSubmitter: Send + Sync {
    fn submit(
        &self,
        payload: &SubmissionPayload,
    ) -> impl Future<Output = Result<(), SubmissionError>> + Send;
}

/// Maps a human-readable route name to the backend's run id
pub trait RouteResolver: Send + Sync {
    fn resolve(
        &self,
        mountain_id: &str,
        route_name: &str,
    ) -> impl Future<Output = Result<String, ResolutionError>> + Send;
}

/// Fire-and-forget inactivity alert delivery
pub trait AlertSink: Send + Sync {
    fn dispatch(&self, alert: AlertPayload);
}

/// Submission succeeds on `201 Created` only
pub fn check_submission_status(status: u16) -> Result<(), SubmissionError> {
    if status == 201 {
        Ok(())
    } else {
        Err(SubmissionError::UnexpectedStatus(status))
    }
}

/// Extract the run id from a resolve response. Accepts string or numeric ids.
pub fn parse_run_id(body: &str) -> Result<String, ResolutionError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ResolutionError::Malformed(e.to_string()))?;
    match value.get("runID") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ResolutionError::Malformed(
            "response has no runID field".to_string(),
        )),
    }
}

/// HTTP client for the tracking backend
///
/// # Endpoints
/// - `GET  {base}/runs/resolve?name=..&mountainID=..` returns `{ "runID": .. }`
/// - `POST {base}/sessions` with `SubmissionPayload`, expects 201
/// - `POST {base}/alerts` with `AlertPayload`, response only logged
///
/// All requests carry the stored bearer token.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        ApiClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl RunSubmitter for ApiClient {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmissionError> {
        let token = self
            .credentials
            .auth_token()
            .ok_or(SubmissionError::MissingToken)?;

        let response = self
            .client
            .post(self.url("sessions"))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmissionError::Timeout
                } else {
                    SubmissionError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        log::info!("[api] session submission for run {} returned {}", payload.run_id, status);
        check_submission_status(status)
    }
}

impl RouteResolver for ApiClient {
    async fn resolve(&self, mountain_id: &str, route_name: &str) -> Result<String, ResolutionError> {
        let token = self
            .credentials
            .auth_token()
            .ok_or(ResolutionError::MissingToken)?;

        let response = self
            .client
            .get(self.url("runs/resolve"))
            .bearer_auth(token)
            .query(&[("name", route_name), ("mountainID", mountain_id)])
            .send()
            .await
            .map_err(|e| ResolutionError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ResolutionError::NotFound(route_name.to_string()));
        } else if !status.is_success() {
            return Err(ResolutionError::UnexpectedStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ResolutionError::Transport(format!("Failed to read response: {}", e)))?;
        parse_run_id(&body)
    }
}

impl AlertSink for ApiClient {
    fn dispatch(&self, alert: AlertPayload) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                log::warn!("[api] no runtime to send inactivity alert, dropping it");
                return;
            }
        };

        let request = self.client.post(self.url("alerts")).json(&alert);
        let request = match self.credentials.auth_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        runtime.spawn(async move {
            match request.send().await {
                Ok(response) => log::info!(
                    "[api] inactivity alert at {:.5},{:.5} sent ({})",
                    alert.latitude,
                    alert.longitude,
                    response.status()
                ),
                Err(e) => log::warn!("[api] inactivity alert failed: {}", e),
            }
        });
    }
}
