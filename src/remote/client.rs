//! Job API client.

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::error::{ClientError, ErrorBody, api_error_message};
use super::session::SessionManager;
use crate::config::ApiCfg;
use crate::jobs::{CreateJobRequest, HealthStatus, Job, JobPage};
use crate::server_status::{ServerMonitor, ServerStatus};

/// Client for the remote job API. Every call stamps the availability
/// monitor, attaches the current bearer token, retries exactly once after a
/// session refresh on 401, and treats 5xx as a sign the server is asleep.
#[derive(Clone)]
pub struct JobApiClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    health_timeout: Duration,
    session: Arc<SessionManager>,
    monitor: Arc<ServerMonitor>,
    notices: mpsc::Sender<String>,
}

impl JobApiClient {
    pub fn new(
        http: Client,
        cfg: &ApiCfg,
        session: Arc<SessionManager>,
        monitor: Arc<ServerMonitor>,
        notices: mpsc::Sender<String>,
    ) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(cfg.timeout_ms),
            health_timeout: Duration::from_millis(cfg.health_timeout_ms),
            session,
            monitor,
            notices,
        }
    }

    /// Fetch one page of jobs.
    pub async fn list_jobs(&self, page: u32, limit: u32) -> Result<JobPage, ClientError> {
        let path = format!("/jobs?page={page}&limit={limit}");
        let resp = self
            .request(Method::GET, &path, None::<&()>, self.timeout)
            .await?;
        resp.json::<JobPage>()
            .await
            .map_err(ClientError::from_reqwest)
    }

    /// Fetch a single job by id.
    pub async fn get_job(&self, id: &str) -> Result<Job, ClientError> {
        let path = format!("/jobs/{}", urlencoding::encode(id));
        let resp = self
            .request(Method::GET, &path, None::<&()>, self.timeout)
            .await?;
        resp.json::<Job>().await.map_err(ClientError::from_reqwest)
    }

    /// Submit a new job.
    pub async fn create_job(&self, req: &CreateJobRequest) -> Result<Job, ClientError> {
        let resp = self
            .request(Method::POST, "/jobs", Some(req), self.timeout)
            .await?;
        resp.json::<Job>().await.map_err(ClientError::from_reqwest)
    }

    /// Delete a job. The backend answers 204 on success.
    pub async fn delete_job(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("/jobs/{}", urlencoding::encode(id));
        self.request(Method::DELETE, &path, None::<&()>, self.timeout)
            .await?;
        Ok(())
    }

    /// Health probe with its own short timeout, used by the availability
    /// sequences only.
    pub async fn check_health(&self) -> Result<HealthStatus, ClientError> {
        let resp = self
            .request(Method::GET, "/health", None::<&()>, self.health_timeout)
            .await?;
        resp.json::<HealthStatus>()
            .await
            .map_err(ClientError::from_reqwest)
    }

    /// Shared request path: stamp the monitor, attach auth, run the 401
    /// refresh-retry-once flow, map failures into the error taxonomy.
    async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<reqwest::Response, ClientError> {
        self.monitor.record_call();

        let token = self.session.access_token().await;
        let mut resp = self
            .send_once(method.clone(), path, body, timeout, token.as_deref())
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!("401 unauthorized, attempting to refresh session");
            match self.session.refresh().await {
                Ok(session) => {
                    // One retry with the refreshed credential, never more.
                    resp = self
                        .send_once(method, path, body, timeout, Some(&session.access_token))
                        .await?;
                }
                Err(e) => tracing::error!("session refresh failed: {e}"),
            }
            if resp.status() == StatusCode::UNAUTHORIZED {
                return Err(ClientError::Auth);
            }
        }

        let status = resp.status();
        if !status.is_success() {
            if status.is_server_error() {
                // Heuristic only: a 5xx usually means the hosted backend
                // went to sleep.
                self.monitor.set_status(ServerStatus::Offline);
                let _ = self
                    .notices
                    .try_send("Server is waking up. Please try again in 30 seconds.".into());
            }
            let body = resp.json::<ErrorBody>().await.ok();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: api_error_message(status, body),
            });
        }

        self.monitor.record_success();
        Ok(resp)
    }

    async fn send_once<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        timeout: Duration,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, &url)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req.send().await.map_err(ClientError::from_reqwest)
    }
}
