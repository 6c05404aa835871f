//! Object-storage client: PDF upload and download-URL resolution.

use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::error::{ClientError, ErrorBody, api_error_message};
use super::session::SessionManager;
use crate::config::StorageCfg;

/// Uploads are slower than API calls; give them a generous deadline.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Response of the signing endpoint.
#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// Thin client for the storage collaborator.
#[derive(Clone)]
pub struct StorageClient {
    http: Client,
    base_url: String,
    bucket: String,
    public_bucket: bool,
    signed_url_expiry_secs: u64,
    session: Arc<SessionManager>,
}

impl StorageClient {
    pub fn new(http: Client, cfg: &StorageCfg, session: Arc<SessionManager>) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            bucket: cfg.bucket.clone(),
            public_bucket: cfg.public_bucket,
            signed_url_expiry_secs: cfg.signed_url_expiry_secs,
            session,
        }
    }

    /// Upload a PDF and return its object path within the bucket.
    pub async fn upload_pdf(&self, filename: &str, bytes: Vec<u8>) -> Result<String, ClientError> {
        // A fresh path per upload keeps filenames from colliding.
        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("pdf");
        let object_path = format!("uploads/{}.{}", Uuid::new_v4(), ext);

        let url = format!(
            "{}/object/{}/{}",
            self.base_url,
            urlencoding::encode(&self.bucket),
            encode_object_path(&object_path)
        );
        tracing::info!("uploading {} ({} bytes) to {}", filename, bytes.len(), object_path);

        let mut req = self
            .http
            .post(&url)
            .timeout(UPLOAD_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes);
        if let Some(token) = self.session.access_token().await {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(ClientError::from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.json::<ErrorBody>().await.ok();
            let message = api_error_message(status, body);
            tracing::error!("upload failed: {status}: {message}");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(object_path)
    }

    /// Resolve an externally reachable URL for an uploaded object: the
    /// public URL for public buckets, otherwise a time-bounded signed URL.
    pub async fn resolve_url(&self, object_path: &str) -> Result<String, ClientError> {
        if self.public_bucket {
            return Ok(format!(
                "{}/object/public/{}/{}",
                self.base_url,
                urlencoding::encode(&self.bucket),
                encode_object_path(object_path)
            ));
        }

        let url = format!(
            "{}/object/sign/{}/{}",
            self.base_url,
            urlencoding::encode(&self.bucket),
            encode_object_path(object_path)
        );
        let mut req = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(15))
            .json(&serde_json::json!({ "expiresIn": self.signed_url_expiry_secs }));
        if let Some(token) = self.session.access_token().await {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(ClientError::from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.json::<ErrorBody>().await.ok();
            let message = api_error_message(status, body);
            tracing::error!("signing failed: {status}: {message}");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let signed = resp
            .json::<SignResponse>()
            .await
            .map_err(ClientError::from_reqwest)?;
        // The service returns a path relative to its base URL.
        Ok(format!(
            "{}{}",
            self.base_url,
            ensure_leading_slash(&signed.signed_url)
        ))
    }
}

/// Encode each path segment while keeping the separators.
fn encode_object_path(path: &str) -> String {
    path.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths_keep_separators_and_escape_segments() {
        assert_eq!(encode_object_path("uploads/a.pdf"), "uploads/a.pdf");
        assert_eq!(
            encode_object_path("uploads/my report.pdf"),
            "uploads/my%20report.pdf"
        );
    }

    #[test]
    fn signed_url_paths_are_joined_with_one_slash() {
        assert_eq!(ensure_leading_slash("/object/sign/x"), "/object/sign/x");
        assert_eq!(ensure_leading_slash("object/sign/x"), "/object/sign/x");
    }
}
