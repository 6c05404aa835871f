//! Identity session handling: token access, refresh, change notification.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{Mutex, watch};

use super::error::{ClientError, ErrorBody, api_error_message};
use super::session_store::{FileSessionStore, SessionStorage};

/// Seconds of slack before the recorded expiry at which a token already
/// counts as expired.
const EXPIRY_SKEW_SECS: i64 = 30;

/// One issued session: a bearer token plus the refresh token that renews it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp of expiry, when the identity service reported one.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl Session {
    /// Whether the access token is past (or within skew of) its deadline.
    /// Falls back to the JWT `exp` claim when the service did not report an
    /// expiry; unknown deadlines count as not expired and the 401 path
    /// handles them.
    pub fn is_expired(&self) -> bool {
        let deadline = self
            .expires_at
            .or_else(|| decode_jwt_exp(&self.access_token));
        match deadline {
            Some(exp) => Utc::now().timestamp() + EXPIRY_SKEW_SECS >= exp,
            None => false,
        }
    }
}

/// Best-effort read of the `exp` claim from a JWT payload. No signature
/// check; the client only needs the deadline.
pub fn decode_jwt_exp(token: &str) -> Option<i64> {
    #[derive(Deserialize)]
    struct Claims {
        exp: Option<i64>,
    }

    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice::<Claims>(&bytes).ok()?.exp
}

/// Token response of the identity service's refresh endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Process-wide session holder. Created once at startup and injected by
/// `Arc` into every consumer; all writes funnel through `refresh`/`load`
/// so the persisted copy and the change stream stay in step.
pub struct SessionManager {
    http: Client,
    base_url: String,
    anon_key: String,
    store: FileSessionStore,
    current: Mutex<Option<Session>>,
    changes: watch::Sender<bool>,
}

impl SessionManager {
    pub fn new(http: Client, base_url: &str, anon_key: &str, store: FileSessionStore) -> Self {
        let (changes, _) = watch::channel(false);
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            store,
            current: Mutex::new(None),
            changes,
        }
    }

    /// Load a previously persisted session, if any. Called once at startup.
    pub async fn load(&self) {
        if let Some(session) = self.store.get(&self.base_url).await {
            tracing::info!("session loaded from {}", self.store.path().display());
            *self.current.lock().await = Some(session);
            let _ = self.changes.send(true);
        } else {
            tracing::info!("no persisted session; requests go out unauthenticated");
        }
    }

    /// Stream of signed-in/out transitions for the UI.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.changes.subscribe()
    }

    pub async fn signed_in(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Bearer token to attach to the next request, refreshing first when the
    /// current one is known to be expired. A failed proactive refresh falls
    /// back to the stale token and lets the 401 path sort it out.
    pub async fn access_token(&self) -> Option<String> {
        let session = self.current.lock().await.clone()?;
        if session.is_expired() {
            tracing::info!("access token expired, refreshing before request");
            match self.refresh().await {
                Ok(fresh) => return Some(fresh.access_token),
                Err(e) => tracing::warn!("proactive refresh failed: {e}"),
            }
        }
        Some(session.access_token)
    }

    /// Exchange the refresh token for a new session, persist it, and notify
    /// subscribers. Exactly one refresh is attempted per call.
    pub async fn refresh(&self) -> Result<Session, ClientError> {
        let refresh_token = {
            let current = self.current.lock().await;
            match current.as_ref() {
                Some(s) => s.refresh_token.clone(),
                None => return Err(ClientError::Auth),
            }
        };

        let url = format!("{}/token?grant_type=refresh_token", self.base_url);
        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(15))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.json::<ErrorBody>().await.ok();
            tracing::error!("session refresh rejected: {}", status);
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: api_error_message(status, body),
            });
        }

        let token = resp
            .json::<TokenResponse>()
            .await
            .map_err(ClientError::from_reqwest)?;
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        let session = Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
        };

        if let Err(e) = self.store.set(&self.base_url, &session).await {
            // Persistence failure is not fatal; the in-memory session works.
            tracing::warn!("failed to persist refreshed session: {e}");
        }
        *self.current.lock().await = Some(session.clone());
        let _ = self.changes.send(true);
        tracing::info!("session refreshed");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_exp(exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
        format!("header.{payload}.signature")
    }

    #[test]
    fn decodes_exp_claim() {
        assert_eq!(decode_jwt_exp(&jwt_with_exp(1_234_567_890)), Some(1_234_567_890));
        assert_eq!(decode_jwt_exp("not-a-jwt"), None);
        assert_eq!(decode_jwt_exp("a.%%%.c"), None);
    }

    #[test]
    fn expiry_uses_recorded_deadline_or_jwt_claim() {
        let past = Utc::now().timestamp() - 60;
        let future = Utc::now().timestamp() + 3600;

        let expired = Session {
            access_token: "opaque".into(),
            refresh_token: "r".into(),
            expires_at: Some(past),
        };
        assert!(expired.is_expired());

        let valid = Session {
            access_token: "opaque".into(),
            refresh_token: "r".into(),
            expires_at: Some(future),
        };
        assert!(!valid.is_expired());

        // No recorded expiry: fall back to the JWT claim.
        let from_jwt = Session {
            access_token: jwt_with_exp(past),
            refresh_token: "r".into(),
            expires_at: None,
        };
        assert!(from_jwt.is_expired());

        // Unknown deadline counts as not expired.
        let unknown = Session {
            access_token: "opaque".into(),
            refresh_token: "r".into(),
            expires_at: None,
        };
        assert!(!unknown.is_expired());
    }
}
