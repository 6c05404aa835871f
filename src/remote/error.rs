//! Error taxonomy for the remote service clients.

use thiserror::Error;

/// Failure of a remote call. Every variant propagates to the caller; nothing
/// is swallowed inside the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure (DNS, connection refused, broken body).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request exceeded its deadline. Often means the backend is still
    /// waking up.
    #[error("Request timed out")]
    Timeout,

    /// The backend explicitly rejected the request.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// 401 persisting after one refresh-and-retry. Requires signing in again.
    #[error("Session expired. Please sign in again.")]
    Auth,
}

impl ClientError {
    /// Map a reqwest error, keeping timeouts distinguishable.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err)
        }
    }

}

/// Error body convention of the job API: `{"message": "..."}` with every
/// field optional.
#[derive(Debug, serde::Deserialize)]
pub struct ErrorBody {
    pub message: Option<String>,
}

/// Pick the user-facing message for a failed response: the backend's message
/// when present, otherwise the HTTP status text.
pub fn api_error_message(status: reqwest::StatusCode, body: Option<ErrorBody>) -> String {
    body.and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            format!(
                "API Error: {}",
                status.canonical_reason().unwrap_or("request failed")
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn prefers_backend_message() {
        let msg = api_error_message(
            StatusCode::BAD_REQUEST,
            Some(ErrorBody {
                message: Some("title is required".into()),
            }),
        );
        assert_eq!(msg, "title is required");
    }

    #[test]
    fn falls_back_to_status_text() {
        // Absent body.
        assert_eq!(
            api_error_message(StatusCode::NOT_FOUND, None),
            "API Error: Not Found"
        );
        // Unparseable/empty message.
        assert_eq!(
            api_error_message(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(ErrorBody { message: None })
            ),
            "API Error: Internal Server Error"
        );
    }

    #[test]
    fn timeouts_keep_their_own_variant() {
        let err = ClientError::Timeout;
        assert_eq!(err.to_string(), "Request timed out");
    }
}
