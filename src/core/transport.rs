//! Classification of HTTP exchanges into typed outcomes.
//!
//! Every request the engine makes goes through [execute], which turns the raw
//! [Response] of an [AsyncHttpClient] into either the expected body or a
//! [TransportError].

use std::fmt;

use http::{request::Builder, Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::util::AsyncHttpClient;

pub const DPOP_NONCE_HEADER: &str = "dpop-nonce";

/// OAuth 2.0 style error body, shared by the authorization server and the
/// credential issuer endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_in: Option<u64>,
    /// Minimum wait, in seconds, before polling a deferred credential again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{} ({description})", self.error),
            None => self.error.fmt(f),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server demands a DPoP proof bound to this nonce.
    #[error("server requires DPoP nonce '{0}'")]
    UseDpopNonce(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    NetworkError(#[source] anyhow::Error),

    #[error("error response: {0}")]
    Response(ErrorResponse),

    #[error("unable to parse response body: {0}")]
    CannotParse(String),

    #[error("server error (status: {0})")]
    ServerError(StatusCode),
}

impl TransportError {
    /// The OAuth error code of a generic error response, if this is one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            TransportError::Response(e) => Some(&e.error),
            _ => None,
        }
    }
}

/// Attach `url` to `builder` and finish the request.
pub(crate) fn build_request(
    builder: Builder,
    url: &Url,
    body: Vec<u8>,
) -> Result<Request<Vec<u8>>, TransportError> {
    builder
        .uri(url.as_str())
        .body(body)
        .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))
}

/// Execute `request` and classify the response.
pub async fn execute<C, T>(client: &C, request: Request<Vec<u8>>) -> Result<T, TransportError>
where
    C: AsyncHttpClient + ?Sized,
    T: DeserializeOwned,
{
    let uri = request.uri().clone();
    let response = client
        .execute(request)
        .await
        .map_err(TransportError::NetworkError)?;
    debug!("{uri} responded with status {}", response.status());
    classify(response)
}

/// Classify an HTTP response.
///
/// - 4xx: a generic [ErrorResponse], unless a non-empty `dpop-nonce` header is
///   present, in which case [TransportError::UseDpopNonce].
/// - 5xx: [TransportError::ServerError].
/// - anything else: the expected body `T`.
pub fn classify<T: DeserializeOwned>(response: Response<Vec<u8>>) -> Result<T, TransportError> {
    let status = response.status();

    if status.is_client_error() {
        let dpop_nonce = response
            .headers()
            .get(DPOP_NONCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(ToOwned::to_owned);

        let body = response.into_body();
        let parsed = serde_json::from_slice::<ErrorResponse>(&body);

        if let Some(nonce) = dpop_nonce {
            return Err(TransportError::UseDpopNonce(nonce));
        }

        return match parsed {
            Ok(error) => Err(TransportError::Response(error)),
            Err(_) => Err(TransportError::CannotParse(
                String::from_utf8_lossy(&body).into_owned(),
            )),
        };
    }

    if status.is_server_error() {
        return Err(TransportError::ServerError(status));
    }

    let body = response.into_body();
    serde_json::from_slice(&body)
        .map_err(|_| TransportError::CannotParse(String::from_utf8_lossy(&body).into_owned()))
}
