use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Error, Debug)]
pub enum ApiClientError {
    /// 401: credentials missing, invalid or expired.
    #[error("Auth Error: Server responded with status {status} (request id: {request_id:?})")]
    Auth {
        status: StatusCode,
        request_id: Option<String>,
    },

    /// 403: authenticated but not allowed.
    #[error("Permission Error: Server responded with status {status}: {body}")]
    Permission {
        status: StatusCode,
        body: String,
        request_id: Option<String>,
    },

    /// Any other 4xx.
    #[error("Client Error: Server responded with status {status}: {body}")]
    Client {
        status: StatusCode,
        body: String,
        request_id: Option<String>,
    },

    /// 5xx.
    #[error("Server Error: Server responded with status {status}: {body}")]
    Server {
        status: StatusCode,
        body: String,
        request_id: Option<String>,
    },

    /// 1xx and 3xx, which the API never answers with on purpose.
    #[error("HTTP Error: Unexpected status {status}: {body}")]
    UnexpectedStatus {
        status: StatusCode,
        body: String,
        request_id: Option<String>,
    },

    #[error("Configuration Error: Invalid base URL: {0}")]
    BaseUrlInvalid(#[from] UrlParseError),

    #[error("Configuration Error: Failed to build HTTP client: {0}")]
    HttpClientBuildFailed(reqwest::Error),

    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration Error: Invalid one-time password secret: {0}")]
    InvalidOtpSecret(String),

    #[error("Configuration Error: No client registered under '{0}'")]
    UnknownClient(String),

    #[error("Configuration Error: No WebSocket endpoint configured")]
    MissingWsEndpoint,

    #[error("Request Error: Failed to build or send the request: {0}")]
    RequestFailed(reqwest::Error),

    #[error("Request Error: Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Network Error: Connection or timeout issue: {0}")]
    NetworkIssue(reqwest::Error),

    #[error("Login Error: Login response did not set a csrftoken cookie")]
    MissingCsrfToken,

    #[error("Response Error: Failed to (de)serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket Error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("WebSocket Error: Handshake failed: {0}")]
    WebSocketHandshake(String),

    #[error("WebSocket Error: Connection closed by peer")]
    WebSocketClosed,

    #[error("Timeout Error: No message received within {0:?}")]
    Timeout(Duration),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiClientError {
    /// Maps a transport failure, keeping connect and timeout failures apart.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ApiClientError::NetworkIssue(err)
        } else {
            ApiClientError::RequestFailed(err)
        }
    }

    /// HTTP status for errors classified from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiClientError::Auth { status, .. }
            | ApiClientError::Permission { status, .. }
            | ApiClientError::Client { status, .. }
            | ApiClientError::Server { status, .. }
            | ApiClientError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Value of the `X-REQUEST-ID` response header, when the server sent one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ApiClientError::Auth { request_id, .. }
            | ApiClientError::Permission { request_id, .. }
            | ApiClientError::Client { request_id, .. }
            | ApiClientError::Server { request_id, .. }
            | ApiClientError::UnexpectedStatus { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Raw response body. 401 errors carry none.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiClientError::Permission { body, .. }
            | ApiClientError::Client { body, .. }
            | ApiClientError::Server { body, .. }
            | ApiClientError::UnexpectedStatus { body, .. } => Some(body),
            _ => None,
        }
    }

    /// True for errors derived from an HTTP status code.
    pub fn is_classified(&self) -> bool {
        self.status().is_some()
    }
}
