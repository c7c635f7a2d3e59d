//! Login methods, per-request credential injection and the session login
//! handshake.

use crate::errors::ApiClientError;
use crate::hooks::HookChain;
use crate::otp::Totp;
use crate::response::{normalize, RawResponse};
use reqwest::blocking::RequestBuilder;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, REFERER, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

pub const CLIENT_USER_AGENT: &str = "CloudSigma turlo client";
pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrftoken");
pub const OTP_HEADER: HeaderName = HeaderName::from_static("otp");

/// Query parameters of a single call.
pub type QueryParams<'a> = HashMap<&'a str, String>;

/// How credentials are attached to requests.
/// Parsed case-insensitively, from config as well as from strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum LoginMethod {
    /// HTTP basic auth on every request.
    #[default]
    Basic,
    /// Cookie session opened by a login call, plus CSRF and OTP headers.
    Session,
    /// No credentials.
    None,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Basic => "basic",
            LoginMethod::Session => "session",
            LoginMethod::None => "none",
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginMethod {
    type Err = ApiClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(LoginMethod::Basic),
            "session" => Ok(LoginMethod::Session),
            "none" => Ok(LoginMethod::None),
            other => Err(ApiClientError::Config(config::ConfigError::Message(format!(
                "Invalid value '{other}' for login_method"
            )))),
        }
    }
}

impl TryFrom<String> for LoginMethod {
    type Error = ApiClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Everything attached to one outgoing request. Built fresh for every call.
#[derive(Debug)]
pub struct RequestContext {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub basic_auth: Option<(String, String)>,
    pub hooks: HookChain,
}

impl RequestContext {
    /// Context with the JSON content type and the client user agent.
    pub fn new(query: Option<&QueryParams<'_>>, hooks: HookChain) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let mut query: Vec<(String, String)> = query
            .map(|params| {
                params
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        query.sort();

        RequestContext {
            headers,
            query,
            basic_auth: None,
            hooks,
        }
    }

    pub fn insert_header(&mut self, name: HeaderName, value: &str) -> Result<(), ApiClientError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiClientError::InvalidHeader(format!("{name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub(crate) fn apply(&self, mut builder: RequestBuilder) -> RequestBuilder {
        builder = builder.headers(self.headers.clone());
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some((username, password)) = &self.basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }
        builder
    }
}

/// Attaches login-method specific credentials to a request.
pub trait CredentialStrategy: Send + Sync + fmt::Debug {
    fn login_method(&self) -> LoginMethod;

    fn augment(&self, ctx: &mut RequestContext) -> Result<(), ApiClientError>;
}

#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl CredentialStrategy for BasicAuth {
    fn login_method(&self) -> LoginMethod {
        LoginMethod::Basic
    }

    fn augment(&self, ctx: &mut RequestContext) -> Result<(), ApiClientError> {
        ctx.basic_auth = Some((self.username.clone(), self.password.clone()));
        Ok(())
    }
}

/// Credentials of an authenticated cookie session.
///
/// The session cookies themselves live in the transport's cookie store.
#[derive(Debug, Clone)]
pub struct SessionAuth {
    csrf_token: String,
    referer: String,
    otp: Option<Totp>,
}

impl SessionAuth {
    pub fn new(csrf_token: impl Into<String>, referer: impl Into<String>, otp: Option<Totp>) -> Self {
        Self {
            csrf_token: csrf_token.into(),
            referer: referer.into(),
            otp,
        }
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn referer(&self) -> &str {
        &self.referer
    }
}

impl CredentialStrategy for SessionAuth {
    fn login_method(&self) -> LoginMethod {
        LoginMethod::Session
    }

    fn augment(&self, ctx: &mut RequestContext) -> Result<(), ApiClientError> {
        ctx.insert_header(CSRF_HEADER, &self.csrf_token)?;
        ctx.insert_header(REFERER, &self.referer)?;
        // Codes expire, so one is computed for every request.
        if let Some(otp) = &self.otp {
            ctx.insert_header(OTP_HEADER, &otp.now())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl CredentialStrategy for NoAuth {
    fn login_method(&self) -> LoginMethod {
        LoginMethod::None
    }

    fn augment(&self, _ctx: &mut RequestContext) -> Result<(), ApiClientError> {
        Ok(())
    }
}

/// Body of `POST /accounts/action/?do=login`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Unauthenticated,
    LoggingIn,
    Authenticated,
    Failed,
}

/// One-shot session login handshake.
#[derive(Debug)]
pub struct SessionLogin {
    username: String,
    password: String,
    otp: Option<Totp>,
    state: LoginState,
}

impl SessionLogin {
    pub fn new(username: impl Into<String>, password: impl Into<String>, otp: Option<Totp>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            otp,
            state: LoginState::Unauthenticated,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Moves to `LoggingIn` and returns the payload to post.
    pub fn start(&mut self) -> LoginPayload {
        self.state = LoginState::LoggingIn;
        debug!(username = %self.username, otp = self.otp.is_some(), "Logging in");
        LoginPayload {
            username: self.username.clone(),
            password: self.password.clone(),
            otp: self.otp.as_ref().map(Totp::now),
        }
    }

    /// Consumes the login response. Any error, from the transport or from the
    /// response status, is terminal.
    pub fn finish(
        &mut self,
        response: Result<&RawResponse, ApiClientError>,
        referer: String,
    ) -> Result<SessionAuth, ApiClientError> {
        match self.authenticate(response, referer) {
            Ok(session) => {
                self.state = LoginState::Authenticated;
                debug!(username = %self.username, "Session login succeeded");
                Ok(session)
            }
            Err(err) => {
                self.state = LoginState::Failed;
                warn!(username = %self.username, error = %err, "Session login failed");
                Err(err)
            }
        }
    }

    fn authenticate(
        &mut self,
        response: Result<&RawResponse, ApiClientError>,
        referer: String,
    ) -> Result<SessionAuth, ApiClientError> {
        let response = response?;
        normalize(response, false)?;
        let csrf_token = response
            .cookie(CSRF_COOKIE)
            .ok_or(ApiClientError::MissingCsrfToken)?;
        Ok(SessionAuth::new(csrf_token, referer, self.otp.take()))
    }
}
