//! Client configuration.
//!
//! Values are layered: the TOML config file, then `CLOUDSIGMA_*` environment
//! variables, then explicit [`ClientOptions`], which always win.

use crate::auth::LoginMethod;
use crate::errors::ApiClientError;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "CLOUDSIGMA_CONFIG";
/// Config file looked up in the home directory.
pub const DEFAULT_CONFIG_FILE: &str = ".cloudsigma.conf";
const ENV_PREFIX: &str = "CLOUDSIGMA";
const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub api_endpoint: String,
    #[serde(default)]
    pub ws_endpoint: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Base32 one-time password secret.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub login_method: LoginMethod,
    #[serde(default)]
    pub request_log_level: Option<String>,
    /// Registry key of the client implementation to build.
    #[serde(default)]
    pub client: Option<String>,
    /// Request timeout in seconds; fractions are allowed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

/// Explicit values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub api_endpoint: Option<String>,
    pub ws_endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub secret: Option<String>,
    pub login_method: Option<LoginMethod>,
    pub request_log_level: Option<String>,
    pub client: Option<String>,
    pub timeout_secs: Option<f64>,
}

impl ClientOptions {
    fn apply(
        self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ApiClientError> {
        Ok(builder
            .set_override_option("api_endpoint", self.api_endpoint)?
            .set_override_option("ws_endpoint", self.ws_endpoint)?
            .set_override_option("username", self.username)?
            .set_override_option("password", self.password)?
            .set_override_option("secret", self.secret)?
            .set_override_option("login_method", self.login_method.map(|m| m.as_str()))?
            .set_override_option("request_log_level", self.request_log_level)?
            .set_override_option("client", self.client)?
            .set_override_option("timeout_secs", self.timeout_secs.map(|t| t.to_string()))?)
    }
}

impl ClientConfig {
    pub fn new(
        api_endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            ws_endpoint: None,
            username: username.into(),
            password: password.into(),
            secret: None,
            login_method: LoginMethod::default(),
            request_log_level: None,
            client: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_login_method(mut self, login_method: LoginMethod) -> Self {
        self.login_method = login_method;
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_ws_endpoint(mut self, ws_endpoint: impl Into<String>) -> Self {
        self.ws_endpoint = Some(ws_endpoint.into());
        self
    }

    pub fn with_request_log_level(mut self, level: impl Into<String>) -> Self {
        self.request_log_level = Some(level.into());
        self
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Loads the process-wide configuration: the file named by
    /// `CLOUDSIGMA_CONFIG`, or `~/.cloudsigma.conf` if present.
    pub fn load(options: ClientOptions) -> Result<Self, ApiClientError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE)));
        Self::build(path.as_deref(), false, options)
    }

    /// Loads configuration from `path`, which must exist.
    pub fn from_file(path: &Path, options: ClientOptions) -> Result<Self, ApiClientError> {
        Self::build(Some(path), true, options)
    }

    fn build(
        path: Option<&Path>,
        required: bool,
        options: ClientOptions,
    ) -> Result<Self, ApiClientError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading client configuration");
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(required),
            );
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("_"));
        let config: ClientConfig = options.apply(builder)?.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn endpoint_url(&self) -> Result<Url, ApiClientError> {
        Ok(Url::parse(&self.api_endpoint)?)
    }

    /// The OTP secret, treating an empty value as unset.
    pub fn otp_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// The request timeout. Zero, negative and non-finite values are rejected.
    pub fn timeout(&self) -> Result<Duration, ApiClientError> {
        Duration::try_from_secs_f64(self.timeout_secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| {
                ApiClientError::Config(config::ConfigError::Message(format!(
                    "Invalid value '{}' for timeout_secs",
                    self.timeout_secs
                )))
            })
    }
}
