use crate::auth::{
    BasicAuth, CredentialStrategy, LoginMethod, NoAuth, QueryParams, RequestContext, SessionLogin,
};
use crate::config::ClientConfig;
use crate::endpoint;
use crate::errors::ApiClientError;
use crate::hooks::{parse_log_level, HookChain, RecordedRequest, ResponseHook};
use crate::otp::Totp;
use crate::response::{normalize, NormalizedResponse, RawResponse};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, Level};
use url::Url;

/// Login action, relative to the API endpoint.
pub const LOGIN_PATH: &str = "/accounts/action/";

/// Object-safe verb surface shared by every client implementation.
pub trait RestApi: Send {
    fn get(
        &mut self,
        path: &str,
        query_params: Option<&QueryParams<'_>>,
        return_list: bool,
    ) -> Result<NormalizedResponse, ApiClientError>;

    fn put(
        &mut self,
        path: &str,
        data: &Value,
        query_params: Option<&QueryParams<'_>>,
        return_list: bool,
    ) -> Result<NormalizedResponse, ApiClientError>;

    fn post(
        &mut self,
        path: &str,
        data: &Value,
        query_params: Option<&QueryParams<'_>>,
        return_list: bool,
    ) -> Result<NormalizedResponse, ApiClientError>;

    fn delete(
        &mut self,
        path: &str,
        query_params: Option<&QueryParams<'_>>,
    ) -> Result<NormalizedResponse, ApiClientError>;

    fn last_response(&self) -> Option<&RawResponse>;
}

/// Handles all low level HTTP, authentication, parsing and error handling.
///
/// Not meant to be shared between threads: each call records the raw
/// response in the client.
pub struct GenericClient {
    config: ClientConfig,
    base_url: Url,
    http_client: reqwest::blocking::Client,
    credentials: Box<dyn CredentialStrategy>,
    log_level: Option<Level>,
    response_hook: Option<Arc<dyn ResponseHook>>,
    last_response: Option<RawResponse>,
}

impl GenericClient {
    /// Builds the client. Under session login this performs the login call
    /// and fails if it does.
    pub fn new(config: ClientConfig) -> Result<Self, ApiClientError> {
        let base_url = config.endpoint_url()?;

        // The session transport keeps the login cookies.
        let http_client = reqwest::blocking::Client::builder()
            .timeout(config.timeout()?)
            .cookie_store(config.login_method == LoginMethod::Session)
            .build()
            .map_err(ApiClientError::HttpClientBuildFailed)?;

        let log_level = config.request_log_level.as_deref().and_then(|name| {
            let level = parse_log_level(name);
            if level.is_none() {
                error!(log_level = name, "Wrong request log level");
            }
            level
        });

        let credentials: Box<dyn CredentialStrategy> = match config.login_method {
            LoginMethod::Basic => Box::new(BasicAuth::new(&config.username, &config.password)),
            LoginMethod::Session | LoginMethod::None => Box::new(NoAuth),
        };

        let mut client = GenericClient {
            config,
            base_url,
            http_client,
            credentials,
            log_level,
            response_hook: None,
            last_response: None,
        };

        if client.config.login_method == LoginMethod::Session {
            client.login_session()?;
        }
        Ok(client)
    }

    fn login_session(&mut self) -> Result<(), ApiClientError> {
        let otp = self.config.otp_secret().map(Totp::from_base32).transpose()?;
        let referer = endpoint::resolve(&self.base_url, "/")?.to_string();

        let mut login = SessionLogin::new(&self.config.username, &self.config.password, otp);
        let body = serde_json::to_string(&login.start())?;

        let mut query = QueryParams::new();
        query.insert("do", "login".to_string());
        let response = self.send(Method::POST, LOGIN_PATH, Some(&query), Some(body));
        let session = login.finish(response, referer)?;

        self.credentials = Box::new(session);
        Ok(())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn login_method(&self) -> LoginMethod {
        self.credentials.login_method()
    }

    /// Installs a hook run after the request-log hook on every call.
    pub fn set_response_hook(&mut self, hook: Arc<dyn ResponseHook>) {
        self.response_hook = Some(hook);
    }

    /// The raw response of the most recent call.
    pub fn last_response(&self) -> Option<&RawResponse> {
        self.last_response.as_ref()
    }

    pub fn get(
        &mut self,
        path: &str,
        query_params: Option<&QueryParams<'_>>,
        return_list: bool,
    ) -> Result<NormalizedResponse, ApiClientError> {
        let response = self.send(Method::GET, path, query_params, None)?;
        normalize(response, return_list)
    }

    pub fn put<T: Serialize + ?Sized>(
        &mut self,
        path: &str,
        data: &T,
        query_params: Option<&QueryParams<'_>>,
        return_list: bool,
    ) -> Result<NormalizedResponse, ApiClientError> {
        let body = serde_json::to_string(data)?;
        let response = self.send(Method::PUT, path, query_params, Some(body))?;
        normalize(response, return_list)
    }

    pub fn post<T: Serialize + ?Sized>(
        &mut self,
        path: &str,
        data: &T,
        query_params: Option<&QueryParams<'_>>,
        return_list: bool,
    ) -> Result<NormalizedResponse, ApiClientError> {
        let body = serde_json::to_string(data)?;
        let response = self.send(Method::POST, path, query_params, Some(body))?;
        normalize(response, return_list)
    }

    pub fn delete(
        &mut self,
        path: &str,
        query_params: Option<&QueryParams<'_>>,
    ) -> Result<NormalizedResponse, ApiClientError> {
        let response = self.send(Method::DELETE, path, query_params, None)?;
        normalize(response, false)
    }

    pub fn build_url(&self, path: &str) -> Result<Url, ApiClientError> {
        endpoint::resolve(&self.base_url, path)
    }

    fn send(
        &mut self,
        method: Method,
        path: &str,
        query_params: Option<&QueryParams<'_>>,
        body: Option<String>,
    ) -> Result<&RawResponse, ApiClientError> {
        let url = self.build_url(path)?;
        let hooks = HookChain::new(self.log_level, self.response_hook.clone());
        let mut ctx = RequestContext::new(query_params, hooks);
        self.credentials.augment(&mut ctx)?;

        let mut builder = ctx.apply(self.http_client.request(method, url));
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let request = builder.build().map_err(ApiClientError::RequestFailed)?;
        let recorded = RecordedRequest::capture(&request);
        debug!(method = %recorded.method, url = %request.url(), "Sending request");

        let response = self
            .http_client
            .execute(request)
            .map_err(ApiClientError::from_transport)?;
        let response = RawResponse::read(response)?;
        debug!(status = %response.status, url = %response.url, "Response received");

        ctx.hooks.run(&recorded, &response);
        Ok(self.last_response.insert(response))
    }
}

impl std::fmt::Debug for GenericClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericClient")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl RestApi for GenericClient {
    fn get(
        &mut self,
        path: &str,
        query_params: Option<&QueryParams<'_>>,
        return_list: bool,
    ) -> Result<NormalizedResponse, ApiClientError> {
        GenericClient::get(self, path, query_params, return_list)
    }

    fn put(
        &mut self,
        path: &str,
        data: &Value,
        query_params: Option<&QueryParams<'_>>,
        return_list: bool,
    ) -> Result<NormalizedResponse, ApiClientError> {
        GenericClient::put(self, path, data, query_params, return_list)
    }

    fn post(
        &mut self,
        path: &str,
        data: &Value,
        query_params: Option<&QueryParams<'_>>,
        return_list: bool,
    ) -> Result<NormalizedResponse, ApiClientError> {
        GenericClient::post(self, path, data, query_params, return_list)
    }

    fn delete(
        &mut self,
        path: &str,
        query_params: Option<&QueryParams<'_>>,
    ) -> Result<NormalizedResponse, ApiClientError> {
        GenericClient::delete(self, path, query_params)
    }

    fn last_response(&self) -> Option<&RawResponse> {
        GenericClient::last_response(self)
    }
}
