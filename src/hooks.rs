//! Response observation hooks.
//!
//! Every call runs a [`HookChain`]: the request-log hook (when a log level is
//! configured) followed by the caller's own hook.

use crate::response::RawResponse;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Method;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::Level;

/// What was sent, captured just before the request went out.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path plus query string.
    pub path_url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl RecordedRequest {
    pub(crate) fn capture(request: &reqwest::blocking::Request) -> Self {
        let url = request.url();
        let path_url = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        RecordedRequest {
            method: request.method().clone(),
            path_url,
            headers: request.headers().clone(),
            body: request
                .body()
                .and_then(|b| b.as_bytes())
                .map(<[u8]>::to_vec),
        }
    }
}

/// Observer invoked once per completed HTTP exchange.
pub trait ResponseHook: Send + Sync {
    fn on_response(&self, request: &RecordedRequest, response: &RawResponse);
}

impl<F> ResponseHook for F
where
    F: Fn(&RecordedRequest, &RawResponse) + Send + Sync,
{
    fn on_response(&self, request: &RecordedRequest, response: &RawResponse) {
        self(request, response)
    }
}

/// Parses a request log level name. `WARNING` and `CRITICAL` are accepted
/// as aliases of `WARN` and `ERROR`.
pub fn parse_log_level(name: &str) -> Option<Level> {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" | "CRITICAL" => Some(Level::ERROR),
        _ => None,
    }
}

/// Emits a reconstructed raw HTTP trace of each exchange.
#[derive(Debug, Clone, Copy)]
pub struct RequestLogHook {
    level: Level,
}

impl RequestLogHook {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl ResponseHook for RequestLogHook {
    fn on_response(&self, request: &RecordedRequest, response: &RawResponse) {
        let message = reconstruct_exchange(request, response);
        match self.level {
            Level::TRACE => tracing::trace!("{message}"),
            Level::DEBUG => tracing::debug!("{message}"),
            Level::INFO => tracing::info!("{message}"),
            Level::WARN => tracing::warn!("{message}"),
            _ => tracing::error!("{message}"),
        }
    }
}

fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if name == AUTHORIZATION {
                Cow::Borrowed("***")
            } else {
                String::from_utf8_lossy(value.as_bytes())
            };
            format!("{name}: {value}")
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Approximates the raw request and response as they went over the wire.
pub fn reconstruct_exchange(request: &RecordedRequest, response: &RawResponse) -> String {
    let request_body = request
        .body
        .as_deref()
        .map(String::from_utf8_lossy)
        .unwrap_or_default();
    format!(
        "-----RECONSTRUCTED-REQUEST:\n{} {} HTTP/1.1\r\n{}\r\n\r\n{}\n-----RECONSTRUCTED-REQUEST-END\n\n\
         -----RECONSTRUCTED-RESPONSE:\nHTTP/1.1 {} {}\r\n{}\r\n\r\n{}\n-----RECONSTRUCTED-RESPONSE-END",
        request.method,
        request.path_url,
        format_headers(&request.headers),
        request_body,
        response.status.as_u16(),
        response.status.canonical_reason().unwrap_or(""),
        format_headers(&response.headers),
        response.text(),
    )
}

/// Ordered list of hooks run after every call.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn ResponseHook>>,
}

impl HookChain {
    /// The log hook at `log_level`, if any, then `user_hook`.
    pub fn new(log_level: Option<Level>, user_hook: Option<Arc<dyn ResponseHook>>) -> Self {
        let mut chain = HookChain::default();
        if let Some(level) = log_level {
            chain.push(Arc::new(RequestLogHook::new(level)));
        }
        if let Some(hook) = user_hook {
            chain.push(hook);
        }
        chain
    }

    pub fn push(&mut self, hook: Arc<dyn ResponseHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn run(&self, request: &RecordedRequest, response: &RawResponse) {
        for hook in &self.hooks {
            hook.on_response(request, response);
        }
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
