//! Authenticated HTTP/WebSocket client for the CloudSigma API.
//!
//! [`GenericClient`] resolves paths against the configured endpoint, attaches
//! credentials for the configured [`LoginMethod`], and turns responses into
//! either a [`NormalizedResponse`] or a classified [`ApiClientError`].
//! [`WebsocketClient`] reads the push-notification socket.

// Declare modules within this crate
pub mod auth;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod errors;
pub mod hooks;
pub mod otp;
pub mod registry;
pub mod response;
pub mod websocket;

// Re-export the main components for users of this crate
pub use crate::auth::{
    BasicAuth, CredentialStrategy, LoginMethod, LoginState, NoAuth, QueryParams, RequestContext,
    SessionAuth, SessionLogin,
};
pub use crate::client::{GenericClient, RestApi};
pub use crate::config::{ClientConfig, ClientOptions};
pub use crate::errors::ApiClientError;
pub use crate::hooks::{HookChain, RecordedRequest, RequestLogHook, ResponseHook};
pub use crate::otp::Totp;
pub use crate::registry::{ClientFactory, ClientRegistry, DEFAULT_CLIENT};
pub use crate::response::{normalize, NormalizedResponse, RawResponse};
pub use crate::websocket::WebsocketClient;
