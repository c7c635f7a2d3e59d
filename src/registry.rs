//! Named client factories.
//!
//! The `client` configuration key picks which implementation to build; every
//! implementation is registered up front under its key.

use crate::client::{GenericClient, RestApi};
use crate::config::ClientConfig;
use crate::errors::ApiClientError;
use std::collections::BTreeMap;
use tracing::debug;

/// Key of the built-in [`GenericClient`].
pub const DEFAULT_CLIENT: &str = "generic";

pub type ClientFactory = fn(ClientConfig) -> Result<Box<dyn RestApi>, ApiClientError>;

fn generic_factory(config: ClientConfig) -> Result<Box<dyn RestApi>, ApiClientError> {
    Ok(Box::new(GenericClient::new(config)?))
}

#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    factories: BTreeMap<String, ClientFactory>,
}

impl ClientRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the generic client under [`DEFAULT_CLIENT`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_CLIENT, generic_factory);
        registry
    }

    /// Registers `factory` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, factory: ClientFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Result<ClientFactory, ApiClientError> {
        self.factories
            .get(name)
            .copied()
            .ok_or_else(|| ApiClientError::UnknownClient(name.to_string()))
    }

    /// Builds the client named by `config.client`, or the generic one.
    pub fn create(&self, config: ClientConfig) -> Result<Box<dyn RestApi>, ApiClientError> {
        let name = config.client.clone().unwrap_or_else(|| DEFAULT_CLIENT.to_string());
        debug!(client = %name, "Creating API client");
        let factory = self.get(&name)?;
        factory(config)
    }
}
