//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::realtime::Hub;
use crate::services::auth::AuthService;
use crate::services::chat::ChatService;
use crate::services::notifier::Notifier;
use crate::services::token::TokenSigner;
use crate::store::Store;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the record store, the socket hub, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    store: Store,
    hub: Hub,
    tokens: TokenSigner,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: ServerConfig, store: Store) -> Self {
        let hub = Hub::new(config.ws_channel_capacity);
        let tokens = TokenSigner::new(config.jwt_secret.clone(), config.token_ttl);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                hub,
                tokens,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the record store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Get a reference to the WebSocket hub.
    #[must_use]
    pub fn hub(&self) -> &Hub {
        &self.inner.hub
    }

    /// Get a reference to the bearer token signer.
    #[must_use]
    pub fn tokens(&self) -> &TokenSigner {
        &self.inner.tokens
    }

    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.store())
    }

    #[must_use]
    pub fn notifier(&self) -> Notifier<'_> {
        Notifier::new(self.hub())
    }

    #[must_use]
    pub fn chat(&self) -> ChatService<'_> {
        ChatService::new(self.store(), self.hub())
    }
}
