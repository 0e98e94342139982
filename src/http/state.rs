//! Shared request state.

use std::sync::Arc;

use crate::credentials::CredentialResolver;
use crate::mcp::McpClient;
use crate::GlobalConfig;

/// State shared by every HTTP handler. Read-only after startup.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Module invoker.
    pub client: McpClient,
    /// Credential lookup.
    pub resolver: Arc<CredentialResolver>,
}

impl AppState {
    /// Assemble state from configuration and a resolver.
    #[must_use]
    pub fn new(config: GlobalConfig, resolver: CredentialResolver) -> Self {
        let client = McpClient::new(config.runner.clone());
        Self {
            config: Arc::new(config),
            client,
            resolver: Arc::new(resolver),
        }
    }
}
