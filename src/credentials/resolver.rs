//! Per-user, per-provider credential resolution.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::config::{CredentialConfig, ProviderConfig};
use crate::persistence::connection_repo::ConnectionRepo;
use crate::{AppError, Result};

use super::keychain::{env_secret, keychain_secret};

/// What a provider needs before its module may be spawned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequirements {
    /// Fields that must be present.
    pub required: Vec<String>,
    /// Field to exported environment variable.
    pub env_map: BTreeMap<String, String>,
}

impl From<&ProviderConfig> for TokenRequirements {
    fn from(provider: &ProviderConfig) -> Self {
        Self {
            required: provider.required.clone(),
            env_map: provider.env_map.clone(),
        }
    }
}

/// Resolved tokens and the environment derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCredentials {
    /// Token field to value; never contains blank values.
    pub tokens: HashMap<String, String>,
    /// Environment variable to value for every mapped field present.
    pub environment: HashMap<String, String>,
}

impl ResolvedCredentials {
    /// The `access_token` field, if resolved.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.tokens.get("access_token").map(String::as_str)
    }
}

/// Looks up tokens in the connection store, then the keychain, then the
/// process environment.
///
/// Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    store: Option<ConnectionRepo>,
    keychain_service: Option<String>,
}

impl CredentialResolver {
    /// Create a resolver over an optional store.
    #[must_use]
    pub fn new(store: Option<ConnectionRepo>, config: &CredentialConfig) -> Self {
        Self {
            store,
            keychain_service: config
                .use_keychain
                .then(|| config.keychain_service.clone()),
        }
    }

    /// Resolve tokens for `user_id` and `provider`.
    ///
    /// # Errors
    ///
    /// - `AppError::Credential` naming every required field that is still
    ///   missing after all sources are consulted.
    /// - `AppError::Config` if a keychain lookup task panics.
    pub async fn resolve(
        &self,
        user_id: &str,
        provider: &str,
        requirements: &TokenRequirements,
    ) -> Result<ResolvedCredentials> {
        let mut tokens = self.stored_tokens(user_id, provider).await;

        for (field, var) in &requirements.env_map {
            if tokens.contains_key(field) {
                continue;
            }
            if let Some(value) = self.fallback(var).await? {
                debug!(provider, field = field.as_str(), var = var.as_str(), "token filled from fallback");
                tokens.insert(field.clone(), value);
            }
        }

        let missing: Vec<String> = requirements
            .required
            .iter()
            .filter(|field| !tokens.contains_key(*field))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Credential {
                provider: provider.to_owned(),
                missing,
            });
        }

        let environment = requirements
            .env_map
            .iter()
            .filter_map(|(field, var)| tokens.get(field).map(|v| (var.clone(), v.clone())))
            .collect();

        Ok(ResolvedCredentials {
            tokens,
            environment,
        })
    }

    async fn stored_tokens(&self, user_id: &str, provider: &str) -> HashMap<String, String> {
        let Some(store) = &self.store else {
            debug!(provider, "no connection store configured");
            return HashMap::new();
        };

        match store.find(user_id, provider).await {
            Ok(Some(conn)) => conn
                .token_fields()
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
            Ok(None) => {
                debug!(user_id, provider, "no stored connection");
                HashMap::new()
            }
            Err(err) => {
                warn!(user_id, provider, error = %err, "connection store lookup failed");
                HashMap::new()
            }
        }
    }

    async fn fallback(&self, var: &str) -> Result<Option<String>> {
        if let Some(service) = &self.keychain_service {
            if let Some(value) = keychain_secret(service, var).await? {
                return Ok(Some(value));
            }
        }
        Ok(env_secret(var))
    }
}
