//! OS keychain and environment lookups.

use std::env;

use tracing::{debug, warn};

use crate::{AppError, Result};

/// Read one secret from the OS keychain.
///
/// Returns `Ok(None)` when the entry is absent, empty, or the keychain is
/// unavailable; only a panicked lookup task is an error.
///
/// # Errors
///
/// Returns `AppError::Config` if the blocking lookup task panics.
pub async fn keychain_secret(service: &str, key: &str) -> Result<Option<String>> {
    let service_owned = service.to_owned();
    let key_owned = key.to_owned();

    // keyring is synchronous I/O.
    let lookup = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(&service_owned, &key_owned).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match lookup {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value)),
        Ok(_) => {
            warn!(service, key, "keychain entry is empty, trying env var");
            Ok(None)
        }
        Err(keyring::Error::NoEntry) => {
            debug!(service, key, "no keychain entry, trying env var");
            Ok(None)
        }
        Err(err) => {
            warn!(service, key, ?err, "keychain lookup failed, trying env var");
            Ok(None)
        }
    }
}

/// Read a non-blank environment variable.
#[must_use]
pub fn env_secret(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
