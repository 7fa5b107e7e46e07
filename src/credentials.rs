#[cfg(test)]
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};

pub const ACCESS_TOKEN_ACCOUNT: &str = "map-access-token";

/// Source of the access token used for map creation and geocoding.
///
/// Providers are queried on every initialization attempt and every outbound
/// lookup; implementations must not assume the result is cached.
pub trait CredentialProvider: Send + Sync {
    fn effective_token(&self) -> Option<SecretString>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn effective_token(&self) -> Option<SecretString> {
        self().filter(|v| !v.trim().is_empty()).map(SecretString::from)
    }
}

#[derive(Clone, Default)]
pub struct StaticToken {
    token: Option<SecretString>,
}

impl StaticToken {
    pub fn new(token: Option<SecretString>) -> Self {
        Self { token }
    }
}

impl CredentialProvider for StaticToken {
    fn effective_token(&self) -> Option<SecretString> {
        self.token
            .as_ref()
            .filter(|t| !t.expose_secret().trim().is_empty())
            .cloned()
    }
}

/// Prefers the primary provider, falling back when it has nothing to offer.
#[derive(Clone)]
pub struct FallbackCredentials {
    primary: Arc<dyn CredentialProvider>,
    fallback: Arc<dyn CredentialProvider>,
}

impl FallbackCredentials {
    pub fn new(primary: Arc<dyn CredentialProvider>, fallback: Arc<dyn CredentialProvider>) -> Self {
        Self { primary, fallback }
    }
}

impl CredentialProvider for FallbackCredentials {
    fn effective_token(&self) -> Option<SecretString> {
        match self.primary.effective_token() {
            Some(token) => Some(token),
            None => {
                debug!(target: "credentials", "primary provider empty; using fallback");
                self.fallback.effective_token()
            }
        }
    }
}

/// User-supplied access token kept in the OS keychain.
#[derive(Clone)]
pub struct TokenVault {
    service_name: String,
    account: String,
    backend: VaultBackend,
}

#[derive(Clone)]
enum VaultBackend {
    Keyring,
    #[cfg(test)]
    Memory(Arc<Mutex<HashMap<String, SecretString>>>),
}

impl TokenVault {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account: ACCESS_TOKEN_ACCOUNT.to_string(),
            backend: VaultBackend::Keyring,
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            service_name: "in-memory".to_string(),
            account: ACCESS_TOKEN_ACCOUNT.to_string(),
            backend: VaultBackend::Memory(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    pub fn store_token(&self, token: &SecretString) -> AppResult<()> {
        if token.expose_secret().trim().is_empty() {
            return Err(AppError::Config("refusing to store a blank access token".into()));
        }
        match &self.backend {
            VaultBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, &self.account)?;
                entry.set_password(token.expose_secret())?;
            }
            #[cfg(test)]
            VaultBackend::Memory(store) => {
                store.lock().insert(self.account.clone(), token.clone());
            }
        }
        info!(
            target: "credentials",
            service = %self.service_name,
            account = %self.account,
            "stored access token in secure backend"
        );
        Ok(())
    }

    pub fn clear(&self) -> AppResult<()> {
        match &self.backend {
            VaultBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, &self.account)?;
                match entry.delete_password() {
                    Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                    Err(err) => Err(AppError::from(err)),
                }
            }
            #[cfg(test)]
            VaultBackend::Memory(store) => {
                store.lock().remove(&self.account);
                Ok(())
            }
        }
    }

    pub fn has_token(&self) -> AppResult<bool> {
        self.token().map(|token| token.is_some())
    }

    pub fn token(&self) -> AppResult<Option<SecretString>> {
        match &self.backend {
            VaultBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, &self.account)?;
                match entry.get_password() {
                    Ok(value) => Ok(Some(SecretString::from(value))),
                    Err(keyring::Error::NoEntry) => Ok(None),
                    Err(err) => Err(AppError::from(err)),
                }
            }
            #[cfg(test)]
            VaultBackend::Memory(store) => Ok(store.lock().get(&self.account).cloned()),
        }
    }
}

impl CredentialProvider for TokenVault {
    fn effective_token(&self) -> Option<SecretString> {
        match self.token() {
            Ok(token) => token,
            Err(err) => {
                warn!(
                    target: "credentials",
                    ?err,
                    service = %self.service_name,
                    "failed to read access token from secure backend"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_provider_treats_blank_as_missing() {
        let blank = || Some("   ".to_string());
        let present = || Some("pk.abc".to_string());
        assert!(blank.effective_token().is_none());
        assert_eq!(present.effective_token().unwrap().expose_secret(), "pk.abc");
    }

    #[test]
    fn vault_round_trips_and_clears_token() {
        let vault = TokenVault::in_memory();
        assert!(!vault.has_token().unwrap());
        assert!(vault.effective_token().is_none());

        vault.store_token(&SecretString::from("pk.user".to_string())).unwrap();
        assert!(vault.has_token().unwrap());
        assert_eq!(vault.effective_token().unwrap().expose_secret(), "pk.user");

        vault.clear().unwrap();
        assert!(vault.effective_token().is_none());
    }

    #[test]
    fn vault_rejects_blank_token() {
        let vault = TokenVault::in_memory();
        assert!(vault.store_token(&SecretString::from(" ".to_string())).is_err());
    }

    #[test]
    fn fallback_prefers_user_token() {
        let vault = TokenVault::in_memory();
        let default = StaticToken::new(Some(SecretString::from("pk.default".to_string())));
        let effective = FallbackCredentials::new(Arc::new(vault.clone()), Arc::new(default));

        assert_eq!(effective.effective_token().unwrap().expose_secret(), "pk.default");
        vault.store_token(&SecretString::from("pk.user".to_string())).unwrap();
        assert_eq!(effective.effective_token().unwrap().expose_secret(), "pk.user");
    }
}
