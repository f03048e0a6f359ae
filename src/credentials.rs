//! Credential readiness gate.
//!
//! The workflow never looks up the API key on its own. It asks a
//! [`CredentialGate`] whether a key is selected and asks it to open a picker
//! when one is not, so hosts can plug in their own key-selection UI.

use crate::error::{CartoonifyError, Result};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Environment variables checked for an API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Host capability for checking and selecting the API credential.
#[async_trait]
pub trait CredentialGate: Send + Sync {
    /// Returns true if a usable credential is currently selected.
    async fn has_selected_key(&self) -> Result<bool>;

    /// Opens the host's credential picker. Fails if it cannot be opened.
    async fn open_select_key(&self) -> Result<()>;
}

/// Shared, swappable API key.
///
/// The credential gate writes it and the provider reads it on every request,
/// so a key picked mid-session takes effect on the next attempt.
#[derive(Clone, Default)]
pub struct ApiKey {
    inner: Arc<RwLock<Option<String>>>,
}

impl ApiKey {
    /// Creates a slot holding the given key.
    pub fn new(key: impl Into<String>) -> Self {
        let slot = Self::default();
        slot.set(key);
        slot
    }

    /// Creates a slot from the first non-empty [`API_KEY_ENV_VARS`] entry.
    pub fn from_env() -> Self {
        let slot = Self::default();
        if let Some(key) = env_key(&API_KEY_ENV_VARS) {
            slot.set(key);
        }
        slot
    }

    /// Returns the current key.
    pub fn get(&self) -> Option<String> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    /// Replaces the current key. Blank keys clear the slot.
    pub fn set(&self, key: impl Into<String>) {
        let key = key.into();
        let key = key.trim();
        if let Ok(mut guard) = self.inner.write() {
            *guard = (!key.is_empty()).then(|| key.to_string());
        }
    }

    /// Removes the current key.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }

    /// Returns true if a key is present.
    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

/// Returns the first non-empty value among the named environment variables.
fn env_key<S: AsRef<str>>(vars: &[S]) -> Option<String> {
    vars.iter()
        .filter_map(|name| std::env::var(name.as_ref()).ok())
        .find(|value| !value.trim().is_empty())
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_set() { "<redacted>" } else { "<unset>" };
        f.debug_tuple("ApiKey").field(&state).finish()
    }
}

/// Interactive picker: returns the chosen key, or `None` when cancelled.
pub type KeyPicker = Arc<dyn Fn() -> Result<Option<String>> + Send + Sync>;

/// Credential gate backed by an [`ApiKey`] slot and the process environment.
///
/// Without a picker, "opening the picker" means reading the environment again.
/// The previous key is dropped first, so a key the server rejected is only
/// kept if the environment still holds it.
pub struct EnvCredentials {
    key: ApiKey,
    picker: Option<KeyPicker>,
    env_vars: Vec<String>,
}

impl EnvCredentials {
    /// Creates a gate over the given key slot.
    pub fn new(key: ApiKey) -> Self {
        Self {
            key,
            picker: None,
            env_vars: API_KEY_ENV_VARS.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Attaches an interactive picker. It runs on the blocking thread pool.
    pub fn with_picker(mut self, picker: KeyPicker) -> Self {
        self.picker = Some(picker);
        self
    }

    /// Replaces the environment variables consulted for a key.
    pub fn with_env_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_vars = vars.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the key slot this gate manages.
    pub fn key(&self) -> &ApiKey {
        &self.key
    }

    fn env_hint(&self) -> &str {
        self.env_vars
            .first()
            .map(String::as_str)
            .unwrap_or(API_KEY_ENV_VARS[0])
    }

    fn reselect_from_env(&self) -> Result<()> {
        let previous = self.key.get();
        self.key.clear();

        match env_key(&self.env_vars) {
            None => Err(CartoonifyError::Dialog(format!(
                "no key picker available; set {}",
                self.env_hint()
            ))),
            Some(fresh) if previous.as_deref() == Some(fresh.trim()) => {
                self.key.set(fresh);
                Err(CartoonifyError::Dialog(format!(
                    "{} still holds the same key",
                    self.env_hint()
                )))
            }
            Some(fresh) => {
                self.key.set(fresh);
                tracing::debug!("API key reloaded from environment");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CredentialGate for EnvCredentials {
    async fn has_selected_key(&self) -> Result<bool> {
        if !self.key.is_set() {
            if let Some(key) = env_key(&self.env_vars) {
                self.key.set(key);
            }
        }
        Ok(self.key.is_set())
    }

    async fn open_select_key(&self) -> Result<()> {
        let Some(picker) = self.picker.clone() else {
            return self.reselect_from_env();
        };

        let picked = tokio::task::spawn_blocking(move || picker())
            .await
            .map_err(|e| CartoonifyError::Dialog(e.to_string()))??;

        match picked {
            Some(key) if !key.trim().is_empty() => {
                self.key.set(key);
                tracing::debug!("API key selected");
                Ok(())
            }
            _ => Err(CartoonifyError::Dialog("key selection cancelled".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_set_and_clear() {
        let key = ApiKey::default();
        assert!(!key.is_set());

        key.set("  abc  ");
        assert_eq!(key.get().as_deref(), Some("abc"));

        key.set("   ");
        assert!(!key.is_set());

        key.set("xyz");
        key.clear();
        assert_eq!(key.get(), None);
    }

    #[test]
    fn test_api_key_clones_share_slot() {
        let key = ApiKey::default();
        let other = key.clone();
        key.set("shared");
        assert_eq!(other.get().as_deref(), Some("shared"));
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("secret-value");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("secret-value"));
        assert!(debug.contains("redacted"));
    }

    #[tokio::test]
    async fn test_explicit_key_is_ready() {
        let gate = EnvCredentials::new(ApiKey::new("test-key"))
            .with_env_vars(["CARTOONIFY_TEST_UNSET_KEY"]);
        assert!(gate.has_selected_key().await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_slot_is_filled_from_env() {
        std::env::set_var("CARTOONIFY_TEST_FILL_KEY", "env-key");
        let gate =
            EnvCredentials::new(ApiKey::default()).with_env_vars(["CARTOONIFY_TEST_FILL_KEY"]);
        assert!(gate.has_selected_key().await.unwrap());
        assert_eq!(gate.key().get().as_deref(), Some("env-key"));
    }

    #[tokio::test]
    async fn test_reselect_without_env_key_drops_old_key() {
        let gate = EnvCredentials::new(ApiKey::new("rejected"))
            .with_env_vars(["CARTOONIFY_TEST_MISSING_KEY"]);
        let err = gate.open_select_key().await.unwrap_err();
        assert!(matches!(err, CartoonifyError::Dialog(_)));
        assert!(err.to_string().contains("CARTOONIFY_TEST_MISSING_KEY"));
        assert_eq!(gate.key().get(), None);
    }

    #[tokio::test]
    async fn test_reselect_with_unchanged_env_key_fails() {
        std::env::set_var("CARTOONIFY_TEST_SAME_KEY", "same-key");
        let gate = EnvCredentials::new(ApiKey::new("same-key"))
            .with_env_vars(["CARTOONIFY_TEST_SAME_KEY"]);
        let err = gate.open_select_key().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not open key selection: CARTOONIFY_TEST_SAME_KEY still holds the same key"
        );
    }

    #[tokio::test]
    async fn test_reselect_picks_up_new_env_key() {
        std::env::set_var("CARTOONIFY_TEST_NEW_KEY", "new-key");
        let gate = EnvCredentials::new(ApiKey::new("old-key"))
            .with_env_vars(["CARTOONIFY_TEST_NEW_KEY"]);
        gate.open_select_key().await.unwrap();
        assert_eq!(gate.key().get().as_deref(), Some("new-key"));
    }

    #[tokio::test]
    async fn test_picker_sets_key() {
        let gate = EnvCredentials::new(ApiKey::default())
            .with_picker(Arc::new(|| Ok(Some("picked-key".to_string()))));
        gate.open_select_key().await.unwrap();
        assert_eq!(gate.key().get().as_deref(), Some("picked-key"));
    }

    #[tokio::test]
    async fn test_cancelled_picker_is_dialog_error() {
        let gate = EnvCredentials::new(ApiKey::default()).with_picker(Arc::new(|| Ok(None)));
        let err = gate.open_select_key().await.unwrap_err();
        assert!(matches!(err, CartoonifyError::Dialog(_)));
    }

    #[tokio::test]
    async fn test_failing_picker_propagates_error() {
        let gate = EnvCredentials::new(ApiKey::default()).with_picker(Arc::new(|| {
            Err(CartoonifyError::Dialog("no terminal".into()))
        }));
        let err = gate.open_select_key().await.unwrap_err();
        assert_eq!(err.to_string(), "could not open key selection: no terminal");
    }
}
