use std::fmt;

use serde::{Deserialize, Serialize};

/// An identifier for signal providers.
///
/// This is essentially a newtype for a string.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub(crate) String);

impl ProviderId {
    /// Creates a new [`ProviderId`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deref the [`ProviderId`] to a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A credential used to authenticate against a provider.
///
/// The value never shows up in `Debug` output, so configs can be logged freely.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(pub String);

impl Secret {
    /// Returns the raw credential.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Picks the configured credential, falling back to the given environment variable.
    ///
    /// Empty values are treated as absent, both in the config and in the environment.
    pub fn resolve(configured: Option<&Secret>, env_var: &str) -> Option<Secret> {
        if let Some(secret) = configured.filter(|s| !s.0.trim().is_empty()) {
            return Some(secret.clone());
        }
        match std::env::var(env_var) {
            Ok(value) if !value.trim().is_empty() => {
                tracing::trace!(env_var, "Using provider credential from environment");
                Some(Secret(value))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(\"***\")")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_configured() {
        let configured = Secret::from("from-config");
        let resolved = Secret::resolve(Some(&configured), "PATH");
        assert_eq!(resolved, Some(configured));
    }

    #[test]
    fn test_resolve_falls_back_to_env() {
        // `PATH` is set in every sane environment
        let resolved = Secret::resolve(Some(&Secret::from("  ")), "PATH");
        assert!(resolved.is_some());

        let resolved = Secret::resolve(None, "SIGNALHUB_TEST_SURELY_NOT_SET");
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_provider_id_display() {
        let id = ProviderId::new("reddit");
        assert_eq!(id.to_string(), "reddit");
        assert_eq!(id.as_ref(), "reddit");
    }
}
