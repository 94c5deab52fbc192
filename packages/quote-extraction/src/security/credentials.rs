//! Provider API keys.
//!
//! Keys live in a `secrecy` box and only leave it through [`SecretString::expose`]
//! at request time. Formatting a key, or anything holding one, prints
//! `[REDACTED]`; [`SecretString::hint`] gives a loggable prefix for telling
//! keys apart.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// Visible leading characters in [`SecretString::hint`].
const HINT_PREFIX: usize = 4;

/// An API key that never prints.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// The raw key, for building a request header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// First characters plus length, e.g. `AIza*** (39 chars)`.
    ///
    /// Keys too short to keep anything hidden show no prefix.
    pub fn hint(&self) -> String {
        let key = self.expose();
        let chars = key.chars().count();
        let shown: String = if chars > HINT_PREFIX * 2 {
            key.chars().take(HINT_PREFIX).collect()
        } else {
            String::new()
        };
        format!("{shown}*** ({chars} chars)")
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Key, model and endpoint for one extraction provider.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub api_key: SecretString,
    pub model: String,

    /// Overrides the provider's public endpoint (gateways, proxies)
    pub base_url: Option<String>,
}

impl ProviderCredentials {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// The configured base URL without trailing slashes, or `default`.
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .unwrap_or(default)
            .to_string()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &self.api_key.hint())
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}
