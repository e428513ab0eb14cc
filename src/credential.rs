//! The API credential for the remote backends.
//!
//! A [`Credential`] is opaque: its `Debug` and `Display` output is
//! redacted, and it is only exposed to the HTTP clients that send it.

use std::fmt;

use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret. Blank input is a configuration error.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            return Err(Error::Configuration(
                "an API credential is required".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Read the credential from an environment variable, loading a `.env`
    /// file from the working directory first if one exists.
    pub fn from_env(var: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let value = std::env::var(var).map_err(|_| {
            Error::Configuration(format!("environment variable {} is not set", var))
        })?;
        Self::new(value)
    }

    /// Read the credential from the variable named by `chat.credential_env`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_env(&config.chat.credential_env)
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}
