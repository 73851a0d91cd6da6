use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Per-actor configuration, resolved by the caller before construction.
///
/// The core never reads environment variables or files; this struct is the
/// whole configuration surface of an actor.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Actor identity used in logs and error messages.
    pub name: String,
    /// Emit per-call debug events.
    #[serde(default)]
    pub debug: bool,
    /// Upper bound for every transport call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub connection_string: Option<String>,
    /// Overrides the provider's REST root.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Extra `TICKER -> native id` entries merged over the built-in table.
    #[serde(default)]
    pub symbol_overrides: BTreeMap<String, String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl ActorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            debug: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            api_key: None,
            connection_string: None,
            base_url: None,
            symbol_overrides: BTreeMap::new(),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_symbol_override(
        mut self,
        ticker: impl Into<String>,
        native: impl Into<String>,
    ) -> Self {
        self.symbol_overrides
            .insert(ticker.into().to_ascii_uppercase(), native.into());
        self
    }

    /// Checks the options every actor relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "name" });
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str, ValidationError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ValidationError::MissingApiKey {
                actor: self.name.clone(),
            }),
        }
    }

    pub fn require_connection_string(&self) -> Result<&str, ValidationError> {
        match self.connection_string.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ValidationError::MissingConnectionString {
                actor: self.name.clone(),
            }),
        }
    }

    /// Connection string that must be an http(s) URL, without trailing slash.
    pub fn require_http_endpoint(&self) -> Result<String, ValidationError> {
        let value = self.require_connection_string()?;
        if !(value.starts_with("http://") || value.starts_with("https://")) {
            return Err(ValidationError::InvalidConnectionString {
                value: value.to_owned(),
            });
        }
        Ok(value.trim_end_matches('/').to_owned())
    }

    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_owned()
    }
}

impl std::fmt::Debug for ActorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorConfig")
            .field("name", &self.name)
            .field("debug", &self.debug)
            .field("timeout_ms", &self.timeout_ms)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("connection_string", &self.connection_string)
            .field("base_url", &self.base_url)
            .field("symbol_overrides", &self.symbol_overrides)
            .finish()
    }
}
