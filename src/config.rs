//! Configuration for the résumé tasks.
//!
//! Every knob lives in [`MatchConfig`], built through [`MatchConfigBuilder`].
//! Process-wide environment state is captured once into a [`ModelEnv`] value
//! and injected, so model resolution is a pure function of its inputs and can
//! be tested without touching `std::env`.

use crate::error::CvMatchError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable that overrides the model for every call without a hint.
pub const MODEL_OVERRIDE_ENV: &str = "CVMATCH_MODEL";

/// Older name of [`MODEL_OVERRIDE_ENV`], read when the new one is unset.
pub const LEGACY_MODEL_OVERRIDE_ENV: &str = "LITELLM_MODEL";

/// Credential whose presence selects [`MISTRAL_DEFAULT_MODEL`].
pub const MISTRAL_KEY_ENV: &str = "MISTRAL_API_KEY";

/// Cheap Mistral model used when a Mistral key is present.
pub const MISTRAL_DEFAULT_MODEL: &str = "mistral/mistral-small-latest";

/// Model used when nothing else applies.
pub const FALLBACK_MODEL: &str = "gpt-4o-mini";

/// Explicit pdfium library location (file or directory).
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Base URL of an OpenAI-compatible gateway for the http backend.
pub const API_BASE_ENV: &str = "CVMATCH_API_BASE";

/// Bearer token for that gateway.
pub const API_KEY_ENV: &str = "CVMATCH_API_KEY";

/// Read-only snapshot of the environment variables that steer model choice.
///
/// Only the *presence* of the Mistral credential is recorded; its value is
/// never read into this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelEnv {
    /// Value of `CVMATCH_MODEL` (else `LITELLM_MODEL`), if set and non-empty.
    pub model_override: Option<String>,
    /// Whether `MISTRAL_API_KEY` is set and non-empty.
    pub mistral_key_present: bool,
}

impl ModelEnv {
    /// Capture the current process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Capture from an arbitrary key lookup (tests, embedded hosts).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            model_override: non_empty(MODEL_OVERRIDE_ENV)
                .or_else(|| non_empty(LEGACY_MODEL_OVERRIDE_ENV)),
            mistral_key_present: non_empty(MISTRAL_KEY_ENV).is_some(),
        }
    }

    /// Resolve the model identifier for one call.
    ///
    /// First match wins: explicit hint, `CVMATCH_MODEL`, the Mistral default
    /// when a Mistral key is present, then [`FALLBACK_MODEL`]. Only the empty
    /// string counts as absent; other values are used exactly as given.
    pub fn resolve_model(&self, hint: Option<&str>) -> String {
        if let Some(hint) = hint.filter(|h| !h.is_empty()) {
            return hint.to_string();
        }
        if let Some(ref model) = self.model_override {
            return model.clone();
        }
        if self.mistral_key_present {
            return MISTRAL_DEFAULT_MODEL.to_string();
        }
        FALLBACK_MODEL.to_string()
    }
}

/// Which completion client backs the [`crate::pipeline::llm::ModelInvoker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Native providers through `edgequake-llm`, routed by `provider/model`. (default)
    #[default]
    Provider,
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    Http,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Provider => "provider",
            Backend::Http => "http",
        }
    }
}

/// Configuration shared by every task function.
///
/// # Example
/// ```rust
/// use cvmatch::{Backend, MatchConfig};
///
/// let config = MatchConfig::builder()
///     .backend(Backend::Http)
///     .api_base("http://localhost:4000")
///     .strict_reply(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.backend, Backend::Http);
/// ```
#[derive(Clone)]
pub struct MatchConfig {
    /// Completion backend. Default: [`Backend::Provider`].
    pub backend: Backend,

    /// Base URL for [`Backend::Http`], e.g. `http://localhost:4000/v1`.
    pub api_base: Option<String>,

    /// Bearer token for [`Backend::Http`]. Sent with the request and nothing else.
    pub api_key: Option<String>,

    /// Pre-constructed provider. When set, model routing is skipped and every
    /// call goes to this provider.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Output token cap forwarded to the model. Default: provider default.
    pub max_tokens: Option<usize>,

    /// Raise [`CvMatchError::UnexpectedReplyShape`] instead of stringifying a
    /// reply envelope that lacks `choices[0].message.content`. Default: false.
    pub strict_reply: bool,

    /// Directory holding `<template>.json` prompt overrides.
    pub prompt_dir: Option<PathBuf>,

    /// Explicit pdfium library (file or containing directory).
    pub pdfium_lib_path: Option<PathBuf>,

    /// Résumés structured at once by the batch operation. Default: 4.
    pub concurrency: usize,

    /// Environment snapshot used for model resolution.
    pub env: ModelEnv,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            api_base: None,
            api_key: None,
            provider: None,
            max_tokens: None,
            strict_reply: false,
            prompt_dir: None,
            pdfium_lib_path: None,
            concurrency: 4,
            env: ModelEnv::default(),
        }
    }
}

impl fmt::Debug for MatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchConfig")
            .field("backend", &self.backend)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("strict_reply", &self.strict_reply)
            .field("prompt_dir", &self.prompt_dir)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("concurrency", &self.concurrency)
            .field("env", &self.env)
            .finish()
    }
}

impl MatchConfig {
    /// Create a new builder for `MatchConfig`.
    pub fn builder() -> MatchConfigBuilder {
        MatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults plus the environment: model env snapshot, `PDFIUM_LIB_PATH`
    /// and the gateway settings. A set `CVMATCH_API_BASE` selects the http backend.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let api_base = non_empty(API_BASE_ENV);
        Self {
            backend: if api_base.is_some() {
                Backend::Http
            } else {
                Backend::Provider
            },
            api_base,
            api_key: non_empty(API_KEY_ENV),
            env: ModelEnv::from_env(),
            pdfium_lib_path: std::env::var_os(PDFIUM_LIB_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            ..Self::default()
        }
    }
}

/// Builder for [`MatchConfig`].
#[derive(Debug)]
pub struct MatchConfigBuilder {
    config: MatchConfig,
}

impl MatchConfigBuilder {
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn strict_reply(mut self, v: bool) -> Self {
        self.config.strict_reply = v;
        self
    }

    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.prompt_dir = Some(dir.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn env(mut self, env: ModelEnv) -> Self {
        self.config.env = env;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MatchConfig, CvMatchError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(CvMatchError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == Some(0) {
            return Err(CvMatchError::InvalidConfig(
                "max_tokens must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}
