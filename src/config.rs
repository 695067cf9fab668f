//! Runtime configuration: listen address, upstream base URL, credentials, and
//! model-classification overrides. Loaded once at startup from environment
//! variables (optionally via a `.env` cascade); the rest of the proxy treats it as
//! read-only, `Arc`-shared state.

use crate::router::ApiFlavor;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::{env, path::PathBuf};

/// Default listen port per spec.md §6.
const DEFAULT_PORT: u16 = 19000;
const DEFAULT_HOST: &str = "127.0.0.1";

/// Environment variable names for upstream and config.
pub mod env_keys {
    pub const HOST: &str = "HOST";
    pub const PORT: &str = "PORT";
    pub const UPSTREAM_BASE_URL: &str = "UPSTREAM_BASE_URL";
    pub const ANTHROPIC_PROXY_BASE_URL: &str = "ANTHROPIC_PROXY_BASE_URL";
    pub const UPSTREAM_API_KEY: &str = "UPSTREAM_API_KEY";
    pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
    pub const DEFAULT_MODEL: &str = "DEFAULT_MODEL";
    pub const MODEL_CLASSIFICATION_OVERRIDES: &str = "MODEL_CLASSIFICATION_OVERRIDES";
    pub const DEBUG: &str = "DEBUG";
    pub const VERBOSE: &str = "VERBOSE";
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub upstream_base_url: String,
    /// Cached URL for the upstream Chat Completions endpoint.
    pub(crate) chat_completions_url: String,
    /// Cached URL for the upstream Responses endpoint.
    pub(crate) responses_url: String,
    /// Fallback credential used only when the downstream client presents none;
    /// the proxy otherwise forwards the client's own bearer token (§4.5).
    pub api_key: Option<String>,
    pub default_model_override: Option<String>,
    pub model_classification_overrides: HashMap<String, ApiFlavor>,
    pub debug: bool,
    pub verbose: bool,
}

impl Config {
    /// Try to load .env from the given path; then from cwd, home, and /etc.
    fn load_dotenv(custom_path: Option<PathBuf>) -> Option<PathBuf> {
        if let Some(path) = custom_path {
            if path.exists() && dotenvy::from_path(&path).is_ok() {
                return Some(path);
            }
            eprintln!("WARNING: Custom config file not found: {}", path.display());
        }

        if let Ok(path) = dotenvy::dotenv() {
            return Some(path);
        }

        let home = env::var("HOME").ok().or_else(|| env::var("USERPROFILE").ok());
        if let Some(home) = home {
            let home_config = PathBuf::from(&home).join(".messages-bridge.env");
            if home_config.exists() && dotenvy::from_path(&home_config).is_ok() {
                return Some(home_config);
            }
        }

        let etc_config = PathBuf::from("/etc/messages-bridge/.env");
        if etc_config.exists() && dotenvy::from_path(&etc_config).is_ok() {
            return Some(etc_config);
        }

        None
    }

    /// Parse an env var as a boolean (true, 1, yes => true).
    fn env_bool(key: &str) -> bool {
        env::var(key)
            .map(|v| {
                let v = v.to_lowercase();
                v == "1" || v == "true" || v == "yes"
            })
            .unwrap_or(false)
    }

    /// Parses `MODEL_CLASSIFICATION_OVERRIDES` as a comma-separated list of
    /// `model=flavor` pairs, e.g. `my-model=responses,other-model=chat`.
    fn parse_overrides(raw: &str) -> HashMap<String, ApiFlavor> {
        let mut overrides = HashMap::new();
        for entry in raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((model, flavor)) = entry.split_once('=') else {
                eprintln!("WARNING: ignoring malformed MODEL_CLASSIFICATION_OVERRIDES entry: {entry}");
                continue;
            };
            match ApiFlavor::parse(flavor) {
                Some(flavor) => {
                    overrides.insert(model.trim().to_string(), flavor);
                }
                None => eprintln!(
                    "WARNING: ignoring MODEL_CLASSIFICATION_OVERRIDES entry with unknown flavor: {entry}"
                ),
            }
        }
        overrides
    }

    pub fn from_env() -> Result<Self> {
        Self::from_env_with_path(None)
    }

    pub fn from_env_with_path(custom_path: Option<PathBuf>) -> Result<Self> {
        use env_keys::*;

        if let Some(path) = Self::load_dotenv(custom_path) {
            eprintln!("Loaded config from: {}", path.display());
        } else {
            eprintln!("No .env file found, using environment variables only");
        }

        let host = env::var(HOST).unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var(PORT).ok().and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT);

        let raw_base_url = env::var(UPSTREAM_BASE_URL)
            .or_else(|_| env::var(ANTHROPIC_PROXY_BASE_URL))
            .context(
                "UPSTREAM_BASE_URL is required. Set it to your OpenAI-compatible endpoint (e.g. \
                 https://openrouter.ai/api, https://api.openai.com, http://localhost:11434)",
            )?;

        let upstream_base_url = raw_base_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&upstream_base_url).context("UPSTREAM_BASE_URL must be a valid URL")?;

        if upstream_base_url.ends_with("/v1") {
            eprintln!(
                "WARNING: UPSTREAM_BASE_URL ends with '/v1'. The proxy adds /v1/chat/completions \
                 and /v1/responses itself. Prefer e.g. https://openrouter.ai/api (without /v1)."
            );
        }

        let api_key = env::var(UPSTREAM_API_KEY)
            .or_else(|_| env::var(OPENROUTER_API_KEY))
            .ok()
            .filter(|k| !k.is_empty());

        let default_model_override = env::var(DEFAULT_MODEL).ok();
        let model_classification_overrides = env::var(MODEL_CLASSIFICATION_OVERRIDES)
            .ok()
            .map(|raw| Self::parse_overrides(&raw))
            .unwrap_or_default();
        let debug = Self::env_bool(DEBUG);
        let verbose = Self::env_bool(VERBOSE);

        let chat_completions_url = format!("{upstream_base_url}/v1/chat/completions");
        let responses_url = format!("{upstream_base_url}/v1/responses");

        Ok(Config {
            host,
            port,
            upstream_base_url,
            chat_completions_url,
            responses_url,
            api_key,
            default_model_override,
            model_classification_overrides,
            debug,
            verbose,
        })
    }

    /// URL for the upstream chat completions endpoint.
    #[inline]
    pub fn chat_completions_url(&self) -> &str {
        &self.chat_completions_url
    }

    /// URL for the upstream Responses endpoint.
    #[inline]
    pub fn responses_url(&self) -> &str {
        &self.responses_url
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Overrides the upstream base URL (e.g. from a `--upstream` CLI flag),
    /// recomputing the cached per-flavor endpoint URLs to match.
    pub fn with_upstream_base_url(mut self, raw: String) -> Result<Self> {
        let upstream_base_url = raw.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&upstream_base_url).context("--upstream must be a valid URL")?;
        self.chat_completions_url = format!("{upstream_base_url}/v1/chat/completions");
        self.responses_url = format!("{upstream_base_url}/v1/responses");
        self.upstream_base_url = upstream_base_url;
        Ok(self)
    }

    /// A minimal config for unit tests that don't touch the environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            upstream_base_url: "http://localhost:11434".to_string(),
            chat_completions_url: "http://localhost:11434/v1/chat/completions".to_string(),
            responses_url: "http://localhost:11434/v1/responses".to_string(),
            api_key: None,
            default_model_override: None,
            model_classification_overrides: HashMap::new(),
            debug: false,
            verbose: false,
        }
    }
}
