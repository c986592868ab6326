// ABOUTME: Environment-provided credentials and endpoints for source and sink
// ABOUTME: Validated up front so a misconfigured run fails before any table work

use anyhow::{Context, Result};
use url::Url;

/// Default base URL for the source record API.
pub const DEFAULT_SOURCE_API_URL: &str = "https://api.airtable.com/v0";

/// Environment variable names. Kept in one place so error messages and docs
/// always agree.
pub const ENV_SOURCE_API_URL: &str = "SOURCE_API_URL";
pub const ENV_SOURCE_API_KEY: &str = "SOURCE_API_KEY";
pub const ENV_SOURCE_BASE_ID: &str = "SOURCE_BASE_ID";
pub const ENV_SINK_URL: &str = "SINK_URL";
pub const ENV_SINK_SERVICE_KEY: &str = "SINK_SERVICE_KEY";

/// Raised when a required environment variable is absent or empty.
#[derive(Debug, thiserror::Error)]
#[error("required environment variable {name} is not set")]
pub struct MissingEnvironmentVariableError {
    pub name: &'static str,
}

/// Resolved credentials for one run.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Base URL of the source record API.
    pub source_api_url: String,
    /// Source API key, sent as a bearer token.
    pub source_api_key: String,
    /// Source base (collection) id. The configuration file may override this.
    pub source_base_id: String,
    /// Sink endpoint URL.
    pub sink_url: String,
    /// Sink service credential, sent as both api key and bearer token.
    pub sink_service_key: String,
}

impl Credentials {
    /// Resolve credentials from the process environment.
    ///
    /// `config_base` is the optional base id from the sync configuration; when
    /// present it takes precedence and SOURCE_BASE_ID need not be set.
    pub fn from_env(config_base: Option<&str>) -> Result<Self> {
        let source_api_url =
            optional_env(ENV_SOURCE_API_URL).unwrap_or_else(|| DEFAULT_SOURCE_API_URL.to_string());
        let source_api_key = required_env(ENV_SOURCE_API_KEY)?;
        let source_base_id = match config_base {
            Some(base) => base.to_string(),
            None => required_env(ENV_SOURCE_BASE_ID)?,
        };
        let sink_url = required_env(ENV_SINK_URL)?;
        let sink_service_key = required_env(ENV_SINK_SERVICE_KEY)?;

        Url::parse(&sink_url)
            .with_context(|| format!("{} is not a valid URL: {}", ENV_SINK_URL, sink_url))?;
        Url::parse(&source_api_url).with_context(|| {
            format!("{} is not a valid URL: {}", ENV_SOURCE_API_URL, source_api_url)
        })?;

        Ok(Self {
            source_api_url,
            source_api_key,
            source_base_id,
            sink_url: sink_url.trim_end_matches('/').to_string(),
            sink_service_key,
        })
    }
}

fn optional_env(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_env(name: &'static str) -> Result<String> {
    optional_env(name).ok_or_else(|| MissingEnvironmentVariableError { name }.into())
}
