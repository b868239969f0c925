use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the Dune API key.
pub const API_KEY_ENV: &str = "DUNE_API_KEY";

pub const DEFAULT_API_BASE_URL: &str = "https://api.dune.com";
pub const DEFAULT_QUERY_ID: u64 = 3685692;
pub const DEFAULT_NAMESPACE: &str = "dune";
pub const DEFAULT_TABLE_NAME: &str = "dataset_eigenlayer_operator_metadata";

/// What a rejected or failed upload does to the run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadFailurePolicy {
    /// Log it and finish normally.
    #[default]
    BestEffort,
    /// Fail the run.
    Strict,
}

/// Settings for one ETL run. Every key is optional in the YAML file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct OpmetaConfig {
    pub api_base_url: String,
    pub query_id: u64,
    pub namespace: String,
    pub table_name: String,
    pub table_description: String,
    pub is_private: bool,
    pub upload_failure: UploadFailurePolicy,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for OpmetaConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            query_id: DEFAULT_QUERY_ID,
            namespace: DEFAULT_NAMESPACE.to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            table_description: String::new(),
            is_private: false,
            upload_failure: UploadFailurePolicy::default(),
            poll_interval_secs: 1,
            fetch_timeout_secs: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl OpmetaConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }
}

/// Parse configuration text. Blank text yields the defaults.
pub fn parse_config(text: &str) -> Result<OpmetaConfig> {
    let config = if text.trim().is_empty() {
        OpmetaConfig::default()
    } else {
        serde_yaml_ng::from_str(text)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<OpmetaConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    parse_config(&text)
}

/// Load the file when one is given, otherwise use the defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<OpmetaConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(OpmetaConfig::default()),
    }
}

pub(crate) fn validate_config(config: &OpmetaConfig) -> Result<()> {
    let base = url::Url::parse(&config.api_base_url)
        .map_err(|e| Error::config(format!("api_base_url {:?}: {e}", config.api_base_url)))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(Error::config(format!(
            "api_base_url must be http or https, got {}",
            base.scheme()
        )));
    }

    if config.namespace.trim().is_empty() {
        return Err(Error::config("namespace cannot be empty"));
    }

    if config.table_name.trim().is_empty() {
        return Err(Error::config("table_name cannot be empty"));
    }

    if config.retry.max_attempts == 0 {
        return Err(Error::config("retry.max_attempts must be greater than 0"));
    }

    Ok(())
}

/// Read the API key from [`API_KEY_ENV`].
pub fn api_key_from_env() -> Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(Error::config(format!("{API_KEY_ENV} is not set"))),
    }
}

/// Write a commented example configuration. An existing file is left alone.
pub fn write_example_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let body = serde_yaml_ng::to_string(&OpmetaConfig::default())?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path.as_ref())?;
    writeln!(file, "# opmeta configuration")?;
    writeln!(file, "# The API key is read from the {API_KEY_ENV} environment variable.")?;
    writeln!(file, "# upload_failure: best_effort | strict")?;
    file.write_all(body.as_bytes())?;
    Ok(())
}
