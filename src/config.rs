//! `config.toml` of the command line uploader

use std::path::Path;
use anyhow::Context;
use serde::Deserialize;
use crate::tus::DEFAULT_BUFFER_SIZE;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// tus creation endpoint
    pub endpoint: String,
    /// Sent verbatim as `Authorization`
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
    /// e.g. `video/*,.srt`
    #[serde(default)]
    pub accept: Option<String>,
    /// Prepended to the file name to form the destination key
    #[serde(default)]
    pub path_prefix: String,
}

fn default_chunk_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        Self::parse(&config_str)
            .with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn parse(config_str: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(config_str)?;
        anyhow::ensure!(
            config.endpoint.starts_with("http"),
            "endpoint must be an http(s) url, got '{}'",
            config.endpoint
        );

        Ok(config)
    }
}
