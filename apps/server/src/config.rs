//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Configuration for the demo pipeline this binary drives.
///
/// Codec/format names here are opaque strings handed to
/// [`txproto_core::media_ops::MediaOps`] — this binary never interprets
/// them itself.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `kymux://` URI the demuxer reads from.
    /// Override: `TXPROTO_INPUT_URI`
    pub input_uri: String,

    /// `kymux://` URI the muxer writes to.
    /// Override: `TXPROTO_OUTPUT_URI`
    pub output_uri: String,

    /// Decoder codec name.
    pub decoder_codec: String,

    /// Encoder codec name.
    pub encoder_codec: String,

    /// Container format name the muxer writes.
    pub mux_format: String,

    /// Interval in seconds between I/O registry discovery passes.
    /// Override: `TXPROTO_DISCOVERY_INTERVAL`
    pub discovery_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            input_uri: "kymux://localhost/input0".to_string(),
            output_uri: "kymux://localhost/output0".to_string(),
            decoder_codec: "passthrough".to_string(),
            encoder_codec: "passthrough".to_string(),
            mux_format: "mock".to_string(),
            discovery_interval_secs: txproto_core::protocol_constants::DEFAULT_IO_DISCOVERY_INTERVAL_SECS,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TXPROTO_INPUT_URI") {
            self.input_uri = val;
        }
        if let Ok(val) = std::env::var("TXPROTO_OUTPUT_URI") {
            self.output_uri = val;
        }
        if let Ok(val) = std::env::var("TXPROTO_DISCOVERY_INTERVAL") {
            if let Ok(interval) = val.parse() {
                self.discovery_interval_secs = interval;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses_its_own_uris() {
        let config = ServerConfig::default();
        assert!(txproto_core::wire::Endpoint::parse(&config.input_uri).is_ok());
        assert!(txproto_core::wire::Endpoint::parse(&config.output_uri).is_ok());
    }

    #[test]
    fn load_without_path_falls_back_to_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.mux_format, "mock");
    }
}
