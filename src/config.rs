use std::time::Duration;

use config::{self, ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::{
    DEFAULT_GAS_LIMIT, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_RECEIPT_POLL_INTERVAL_MS,
    DEFAULT_RECEIPT_TIMEOUT_SEC, ENV_PREFIX,
};
use crate::errors::PipelineError;
use crate::models::NoncePolicy;
use crate::utils::verify_rpc_url;

pub struct ConfigManager {
    path: Option<String>,
}

/// Pipeline configuration, read from an optional file and overridden by `BESU_*` variables.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub owner_address: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default)]
    pub shuffle_endpoints: bool,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_receipt_timeout_sec")]
    pub receipt_timeout_sec: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default)]
    pub nonce_policy: NoncePolicy,
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_receipt_timeout_sec() -> u64 {
    DEFAULT_RECEIPT_TIMEOUT_SEC
}

fn default_receipt_poll_interval_ms() -> u64 {
    DEFAULT_RECEIPT_POLL_INTERVAL_MS
}

impl ConfigManager {
    pub fn new(path: Option<String>) -> ConfigManager {
        ConfigManager { path }
    }

    pub fn load_config(&self) -> Result<PipelineConfig, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = &self.path {
            builder = builder.add_source(File::with_name(path.as_str()));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("rpc_urls"),
            )
            .build()?;
        settings.try_deserialize()
    }
}

impl PipelineConfig {
    pub fn new(rpc_urls: Vec<String>, private_key: String) -> Self {
        Self {
            rpc_urls,
            private_key: Some(private_key),
            owner_address: None,
            chain_id: None,
            gas_limit: DEFAULT_GAS_LIMIT,
            shuffle_endpoints: false,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            receipt_timeout_sec: DEFAULT_RECEIPT_TIMEOUT_SEC,
            receipt_poll_interval_ms: DEFAULT_RECEIPT_POLL_INTERVAL_MS,
            nonce_policy: NoncePolicy::default(),
        }
    }

    /// Checks the parts every transaction depends on: a signing key and at least one usable
    /// RPC URL.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.rpc_urls.is_empty() {
            return Err(PipelineError::Configuration(
                "No RPC endpoints configured".to_string(),
            ));
        }

        for rpc_url in &self.rpc_urls {
            verify_rpc_url(rpc_url)?;
        }

        match self.private_key.as_deref().map(str::trim) {
            None | Some("") => Err(PipelineError::Configuration(
                "Missing signer private key".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_sec)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RPC_URL: &str = "http://127.0.0.1:8545";
    const KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    #[test]
    fn missing_private_key_is_a_configuration_error() {
        let mut config = PipelineConfig::new(vec![RPC_URL.to_string()], KEY.to_string());
        config.private_key = None;

        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn empty_endpoint_list_is_a_configuration_error() {
        let config = PipelineConfig::new(vec![], KEY.to_string());

        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn websocket_endpoint_is_rejected() {
        let config = PipelineConfig::new(vec!["ws://127.0.0.1:8546".to_string()], KEY.to_string());

        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidRpcUrl(_))
        ));
    }

    // Single test: both halves read the process environment
    #[test]
    fn file_is_loaded_and_overridden_by_environment() {
        let path =
            std::env::temp_dir().join(format!("besu-pipeline-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            format!(
                r#"{{
                    "rpc_urls": ["{}", "http://127.0.0.1:8546"],
                    "private_key": "{}",
                    "chain_id": 1337,
                    "nonce_policy": "chain_pending"
                }}"#,
                RPC_URL, KEY
            ),
        )
        .unwrap();
        let manager = ConfigManager::new(Some(path.to_string_lossy().into_owned()));

        let config = manager.load_config().unwrap();
        assert_eq!(
            config.rpc_urls,
            vec![RPC_URL.to_string(), "http://127.0.0.1:8546".to_string()]
        );
        assert_eq!(config.chain_id, Some(1337));
        assert_eq!(config.nonce_policy, NoncePolicy::ChainPending);
        assert_eq!(config.gas_limit, DEFAULT_GAS_LIMIT);
        assert!(config.validate().is_ok());

        std::env::set_var("BESU_RPC_URLS", "http://10.0.0.1:8545,http://10.0.0.2:8545");
        std::env::set_var("BESU_NONCE_POLICY", "chain");
        std::env::set_var("BESU_RECEIPT_TIMEOUT_SEC", "60");
        let overridden = manager.load_config();
        std::env::remove_var("BESU_RPC_URLS");
        std::env::remove_var("BESU_NONCE_POLICY");
        std::env::remove_var("BESU_RECEIPT_TIMEOUT_SEC");
        std::fs::remove_file(&path).unwrap();

        let config = overridden.unwrap();
        assert_eq!(
            config.rpc_urls,
            vec![
                "http://10.0.0.1:8545".to_string(),
                "http://10.0.0.2:8545".to_string()
            ]
        );
        assert_eq!(config.nonce_policy, NoncePolicy::Chain);
        assert_eq!(config.receipt_timeout(), Duration::from_secs(60));
        assert_eq!(config.chain_id, Some(1337));
    }

    #[test]
    fn defaults_are_applied() {
        let config = PipelineConfig::new(vec![RPC_URL.to_string()], KEY.to_string());

        assert!(config.validate().is_ok());
        assert_eq!(config.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(config.nonce_policy, NoncePolicy::Managed);
        assert_eq!(config.receipt_timeout(), Duration::from_secs(300));
    }
}
