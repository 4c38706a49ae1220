//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the coordinator.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::blockchain::wallet::PRIVATE_KEY_ENV_VAR;

/// Root configuration for the Safe coordinator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Blockchain RPC settings.
    pub blockchain: BlockchainConfig,

    /// Deployed contract addresses.
    pub contracts: ContractsConfig,

    /// Reconciliation loop settings.
    pub reconciler: ReconcilerConfig,

    /// Proposal execution settings.
    pub executor: ExecutorConfig,

    /// Retry configuration for chain calls.
    pub retries: RetryConfig,

    /// Record store settings.
    pub store: StoreConfig,

    /// Notification sink settings.
    pub notifications: NotificationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Blockchain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// WebSocket endpoint used for log subscriptions.
    pub ws_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Blocks a creation must be buried under before it counts as confirmed.
    pub confirmation_blocks: u32,

    /// Gas price multiplier (1.0 = network price, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// Substrings of JSON-RPC error responses that are worth retrying.
    pub retryable_errors: Vec<String>,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            ws_url: "ws://localhost:8546".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            confirmation_blocks: 0,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
            retryable_errors: vec![
                "timeout".to_string(),
                "connection refused".to_string(),
                "connection reset".to_string(),
                "nonce too low".to_string(),
                "header not found".to_string(),
                "rate limit".to_string(),
                "too many requests".to_string(),
            ],
        }
    }
}

/// Addresses of the Safe contracts this deployment watches.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ContractsConfig {
    /// Safe proxy factory emitting `ProxyCreation`.
    pub factory_address: String,

    /// Safe singleton (master copy) the proxies delegate to.
    pub singleton_address: String,
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Polling reconciler interval in seconds.
    pub poll_interval_secs: u64,

    /// Record materializer interval in seconds.
    pub materialize_interval_secs: u64,

    /// Maximum records loaded per tick.
    pub batch_size: usize,

    /// Run the push-based event subscriber.
    pub subscriber_enabled: bool,

    /// Base delay before re-subscribing after a subscription error.
    pub resubscribe_base_ms: u64,

    /// Upper bound for the re-subscribe delay.
    pub resubscribe_max_ms: u64,

    /// Records still unmined after this many seconds are failed.
    pub submission_timeout_secs: u64,

    /// FAILED records older than this are removed by the retention sweep.
    pub failed_retention_hours: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            materialize_interval_secs: 10,
            batch_size: 100,
            subscriber_enabled: true,
            resubscribe_base_ms: 500,
            resubscribe_max_ms: 30_000,
            submission_timeout_secs: 3600,
            failed_retention_hours: 168,
        }
    }
}

/// Proposal execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Load the executor key and allow proposal execution.
    pub enabled: bool,

    /// Fixed gas limit for `execTransaction` submissions.
    pub gas_limit: u64,

    /// Environment variable holding the executor private key.
    pub private_key_env: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gas_limit: 500_000,
            private_key_env: PRIVATE_KEY_ENV_VAR.to_string(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,

    /// Multiplicative backoff factor.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_factor: 2.0,
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot loaded at startup and written at shutdown.
    pub snapshot_path: Option<String>,
}

/// Which notification sink to publish to.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Write notifications to the log.
    #[default]
    Log,
    /// POST notifications to a webhook.
    Webhook,
}

/// Notification sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub sink: SinkKind,

    /// Target URL for the webhook sink.
    pub webhook_url: String,

    /// Webhook request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            webhook_url: String::new(),
            timeout_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin endpoint.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin endpoint bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: CoordinatorConfig = toml::from_str(
            r#"
            [blockchain]
            chain_id = 11155111

            [contracts]
            factory_address = "0x4e1DCf7AD4e460CfD30791CCC4F9c8a4f820ec67"
            "#,
        )
        .unwrap();

        assert_eq!(config.blockchain.chain_id, 11155111);
        assert_eq!(config.blockchain.rpc_timeout_secs, 10);
        assert_eq!(config.reconciler.poll_interval_secs, 30);
        assert_eq!(config.retries.max_retries, 3);
        assert_eq!(config.notifications.sink, SinkKind::Log);
        assert!(!config.executor.enabled);
    }

    #[test]
    fn test_sink_kind_parses_lowercase() {
        let config: NotificationConfig = toml::from_str(
            r#"
            sink = "webhook"
            webhook_url = "https://hooks.internal/safe"
            "#,
        )
        .unwrap();
        assert_eq!(config.sink, SinkKind::Webhook);
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn test_channel_sink_not_selectable() {
        // The daemon has no in-process subscribers for a broadcast sink.
        let result: Result<NotificationConfig, _> = toml::from_str(r#"sink = "channel""#);
        assert!(result.is_err());
    }
}
