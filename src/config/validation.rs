//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//!
//! Returns every validation error, not just the first.

use alloy::primitives::Address;
use thiserror::Error;

use crate::config::schema::{CoordinatorConfig, SinkKind};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &CoordinatorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(&mut errors, "blockchain.rpc_url", &config.blockchain.rpc_url, &["http", "https"]);
    if config.reconciler.subscriber_enabled {
        check_url(&mut errors, "blockchain.ws_url", &config.blockchain.ws_url, &["ws", "wss"]);
    }
    for url in &config.blockchain.failover_urls {
        check_url(&mut errors, "blockchain.failover_urls", url, &["http", "https"]);
    }

    if config.blockchain.chain_id == 0 {
        errors.push(ValidationError::new("blockchain.chain_id", "must be non-zero"));
    }
    if config.blockchain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("blockchain.rpc_timeout_secs", "must be > 0"));
    }
    if config.blockchain.gas_price_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "blockchain.gas_price_multiplier",
            "must be >= 1.0",
        ));
    }

    match config.contracts.factory_address.parse::<Address>() {
        Ok(address) if address == Address::ZERO => errors.push(ValidationError::new(
            "contracts.factory_address",
            "must not be the zero address",
        )),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new(
            "contracts.factory_address",
            format!("invalid address: {e}"),
        )),
    }
    if !config.contracts.singleton_address.is_empty()
        && config.contracts.singleton_address.parse::<Address>().is_err()
    {
        errors.push(ValidationError::new(
            "contracts.singleton_address",
            "invalid address",
        ));
    }

    if config.reconciler.poll_interval_secs == 0 {
        errors.push(ValidationError::new("reconciler.poll_interval_secs", "must be > 0"));
    }
    if config.reconciler.materialize_interval_secs == 0 {
        errors.push(ValidationError::new(
            "reconciler.materialize_interval_secs",
            "must be > 0",
        ));
    }
    if config.reconciler.batch_size == 0 {
        errors.push(ValidationError::new("reconciler.batch_size", "must be > 0"));
    }
    if config.reconciler.resubscribe_base_ms > config.reconciler.resubscribe_max_ms {
        errors.push(ValidationError::new(
            "reconciler.resubscribe_base_ms",
            "must not exceed resubscribe_max_ms",
        ));
    }

    if config.retries.backoff_factor < 1.0 {
        errors.push(ValidationError::new("retries.backoff_factor", "must be >= 1.0"));
    }
    if config.retries.initial_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.initial_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }

    if config.executor.enabled {
        if config.executor.gas_limit < 21_000 {
            errors.push(ValidationError::new("executor.gas_limit", "must be >= 21000"));
        }
        if config.executor.private_key_env.is_empty() {
            errors.push(ValidationError::new(
                "executor.private_key_env",
                "must name an environment variable",
            ));
        }
    }

    if config.notifications.sink == SinkKind::Webhook {
        check_url(
            &mut errors,
            "notifications.webhook_url",
            &config.notifications.webhook_url,
            &["http", "https"],
        );
    }

    if config.admin.enabled && config.admin.api_key.len() < 16 {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be at least 16 characters",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: &str,
    schemes: &[&str],
) {
    match value.parse::<url::Url>() {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL '{value}': {e}"))),
    }
}
