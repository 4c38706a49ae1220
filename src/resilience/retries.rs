//! Retry logic for calls that cross the network boundary.
//!
//! # Responsibilities
//! - Decide retryability from a typed [`ErrorKind`]
//! - Execute retries with exponential backoff
//! - Abort in-flight sleeps when shutdown is requested

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::config::RetryConfig;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network hiccup, timeout, rate limit: worth retrying.
    Transient,
    /// The thing asked for does not exist (yet).
    NotFound,
    /// Retrying will not help.
    Permanent,
}

/// Errors that know whether they are worth retrying.
pub trait Retryable {
    fn kind(&self) -> ErrorKind;

    fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Failure of an operation run under a [`RetryPolicy`].
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    /// The error was not retryable; returned after the first failure.
    #[error("{0}")]
    Permanent(E),

    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// Shutdown was requested while waiting to retry.
    #[error("cancelled after {attempts} attempts: {last}")]
    Cancelled { attempts: u32, last: E },
}

impl<E: fmt::Display> RetryError<E> {
    /// The underlying error of the last attempt.
    pub fn last_error(&self) -> &E {
        match self {
            Self::Permanent(e) => e,
            Self::Exhausted { last, .. } | Self::Cancelled { last, .. } => last,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            Self::Permanent(e) => e,
            Self::Exhausted { last, .. } | Self::Cancelled { last, .. } => last,
        }
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
    shutdown: ShutdownSignal,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        factor: f64,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            max_retries,
            backoff: Backoff::new(initial_delay, max_delay, factor),
            shutdown,
        }
    }

    pub fn from_config(config: &RetryConfig, shutdown: ShutdownSignal) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.backoff_factor,
            shutdown,
        )
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO, 1.0, ShutdownSignal::never())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, E, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut shutdown = self.shutdown.clone();
        let mut retry = 0u32;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            let attempts = retry + 1;

            if !err.is_retryable() {
                return Err(RetryError::Permanent(err));
            }
            if retry >= self.max_retries {
                tracing::warn!(op = op_name, attempts, error = %err, "Retries exhausted");
                return Err(RetryError::Exhausted { attempts, last: err });
            }

            retry += 1;
            let delay = self.delay_for(retry);
            tracing::debug!(
                op = op_name,
                retry,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient error"
            );
            metrics::record_rpc_retry(op_name);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    return Err(RetryError::Cancelled { attempts, last: err });
                }
            }
        }
    }
}
