//! Optional retry-with-backoff wrapper around an [`AppInstaller`].
//!
//! The wrapper re-runs the whole install sequence; it never reaches into the
//! engine's phases. Permanent failures (cancellation, no install method,
//! unsupported installer type) are returned immediately.

use crate::catalog::ApplicationSpec;
use crate::config::RetrySettings;
use crate::engine::{AppInstaller, InstallAttemptResult};
use crate::error::InstallError;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt
    pub fn none() -> Self {
        Self {
            attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based):
    /// `initial * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            attempts: settings.attempts.max(1),
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
        }
    }
}

pub struct Retrying<I> {
    inner: I,
    policy: RetryPolicy,
}

impl<I: AppInstaller> Retrying<I> {
    pub fn new(inner: I, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

#[async_trait]
impl<I: AppInstaller> AppInstaller for Retrying<I> {
    async fn install(
        &self,
        app: &ApplicationSpec,
        cancel: &CancellationToken,
    ) -> InstallAttemptResult {
        let mut attempt = 1;
        loop {
            let result = self.inner.install(app, cancel).await;

            let permanent = result.failure().is_some_and(|kind| kind.is_permanent());
            if result.succeeded() || permanent || attempt >= self.policy.attempts {
                return result;
            }

            let delay = self.policy.backoff_delay(attempt);
            info!(
                app = %app.name,
                attempt,
                delay_secs = delay.as_secs(),
                error = result.error_detail().unwrap_or_default(),
                "install failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return InstallAttemptResult::failed(
                        &app.name,
                        result.method_used(),
                        &InstallError::Cancelled,
                    );
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
