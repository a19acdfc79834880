//! Expiry sweeper: releases registrations left pending past the timeout.
//!
//! Each registration is released in its own transaction through
//! [`FulfillmentEngine::release`], so one failure never blocks the rest of the
//! batch.

mod runner;

pub use runner::{ExpiryRunner, ExpiryRunnerHandle};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use signup_core::RegistrationId;
use signup_registration::ReleaseOutcome;

use crate::config::ExpiryConfig;
use crate::error::RegistrationError;
use crate::fulfillment::FulfillmentEngine;
use crate::store::SignupStore;

/// Registration that could not be expired in this pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub registration_id: RegistrationId,
    pub reason: &'static str,
    pub message: String,
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    /// Settled by someone else between the scan and the release.
    pub skipped: usize,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug)]
pub struct ExpirySweeper<S> {
    store: Arc<S>,
    fulfillment: FulfillmentEngine<S>,
    config: ExpiryConfig,
}

impl<S: SignupStore> ExpirySweeper<S> {
    pub fn new(store: Arc<S>, config: ExpiryConfig) -> Self {
        let fulfillment = FulfillmentEngine::new(Arc::clone(&store));
        Self {
            store,
            fulfillment,
            config,
        }
    }

    pub fn config(&self) -> &ExpiryConfig {
        &self.config
    }

    /// Expire every registration pending since before `now - pending_timeout`,
    /// up to `batch_size` of them.
    ///
    /// Only the initial scan can fail the sweep; per-registration failures are
    /// logged and reported.
    #[instrument(skip(self), fields(now = %now), err)]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, RegistrationError> {
        let timeout = chrono::Duration::from_std(self.config.pending_timeout)
            .map_err(|e| RegistrationError::Validation(format!("pending timeout out of range: {e}")))?;
        let cutoff = now.checked_sub_signed(timeout).ok_or_else(|| {
            RegistrationError::Validation("pending timeout out of range".to_string())
        })?;
        let stale = self.store.stale_pending(cutoff, self.config.batch_size).await?;

        let mut report = SweepReport {
            scanned: stale.len(),
            ..SweepReport::default()
        };
        for registration_id in stale {
            match self
                .fulfillment
                .release(registration_id, ReleaseOutcome::Expired)
                .await
            {
                Ok(_) => report.expired += 1,
                Err(
                    RegistrationError::AlreadyConfirmed(_) | RegistrationError::AlreadyTerminal { .. },
                ) => {
                    debug!(%registration_id, "settled before expiry; skipping");
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!(%registration_id, error = %err, "failed to expire registration");
                    report.failures.push(SweepFailure {
                        registration_id,
                        reason: err.reason(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failures.len(),
                "expiry sweep finished"
            );
        }
        Ok(report)
    }
}
