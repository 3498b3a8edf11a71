//! Periodic sweep over due subscriptions.
//!
//! A sweep moves the scheduler from `Idle` to `Running` and back. Triggers that
//! arrive while a sweep is running (from the timer or a manual request) are
//! ignored, so a subscription is never charged twice for the same due date.

use super::registry::{Settlement, SubscriptionRegistry};
use crate::domain::ports::SubscriptionLedgerBox;
use crate::domain::subscription::SubscriptionChargeStatus;
use crate::error::{PaymentError, Result};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Running,
}

/// Counts from one completed sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Due when enumerated but cancelled, replaced or already charged by the
    /// time the donor's lock was acquired.
    pub skipped: usize,
    /// Attempts that could not be recorded. The subscription stays due.
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep was already running.
    Skipped,
}

/// Resets the running flag when a sweep ends, including on error.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RecurrenceScheduler {
    registry: Arc<SubscriptionRegistry>,
    ledger: SubscriptionLedgerBox,
    success_probability: f64,
    running: AtomicBool,
}

impl RecurrenceScheduler {
    /// Fails with a validation error unless `success_probability` is a
    /// finite value in `[0, 1]`.
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        ledger: SubscriptionLedgerBox,
        success_probability: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&success_probability) {
            return Err(PaymentError::ValidationError(format!(
                "success probability must be within [0, 1], got {success_probability}"
            )));
        }
        Ok(Self {
            registry,
            ledger,
            success_probability,
            running: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> SweepState {
        if self.running.load(Ordering::Acquire) {
            SweepState::Running
        } else {
            SweepState::Idle
        }
    }

    pub fn ledger(&self) -> &SubscriptionLedgerBox {
        &self.ledger
    }

    /// Runs one sweep unless one is already in progress.
    pub async fn trigger(&self) -> Result<SweepOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Recurrence sweep already running, ignoring trigger");
            return Ok(SweepOutcome::Skipped);
        }
        let _guard = RunningGuard(&self.running);

        let report = self.sweep().await?;
        info!(
            due = report.due,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            errors = report.errors,
            "Recurrence sweep finished"
        );
        Ok(SweepOutcome::Completed(report))
    }

    async fn sweep(&self) -> Result<SweepReport> {
        let now = self.registry.now();
        let due = self.registry.due_subscriptions(now).await?;
        let mut report = SweepReport {
            due: due.len(),
            ..Default::default()
        };

        for due_subscription in &due {
            let settlement = match self
                .registry
                .settle_due(due_subscription, now, &*self.ledger, |_| {
                    self.simulate_charge()
                })
                .await
            {
                Ok(settlement) => settlement,
                Err(e) => {
                    report.errors += 1;
                    error!(
                        donor_id = %due_subscription.donor_id,
                        error = %e,
                        "Recurring charge could not be recorded, will retry on next sweep"
                    );
                    continue;
                }
            };

            let Settlement::Charged {
                subscription,
                status,
            } = settlement
            else {
                report.skipped += 1;
                continue;
            };

            match status {
                SubscriptionChargeStatus::Success => {
                    report.succeeded += 1;
                    info!(
                        donor_id = %subscription.donor_id,
                        amount = subscription.amount.value(),
                        next_charge_at = %subscription.next_charge_at,
                        "Recurring charge succeeded"
                    );
                }
                SubscriptionChargeStatus::Failed => {
                    report.failed += 1;
                    warn!(
                        donor_id = %subscription.donor_id,
                        amount = subscription.amount.value(),
                        "Recurring charge failed, will retry on next sweep"
                    );
                }
            }
        }

        Ok(report)
    }

    fn simulate_charge(&self) -> SubscriptionChargeStatus {
        if rand::thread_rng().gen_bool(self.success_probability) {
            SubscriptionChargeStatus::Success
        } else {
            SubscriptionChargeStatus::Failed
        }
    }

    /// Starts sweeping every `period` on a background task. The first sweep
    /// runs one full period after spawning. A zero period is rejected.
    pub fn spawn(self: Arc<Self>, period: Duration) -> Result<SchedulerHandle> {
        if period.is_zero() {
            return Err(PaymentError::ValidationError(
                "sweep period must be greater than zero".to_string(),
            ));
        }
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(period_secs = period.as_secs(), "Recurrence scheduler started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Recurrence scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.trigger().await {
                            error!(error = %e, "Recurrence sweep failed");
                        }
                    }
                }
            }
        });

        Ok(SchedulerHandle {
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle to a running scheduler timer.
pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the timer and waits for an in-progress sweep to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "Recurrence scheduler task panicked");
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}
