//! Owner of donor subscriptions.
//!
//! Mutations for a donor run inside that donor's critical section (a
//! [`DonorLock`]), so a cancel racing a recurring charge or a second creation
//! for the same donor is applied in order rather than lost.

use crate::domain::charge::newest_first;
use crate::domain::ports::{SharedClock, SubscriptionLedger, SubscriptionStoreBox};
use crate::domain::subscription::{
    CampaignAnalysis, NewSubscription, Subscription, SubscriptionChargeStatus, SubscriptionStats,
    SubscriptionTransaction,
};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard as SyncMutexGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

type LockMap = HashMap<String, Arc<Mutex<()>>>;

fn lock_map(locks: &SyncMutex<LockMap>) -> SyncMutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Proof that the holder is inside a donor's critical section.
///
/// Dropping the last lock for a donor removes the donor's entry from the
/// registry's lock map.
pub struct DonorLock {
    donor_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<SyncMutex<LockMap>>,
}

impl Drop for DonorLock {
    fn drop(&mut self) {
        let mut locks = lock_map(&self.locks);
        // Release while the map is held so no new waiter can clone the entry
        // between the release and the count check.
        drop(self.guard.take());
        let idle = locks
            .get(&self.donor_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1);
        if idle {
            locks.remove(&self.donor_id);
        }
    }
}

/// Result of settling one due subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// The charge was attempted; `subscription` is the state after it.
    Charged {
        subscription: Subscription,
        status: SubscriptionChargeStatus,
    },
    /// The subscription was cancelled, replaced, or is no longer due.
    Skipped,
}

pub struct SubscriptionRegistry {
    store: SubscriptionStoreBox,
    clock: SharedClock,
    locks: Arc<SyncMutex<LockMap>>,
}

impl SubscriptionRegistry {
    pub fn new(store: SubscriptionStoreBox, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            locks: Arc::new(SyncMutex::new(HashMap::new())),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Enters the critical section for `donor_id`, waiting for any operation
    /// already holding it.
    pub async fn lock(&self, donor_id: &str) -> DonorLock {
        let mutex = lock_map(&self.locks)
            .entry(donor_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        DonorLock {
            donor_id: donor_id.to_string(),
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        lock_map(&self.locks).len()
    }

    /// Creates an active subscription, replacing any existing record for the
    /// donor. Callers that must not replace an active subscription check
    /// [`Self::by_donor`] under the same lock first.
    pub async fn create(
        &self,
        lock: &DonorLock,
        request: NewSubscription,
        analysis: CampaignAnalysis,
    ) -> Result<Subscription> {
        if lock.donor_id != request.donor_id {
            return Err(PaymentError::ValidationError(format!(
                "lock held for donor {} but subscription is for {}",
                lock.donor_id, request.donor_id
            )));
        }

        let subscription = Subscription::new(request, analysis, self.clock.now());
        self.store.store(subscription.clone()).await?;
        info!(
            donor_id = %subscription.donor_id,
            subscription_id = %subscription.id,
            interval = %subscription.interval,
            next_charge_at = %subscription.next_charge_at,
            "Subscription created"
        );
        Ok(subscription)
    }

    /// Cancels the donor's subscription. Returns false if there is none or it
    /// is already cancelled.
    pub async fn cancel(&self, donor_id: &str) -> Result<bool> {
        let _lock = self.lock(donor_id).await;
        let Some(mut subscription) = self.store.get(donor_id).await? else {
            return Ok(false);
        };
        if !subscription.cancel() {
            return Ok(false);
        }
        self.store.store(subscription).await?;
        info!(donor_id, "Subscription cancelled");
        Ok(true)
    }

    pub async fn by_donor(&self, donor_id: &str) -> Result<Option<Subscription>> {
        self.store.get(donor_id).await
    }

    /// Active subscriptions, newest first.
    pub async fn active_subscriptions(&self) -> Result<Vec<Subscription>> {
        let active = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|sub| sub.is_active)
            .collect();
        Ok(newest_first(active, |sub| sub.created_at))
    }

    /// Active subscriptions whose next charge is at or before `now`.
    pub async fn due_subscriptions(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        let mut due: Vec<Subscription> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|sub| sub.is_due(now))
            .collect();
        due.sort_by_key(|sub| sub.next_charge_at);
        Ok(due)
    }

    /// Attempts one recurring charge for `due` inside the donor's critical
    /// section.
    ///
    /// The subscription is re-read under the lock; if it was cancelled,
    /// replaced by a new subscription, or already advanced past `now`, nothing
    /// is charged. `attempt` decides the outcome, which is appended to `ledger`
    /// before the subscription changes. On success the subscription's charge
    /// times then advance; on failure it stays due. If the append fails the
    /// subscription is left untouched and stays due.
    pub async fn settle_due<F>(
        &self,
        due: &Subscription,
        now: DateTime<Utc>,
        ledger: &dyn SubscriptionLedger,
        attempt: F,
    ) -> Result<Settlement>
    where
        F: FnOnce(&Subscription) -> SubscriptionChargeStatus,
    {
        let _lock = self.lock(&due.donor_id).await;
        let Some(mut current) = self.store.get(&due.donor_id).await? else {
            return Ok(Settlement::Skipped);
        };
        if current.id != due.id || !current.is_due(now) {
            debug!(donor_id = %due.donor_id, "Subscription no longer due, skipping");
            return Ok(Settlement::Skipped);
        }

        let status = attempt(&current);
        ledger
            .append(SubscriptionTransaction::recurring(&current, status, now))
            .await?;
        if status == SubscriptionChargeStatus::Success {
            current.mark_charged(now);
            self.store.store(current.clone()).await?;
        }
        Ok(Settlement::Charged {
            subscription: current,
            status,
        })
    }

    pub async fn stats(&self) -> Result<SubscriptionStats> {
        let all = self.store.get_all().await?;
        Ok(SubscriptionStats::from_subscriptions(all.iter()))
    }
}
