use crate::domain::charge::{LedgerStats, Transaction, TransactionFilter, newest_first};
use crate::domain::ports::{SubscriptionLedger, SubscriptionStore, TransactionLedger};
use crate::domain::subscription::{Subscription, SubscriptionTransaction};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory ledger of routed charges.
///
/// Records are kept in append order; queries sort newest-first.
#[derive(Default, Clone)]
pub struct InMemoryTransactionLedger {
    transactions: Arc<RwLock<Vec<Transaction>>>,
}

impl InMemoryTransactionLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionLedger for InMemoryTransactionLedger {
    async fn append(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.push(tx);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.iter().find(|tx| tx.id == id).cloned())
    }

    async fn filter(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let matching = transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect();
        Ok(newest_first(matching, |tx| tx.created_at))
    }

    async fn stats(&self) -> Result<LedgerStats> {
        let transactions = self.transactions.read().await;
        Ok(LedgerStats::from_transactions(transactions.iter()))
    }
}

/// A thread-safe in-memory store of subscriptions keyed by donor id.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionStore {
    subscriptions: Arc<RwLock<HashMap<String, Subscription>>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn store(&self, subscription: Subscription) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.donor_id.clone(), subscription);
        Ok(())
    }

    async fn get(&self, donor_id: &str) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(donor_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.values().cloned().collect())
    }
}

/// A thread-safe in-memory ledger of recurring charge attempts.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionLedger {
    transactions: Arc<RwLock<Vec<SubscriptionTransaction>>>,
}

impl InMemorySubscriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionLedger for InMemorySubscriptionLedger {
    async fn append(&self, tx: SubscriptionTransaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.push(tx);
        Ok(())
    }

    async fn by_subscription(&self, subscription_id: Uuid) -> Result<Vec<SubscriptionTransaction>> {
        let transactions = self.transactions.read().await;
        let matching = transactions
            .iter()
            .filter(|tx| tx.subscription_id == subscription_id)
            .cloned()
            .collect();
        Ok(newest_first(matching, |tx| tx.created_at))
    }

    async fn get_all(&self) -> Result<Vec<SubscriptionTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(newest_first(transactions.clone(), |tx| tx.created_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::charge::{Amount, ChargeRequest, Currency, Provider};
    use crate::domain::subscription::{
        CampaignAnalysis, Interval, NewSubscription, SubscriptionChargeStatus,
    };
    use chrono::{Duration, Utc};

    fn charge(amount: u64, provider: Provider, seconds_ago: i64) -> Transaction {
        Transaction::record(
            ChargeRequest::new(amount, "USD", "tok_visa", "user@gmail.com").unwrap(),
            provider,
            0.1,
            "explanation".to_string(),
            Vec::new(),
            Utc::now() - Duration::seconds(seconds_ago),
        )
    }

    fn subscription(donor: &str) -> Subscription {
        Subscription::new(
            NewSubscription {
                donor_id: donor.to_string(),
                amount: Amount::new(1_000).unwrap(),
                currency: Currency::new("USD").unwrap(),
                interval: Interval::Monthly,
                campaign_description: "School meals".to_string(),
            },
            CampaignAnalysis {
                tags: vec!["education".to_string()],
                summary: "School meals".to_string(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_in_memory_ledger_get() {
        let ledger = InMemoryTransactionLedger::new();
        let tx = charge(500, Provider::Stripe, 0);

        ledger.append(tx.clone()).await.unwrap();
        let retrieved = ledger.get(tx.id).await.unwrap().unwrap();
        assert_eq!(retrieved, tx);

        assert!(ledger.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_ledger_filter_newest_first() {
        let ledger = InMemoryTransactionLedger::new();
        let old = charge(100, Provider::Stripe, 60);
        let new = charge(200, Provider::Stripe, 0);
        let other = charge(300, Provider::Paypal, 30);

        ledger.append(old.clone()).await.unwrap();
        ledger.append(new.clone()).await.unwrap();
        ledger.append(other.clone()).await.unwrap();

        let all = ledger.filter(&TransactionFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![new.id, other.id, old.id]);

        let stripe = ledger
            .filter(&TransactionFilter {
                provider: Some(Provider::Stripe),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stripe.len(), 2);
        assert_eq!(stripe[0].id, new.id);
    }

    #[tokio::test]
    async fn test_in_memory_subscription_store_replaces_by_donor() {
        let store = InMemorySubscriptionStore::new();
        let first = subscription("donor-1");
        let second = subscription("donor-1");

        store.store(first).await.unwrap();
        store.store(second.clone()).await.unwrap();

        let retrieved = store.get("donor-1").await.unwrap().unwrap();
        assert_eq!(retrieved.id, second.id);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
        assert!(store.get("donor-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_subscription_ledger() {
        let ledger = InMemorySubscriptionLedger::new();
        let sub = subscription("donor-1");
        let other = subscription("donor-2");

        let failed = SubscriptionTransaction::recurring(
            &sub,
            SubscriptionChargeStatus::Failed,
            Utc::now() - Duration::hours(1),
        );
        let succeeded =
            SubscriptionTransaction::recurring(&sub, SubscriptionChargeStatus::Success, Utc::now());
        ledger.append(failed.clone()).await.unwrap();
        ledger.append(succeeded.clone()).await.unwrap();
        ledger
            .append(SubscriptionTransaction::recurring(
                &other,
                SubscriptionChargeStatus::Success,
                Utc::now(),
            ))
            .await
            .unwrap();

        let history = ledger.by_subscription(sub.id).await.unwrap();
        assert_eq!(history, vec![succeeded, failed]);
        assert_eq!(ledger.get_all().await.unwrap().len(), 3);
    }
}
