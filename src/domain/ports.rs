use super::charge::{LedgerStats, Transaction, TransactionFilter};
use super::subscription::{Subscription, SubscriptionTransaction};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Append-only record of routed charges.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn append(&self, tx: Transaction) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Transaction>>;
    /// Transactions matching every predicate in `filter`, newest first.
    async fn filter(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;
    async fn stats(&self) -> Result<LedgerStats>;
}

/// Subscriptions keyed by donor. Storing a subscription replaces any
/// previous record for the same donor.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn store(&self, subscription: Subscription) -> Result<()>;
    async fn get(&self, donor_id: &str) -> Result<Option<Subscription>>;
    async fn get_all(&self) -> Result<Vec<Subscription>>;
}

/// Append-only record of recurring charge attempts.
#[async_trait]
pub trait SubscriptionLedger: Send + Sync {
    async fn append(&self, tx: SubscriptionTransaction) -> Result<()>;
    async fn by_subscription(&self, subscription_id: Uuid) -> Result<Vec<SubscriptionTransaction>>;
    async fn get_all(&self) -> Result<Vec<SubscriptionTransaction>>;
}

/// A prompt for the natural-language explanation generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    /// Ask the generator for a strict JSON object.
    pub json: bool,
}

/// Capability that turns a prompt into text. Failures are recovered by the caller.
#[async_trait]
pub trait ExplanationGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type TransactionLedgerBox = Box<dyn TransactionLedger>;
pub type SubscriptionStoreBox = Box<dyn SubscriptionStore>;
pub type SubscriptionLedgerBox = Box<dyn SubscriptionLedger>;
pub type ExplanationGeneratorBox = Box<dyn ExplanationGenerator>;
pub type SharedClock = Arc<dyn Clock>;
