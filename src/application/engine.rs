use super::explanation::ExplanationService;
use super::registry::SubscriptionRegistry;
use super::scheduler::{RecurrenceScheduler, SchedulerHandle, SweepOutcome};
use crate::config::AppConfig;
use crate::domain::charge::{
    ChargeRequest, ChargeStatus, LedgerStats, Provider, Transaction, TransactionFilter,
};
use crate::domain::ports::{SharedClock, SubscriptionLedgerBox, SubscriptionStoreBox, TransactionLedgerBox};
use crate::domain::risk::{FraudRules, RiskScoringEngine};
use crate::domain::routing::ProviderRouter;
use crate::domain::subscription::{NewSubscription, Subscription, SubscriptionStats, SubscriptionTransaction};
use crate::error::{PaymentError, Result};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::in_memory::{
    InMemorySubscriptionLedger, InMemorySubscriptionStore, InMemoryTransactionLedger,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// What the caller learns about a processed charge.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeReceipt {
    pub transaction_id: Uuid,
    pub provider: Provider,
    pub status: ChargeStatus,
    /// Risk score rounded to two decimals.
    pub risk_score: f64,
    pub explanation: String,
}

/// The main entry point for charge routing and recurring donations.
///
/// `PaymentEngine` owns the transaction ledger and the subscription registry
/// and wires the scoring, routing and explanation steps of the charge path.
pub struct PaymentEngine {
    risk: RiskScoringEngine,
    router: ProviderRouter,
    explanations: ExplanationService,
    transactions: TransactionLedgerBox,
    registry: Arc<SubscriptionRegistry>,
    scheduler: Arc<RecurrenceScheduler>,
    clock: SharedClock,
}

/// Storage and clock used to build a [`PaymentEngine`].
pub struct EngineParts {
    pub transactions: TransactionLedgerBox,
    pub subscriptions: SubscriptionStoreBox,
    pub subscription_ledger: SubscriptionLedgerBox,
    pub clock: SharedClock,
}

impl Default for EngineParts {
    fn default() -> Self {
        Self {
            transactions: Box::new(InMemoryTransactionLedger::new()),
            subscriptions: Box::new(InMemorySubscriptionStore::new()),
            subscription_ledger: Box::new(InMemorySubscriptionLedger::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

impl PaymentEngine {
    /// Creates a new `PaymentEngine`.
    ///
    /// # Arguments
    ///
    /// * `rules` - Fraud rules used for scoring and routing.
    /// * `explanations` - Explanation service for routing and campaign analysis.
    /// * `success_probability` - Chance a simulated recurring charge succeeds.
    /// * `parts` - Storage backends and clock.
    pub fn new(
        rules: FraudRules,
        explanations: ExplanationService,
        success_probability: f64,
        parts: EngineParts,
    ) -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new(parts.subscriptions, parts.clock.clone()));
        let scheduler = Arc::new(RecurrenceScheduler::new(
            registry.clone(),
            parts.subscription_ledger,
            success_probability,
        )?);
        Ok(Self {
            router: ProviderRouter::from_rules(&rules),
            risk: RiskScoringEngine::new(rules),
            explanations,
            transactions: parts.transactions,
            registry,
            scheduler,
            clock: parts.clock,
        })
    }

    /// Builds an in-memory engine from configuration, rejecting invalid
    /// settings with [`PaymentError::ValidationError`].
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let explanations = ExplanationService::from_config(config.explanation)?;
        Self::new(
            config.rules,
            explanations,
            config.scheduler.success_probability,
            EngineParts::default(),
        )
    }

    /// Scores, routes and explains a charge, then records it in the ledger.
    pub async fn process_charge(&self, request: ChargeRequest) -> Result<ChargeReceipt> {
        let mut score = self.risk.score(&request);
        if !(0.0..=1.0).contains(&score) {
            error!(risk_score = score, "Risk score outside [0, 1] after clamping");
            debug_assert!(false, "risk score {score} outside [0, 1]");
            score = score.clamp(0.0, 1.0);
        }

        let provider = self.router.route(score);
        let factors = self.risk.risk_factors(&request);
        let explanation = self
            .explanations
            .explain_routing(&request, score, provider, &factors)
            .await;

        let tx = Transaction::record(
            request,
            provider,
            score,
            explanation,
            factors.iter().map(|f| f.label().to_string()).collect(),
            self.clock.now(),
        );
        let receipt = ChargeReceipt {
            transaction_id: tx.id,
            provider: tx.provider,
            status: tx.status,
            risk_score: (score * 100.0).round() / 100.0,
            explanation: tx.explanation.clone(),
        };

        info!(
            transaction_id = %tx.id,
            provider = %tx.provider,
            risk_score = receipt.risk_score,
            amount = tx.amount.value(),
            "Charge processed"
        );
        self.transactions.append(tx).await?;
        Ok(receipt)
    }

    pub async fn transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.transactions.get(id).await
    }

    pub async fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.transactions.filter(filter).await
    }

    pub async fn transaction_stats(&self) -> Result<LedgerStats> {
        self.transactions.stats().await
    }

    /// Creates a subscription for a donor without an active one.
    ///
    /// The conflict check, campaign analysis and write all happen inside the
    /// donor's critical section, so two concurrent creations for the same
    /// donor yield one subscription and one [`PaymentError::SubscriptionConflict`].
    pub async fn create_subscription(&self, request: NewSubscription) -> Result<Subscription> {
        let lock = self.registry.lock(&request.donor_id).await;

        if let Some(existing) = self.registry.by_donor(&request.donor_id).await?
            && existing.is_active
        {
            return Err(PaymentError::SubscriptionConflict {
                donor_id: request.donor_id,
            });
        }

        let analysis = self
            .explanations
            .analyze_campaign(&request.campaign_description)
            .await;
        self.registry.create(&lock, request, analysis).await
    }

    pub async fn cancel_subscription(&self, donor_id: &str) -> Result<bool> {
        self.registry.cancel(donor_id).await
    }

    pub async fn subscription_by_donor(&self, donor_id: &str) -> Result<Option<Subscription>> {
        self.registry.by_donor(donor_id).await
    }

    pub async fn active_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.registry.active_subscriptions().await
    }

    pub async fn subscription_stats(&self) -> Result<SubscriptionStats> {
        self.registry.stats().await
    }

    pub async fn subscription_transactions(&self, subscription_id: Uuid) -> Result<Vec<SubscriptionTransaction>> {
        self.scheduler.ledger().by_subscription(subscription_id).await
    }

    /// Every recurring charge attempt, newest first.
    pub async fn recurring_charges(&self) -> Result<Vec<SubscriptionTransaction>> {
        self.scheduler.ledger().get_all().await
    }

    /// Runs a recurrence sweep now, unless one is already running.
    pub async fn trigger_recurrence_sweep(&self) -> Result<SweepOutcome> {
        self.scheduler.trigger().await
    }

    /// Starts the periodic recurrence sweep. A zero period is rejected.
    pub fn start_scheduler(&self, period: Duration) -> Result<SchedulerHandle> {
        self.scheduler.clone().spawn(period)
    }

    /// Drops expired explanation cache entries.
    pub async fn purge_explanation_cache(&self) -> usize {
        self.explanations.purge_expired().await
    }
}
