use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A positive charge amount in minor units (e.g. cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Amount(u64);

impl Amount {
    pub fn new(value: u64) -> Result<Self, PaymentError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Amount {
    type Error = PaymentError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// An ISO-4217 style three letter currency code, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, PaymentError> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(PaymentError::ValidationError(format!(
                "Invalid currency code: {code:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated charge submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: Amount,
    pub currency: Currency,
    /// Opaque payment source token, e.g. `tok_visa`.
    pub source: String,
    pub email: String,
}

impl ChargeRequest {
    pub fn new(amount: u64, currency: &str, source: &str, email: &str) -> Result<Self, PaymentError> {
        Ok(Self {
            amount: Amount::new(amount)?,
            currency: Currency::new(currency)?,
            source: source.to_string(),
            email: email.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Stripe,
    Paypal,
    Blocked,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::Paypal => "paypal",
            Provider::Blocked => "blocked",
        }
    }

    /// The status a charge routed to this provider ends in.
    pub fn status(&self) -> ChargeStatus {
        match self {
            Provider::Blocked => ChargeStatus::Blocked,
            Provider::Stripe | Provider::Paypal => ChargeStatus::Success,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Success,
    Blocked,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Success => "success",
            ChargeStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed charge attempt. Never mutated once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub amount: Amount,
    pub currency: Currency,
    pub source: String,
    pub email: String,
    pub provider: Provider,
    pub status: ChargeStatus,
    pub risk_score: f64,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
    pub risk_factors: Vec<String>,
}

impl Transaction {
    /// Builds the ledger record for a routed charge. Status is derived from
    /// the provider so that `blocked` provider and `blocked` status always agree.
    pub fn record(
        request: ChargeRequest,
        provider: Provider,
        risk_score: f64,
        explanation: String,
        risk_factors: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount: request.amount,
            currency: request.currency,
            source: request.source,
            email: request.email,
            provider,
            status: provider.status(),
            risk_score,
            explanation,
            created_at,
            risk_factors,
        }
    }
}

/// Conjunctive query over the transaction ledger. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub provider: Option<Provider>,
    pub status: Option<ChargeStatus>,
    pub min_amount: Option<u64>,
    pub max_amount: Option<u64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        let amount = tx.amount.value();
        self.provider.is_none_or(|p| p == tx.provider)
            && self.status.is_none_or(|s| s == tx.status)
            && self.min_amount.is_none_or(|min| amount >= min)
            && self.max_amount.is_none_or(|max| amount <= max)
            && self.from.is_none_or(|from| tx.created_at >= from)
            && self.to.is_none_or(|to| tx.created_at <= to)
    }
}

/// Aggregate view over every transaction in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total_transactions: usize,
    pub successful: usize,
    pub blocked: usize,
    pub total_amount: u64,
    pub average_risk_score: f64,
    pub by_provider: BTreeMap<Provider, usize>,
}

impl LedgerStats {
    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut stats = Self::default();
        let mut risk_sum = 0.0;

        for tx in transactions {
            stats.total_transactions += 1;
            match tx.status {
                ChargeStatus::Success => stats.successful += 1,
                ChargeStatus::Blocked => stats.blocked += 1,
            }
            stats.total_amount += tx.amount.value();
            risk_sum += tx.risk_score;
            *stats.by_provider.entry(tx.provider).or_insert(0) += 1;
        }

        if stats.total_transactions > 0 {
            stats.average_risk_score = risk_sum / stats.total_transactions as f64;
        }
        stats
    }
}

/// Sorts newest-first; ties keep the later-appended record first.
pub fn newest_first<T>(mut items: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.reverse();
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}
