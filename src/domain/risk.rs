//! Fraud risk scoring for incoming charges.
//!
//! The score is the clamped sum of four independent sub-scores (amount, email
//! domain, currency, payment source) plus a small random jitter. Qualitative
//! risk factor labels are derived separately from the rules so that the labels
//! used in explanations stay stable when scoring weights change.

use super::charge::ChargeRequest;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound (exclusive) of the random jitter added to every score.
pub const MAX_JITTER: f64 = 0.1;

const LARGE_AMOUNT: u64 = 10_000;
const MEDIUM_AMOUNT: u64 = 1_000;

/// Thresholds and lists driving risk scoring and provider routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudRules {
    /// Substrings that mark an email address as suspicious.
    pub suspicious_domains: Vec<String>,
    /// Amounts strictly above this value (minor units) get the highest amount risk.
    pub high_risk_amount_threshold: u64,
    /// Scores at or above this value are blocked.
    pub blocking_threshold: f64,
    /// Scores at or below this value (and below the blocking threshold) go to Stripe.
    pub stripe_threshold: f64,
    pub high_risk_currencies: Vec<String>,
    pub base_currency: String,
    /// Marker that identifies a test payment source token.
    pub test_source_marker: String,
}

impl Default for FraudRules {
    fn default() -> Self {
        Self {
            suspicious_domains: ["tempmail", "guerrillamail", "10minutemail", "mailinator", "test.com", "example.com"]
                .into_iter()
                .map(String::from)
                .collect(),
            high_risk_amount_threshold: 50_000,
            blocking_threshold: 0.8,
            stripe_threshold: 0.3,
            high_risk_currencies: ["NGN", "RUB", "VES", "IRR", "KPW"]
                .into_iter()
                .map(String::from)
                .collect(),
            base_currency: "USD".to_string(),
            test_source_marker: "test".to_string(),
        }
    }
}

impl FraudRules {
    fn has_suspicious_domain(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.suspicious_domains
            .iter()
            .any(|domain| !domain.is_empty() && email.contains(&domain.to_lowercase()))
    }

    fn is_base_currency(&self, currency: &str) -> bool {
        currency.eq_ignore_ascii_case(&self.base_currency)
    }

    fn is_high_risk_currency(&self, currency: &str) -> bool {
        self.high_risk_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }

    fn is_test_source(&self, source: &str) -> bool {
        !self.test_source_marker.is_empty()
            && source
                .to_lowercase()
                .contains(&self.test_source_marker.to_lowercase())
    }
}

/// Qualitative reasons a charge looks risky, used only for explanations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskFactor {
    LargeAmount,
    SuspiciousDomain,
    ForeignCurrency,
    TestSource,
}

impl RiskFactor {
    pub fn label(&self) -> &'static str {
        match self {
            RiskFactor::LargeAmount => "large amount",
            RiskFactor::SuspiciousDomain => "suspicious email domain",
            RiskFactor::ForeignCurrency => "foreign currency",
            RiskFactor::TestSource => "test payment source",
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn amount_risk(amount: u64, rules: &FraudRules) -> f64 {
    if amount > rules.high_risk_amount_threshold {
        0.4
    } else if amount > LARGE_AMOUNT {
        0.2
    } else if amount > MEDIUM_AMOUNT {
        0.1
    } else {
        0.05
    }
}

pub fn domain_risk(email: &str, rules: &FraudRules) -> f64 {
    if rules.has_suspicious_domain(email) {
        0.3
    } else {
        0.0
    }
}

pub fn currency_risk(currency: &str, rules: &FraudRules) -> f64 {
    if rules.is_high_risk_currency(currency) {
        0.15
    } else if !rules.is_base_currency(currency) {
        0.05
    } else {
        0.0
    }
}

pub fn source_risk(source: &str, rules: &FraudRules) -> f64 {
    if rules.is_test_source(source) { 0.1 } else { 0.0 }
}

/// Scores charges against a fixed set of fraud rules.
#[derive(Debug, Clone, Default)]
pub struct RiskScoringEngine {
    rules: FraudRules,
}

impl RiskScoringEngine {
    pub fn new(rules: FraudRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &FraudRules {
        &self.rules
    }

    /// Scores a charge using the thread-local RNG for jitter.
    pub fn score(&self, request: &ChargeRequest) -> f64 {
        self.score_with_rng(request, &mut rand::thread_rng())
    }

    pub fn score_with_rng<R: Rng + ?Sized>(&self, request: &ChargeRequest, rng: &mut R) -> f64 {
        let jitter = rng.gen_range(0.0..MAX_JITTER);
        (self.base_score(request) + jitter).clamp(0.0, 1.0)
    }

    /// The deterministic part of the score, before jitter and clamping.
    pub fn base_score(&self, request: &ChargeRequest) -> f64 {
        amount_risk(request.amount.value(), &self.rules)
            + domain_risk(&request.email, &self.rules)
            + currency_risk(request.currency.as_str(), &self.rules)
            + source_risk(&request.source, &self.rules)
    }

    pub fn risk_factors(&self, request: &ChargeRequest) -> Vec<RiskFactor> {
        let mut factors = Vec::new();
        if request.amount.value() > self.rules.high_risk_amount_threshold {
            factors.push(RiskFactor::LargeAmount);
        }
        if self.rules.has_suspicious_domain(&request.email) {
            factors.push(RiskFactor::SuspiciousDomain);
        }
        if !self.rules.is_base_currency(request.currency.as_str()) {
            factors.push(RiskFactor::ForeignCurrency);
        }
        if self.rules.is_test_source(&request.source) {
            factors.push(RiskFactor::TestSource);
        }
        factors
    }
}
