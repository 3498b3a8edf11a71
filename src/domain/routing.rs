use super::charge::Provider;
use super::risk::FraudRules;

/// Maps a risk score to a payment provider, or blocks the charge.
///
/// Blocking is checked first (`score >= blocking_threshold`), then
/// `score <= stripe_threshold` routes to Stripe; anything else goes to PayPal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderRouter {
    blocking_threshold: f64,
    stripe_threshold: f64,
}

impl ProviderRouter {
    pub fn new(blocking_threshold: f64, stripe_threshold: f64) -> Self {
        Self {
            blocking_threshold,
            stripe_threshold,
        }
    }

    pub fn from_rules(rules: &FraudRules) -> Self {
        Self::new(rules.blocking_threshold, rules.stripe_threshold)
    }

    pub fn route(&self, score: f64) -> Provider {
        if score >= self.blocking_threshold {
            Provider::Blocked
        } else if score <= self.stripe_threshold {
            Provider::Stripe
        } else {
            Provider::Paypal
        }
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::from_rules(&FraudRules::default())
    }
}
