use super::charge::{Amount, Currency};
use crate::error::PaymentError;
use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Serialized lowercase. Parsing, from text or serde, ignores case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Interval {
    /// Returns the next charge time one interval after `from`.
    ///
    /// Monthly and yearly intervals use calendar months, clamping to the last
    /// day of shorter months.
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Interval::Daily => from + Duration::days(1),
            Interval::Weekly => from + Duration::days(7),
            Interval::Monthly => from
                .checked_add_months(Months::new(1))
                .unwrap_or(from + Duration::days(30)),
            Interval::Yearly => from
                .checked_add_months(Months::new(12))
                .unwrap_or(from + Duration::days(365)),
        }
    }

    /// Normalizes one charge of this interval to a 30-day month.
    pub fn to_monthly(&self, amount: Decimal) -> Decimal {
        match self {
            Interval::Daily => amount * dec!(30),
            Interval::Weekly => amount * dec!(4.33),
            Interval::Monthly => amount,
            Interval::Yearly => amount / dec!(12),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
            Interval::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Interval::Daily),
            "weekly" => Ok(Interval::Weekly),
            "monthly" => Ok(Interval::Monthly),
            "yearly" => Ok(Interval::Yearly),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown interval: {other:?}"
            ))),
        }
    }
}

impl TryFrom<String> for Interval {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.as_str().to_string()
    }
}

/// Tags and a short summary describing a donation campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignAnalysis {
    pub tags: Vec<String>,
    pub summary: String,
}

/// Input for creating a recurring donation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewSubscription {
    pub donor_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub interval: Interval,
    #[serde(rename = "description")]
    pub campaign_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub donor_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub interval: Interval,
    pub tags: Vec<String>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub last_charged_at: Option<DateTime<Utc>>,
    pub next_charge_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Subscription {
    pub fn new(request: NewSubscription, analysis: CampaignAnalysis, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            donor_id: request.donor_id,
            amount: request.amount,
            currency: request.currency,
            interval: request.interval,
            tags: analysis.tags,
            summary: analysis.summary,
            created_at: now,
            last_charged_at: None,
            next_charge_at: request.interval.advance(now),
            is_active: true,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_charge_at <= now
    }

    /// Records a successful charge at `now` and schedules the next one.
    pub fn mark_charged(&mut self, now: DateTime<Utc>) {
        self.last_charged_at = Some(now);
        self.next_charge_at = self.interval.advance(now);
    }

    /// Cancels the subscription. Returns false if it was already cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.is_active {
            self.is_active = false;
            true
        } else {
            false
        }
    }

    pub fn monthly_amount(&self) -> Decimal {
        self.interval.to_monthly(Decimal::from(self.amount.value()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionChargeStatus {
    Success,
    Failed,
}

impl fmt::Display for SubscriptionChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionChargeStatus::Success => f.write_str("success"),
            SubscriptionChargeStatus::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionChargeType {
    Recurring,
}

/// One recurring charge attempt against a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionTransaction {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub donor_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub status: SubscriptionChargeStatus,
    pub created_at: DateTime<Utc>,
    pub r#type: SubscriptionChargeType,
}

impl SubscriptionTransaction {
    pub fn recurring(
        subscription: &Subscription,
        status: SubscriptionChargeStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            donor_id: subscription.donor_id.clone(),
            amount: subscription.amount,
            currency: subscription.currency.clone(),
            status,
            created_at,
            r#type: SubscriptionChargeType::Recurring,
        }
    }
}

/// Aggregates over the registry. Everything except `cancelled` counts
/// active subscriptions only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriptionStats {
    pub active: usize,
    pub cancelled: usize,
    pub monthly_recurring_revenue: Decimal,
    pub by_tag: BTreeMap<String, usize>,
    pub by_interval: BTreeMap<Interval, usize>,
}

impl SubscriptionStats {
    pub fn from_subscriptions<'a>(subscriptions: impl IntoIterator<Item = &'a Subscription>) -> Self {
        let mut stats = Self::default();

        for sub in subscriptions {
            if !sub.is_active {
                stats.cancelled += 1;
                continue;
            }
            stats.active += 1;
            stats.monthly_recurring_revenue += sub.monthly_amount();
            for tag in &sub.tags {
                *stats.by_tag.entry(tag.clone()).or_insert(0) += 1;
            }
            *stats.by_interval.entry(sub.interval).or_insert(0) += 1;
        }

        stats
    }
}
