use crate::domain::subscription::NewSubscription;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads subscription requests from a CSV source with the header
/// `donor_id,amount,currency,interval,description`.
pub struct SubscriptionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SubscriptionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn subscriptions(self) -> impl Iterator<Item = Result<NewSubscription>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
