use crate::domain::charge::ChargeRequest;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads charge requests from a CSV source with the header
/// `amount,currency,source,email`.
///
/// Rows are validated while deserializing, so a zero amount or a malformed
/// currency code surfaces as an `Err` item and the stream carries on.
pub struct ChargeReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ChargeReader<R> {
    /// Creates a new `ChargeReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes charges.
    pub fn charges(self) -> impl Iterator<Item = Result<ChargeRequest>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
