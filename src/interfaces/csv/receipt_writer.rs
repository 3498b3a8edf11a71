use crate::application::engine::ChargeReceipt;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct ReceiptRow<'a> {
    transaction_id: String,
    provider: &'a str,
    status: &'a str,
    risk_score: String,
    explanation: &'a str,
}

/// Writes charge receipts as CSV with the header
/// `transaction_id,provider,status,risk_score,explanation`.
pub struct ReceiptWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReceiptWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_receipt(&mut self, receipt: &ChargeReceipt) -> Result<()> {
        self.writer.serialize(ReceiptRow {
            transaction_id: receipt.transaction_id.to_string(),
            provider: receipt.provider.as_str(),
            status: receipt.status.as_str(),
            risk_score: format!("{:.2}", receipt.risk_score),
            explanation: &receipt.explanation,
        })?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
