//! CSV adapters for the command line: charge and subscription input, receipt output.

pub mod charge_reader;
pub mod receipt_writer;
pub mod subscription_reader;
