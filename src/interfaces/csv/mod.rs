//! CSV adapters for bulk import of payment requests and dumps of record state.

pub mod payment_reader;
pub mod record_writer;
