use crate::domain::payment::{PaymentRecord, PaymentStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct RecordRow<'a> {
    razorpay_payment_id: &'a str,
    status: PaymentStatus,
    amount: Option<i64>,
    reference_doctype: Option<&'a str>,
    reference_docname: Option<&'a str>,
}

impl<'a> From<&'a PaymentRecord> for RecordRow<'a> {
    fn from(record: &'a PaymentRecord) -> Self {
        Self {
            razorpay_payment_id: &record.razorpay_payment_id,
            status: record.status,
            amount: record.data.amount,
            reference_doctype: record.reference.as_ref().map(|r| r.doctype.as_str()),
            reference_docname: record.reference.as_ref().map(|r| r.docname.as_str()),
        }
    }
}

/// Writes payment record state as CSV.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header and one row per record, sorted by identifier.
    pub fn write_records(&mut self, mut records: Vec<PaymentRecord>) -> Result<()> {
        records.sort_by(|a, b| a.razorpay_payment_id.cmp(&b.razorpay_payment_id));
        if records.is_empty() {
            self.writer.write_record([
                "razorpay_payment_id",
                "status",
                "amount",
                "reference_doctype",
                "reference_docname",
            ])?;
        }
        for record in &records {
            self.writer.serialize(RecordRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
