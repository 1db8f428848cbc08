use crate::domain::payment::{DocumentRef, PaymentData, PaymentRecord};
use crate::error::{ReconcileError, Result};
use serde::Deserialize;
use serde_json::json;
use std::io::Read;

/// One row of a payment request import file.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct PaymentRequestRow {
    pub razorpay_payment_id: String,
    pub amount: Option<i64>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub reference_doctype: Option<String>,
    pub reference_docname: Option<String>,
    /// Gateway status to replay in sandbox mode instead of calling the gateway.
    #[serde(default)]
    pub sandbox_status: Option<String>,
}

impl PaymentRequestRow {
    /// Builds a `Created` record; `sandbox` marks it to replay `sandbox_status`.
    pub fn into_record(self, sandbox: bool) -> Result<PaymentRecord> {
        if self.razorpay_payment_id.is_empty() {
            return Err(ReconcileError::MalformedPayload(
                "razorpay_payment_id is empty".into(),
            ));
        }

        let reference = match (&self.reference_doctype, &self.reference_docname) {
            (Some(doctype), Some(docname)) => Some(DocumentRef::new(doctype.clone(), docname.clone())),
            _ => None,
        };
        let data = PaymentData {
            amount: self.amount,
            description: self.description,
            email: self.email,
            contact: self.contact,
            reference_doctype: self.reference_doctype,
            reference_docname: self.reference_docname,
            ..Default::default()
        };

        let mut record = PaymentRecord::new(self.razorpay_payment_id, data);
        record.reference = reference;
        if let Some(status) = self.sandbox_status {
            record.sandbox_response = Some(json!({ "status": status }));
        }
        record.flags.is_sandbox = sandbox;
        Ok(record)
    }
}

/// Reads payment requests from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<PaymentRequestRow>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    /// Creates a new `PaymentReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes rows.
    pub fn payments(self) -> impl Iterator<Item = Result<PaymentRequestRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(ReconcileError::from))
    }
}
