use super::payment::{
    DocumentRef, PAYMENT_REQUEST_DOCTYPE, PaymentData, PaymentRecord, PaymentStatus,
};
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

/// Gateway status string for a payment whose funds are held.
pub const STATUS_AUTHORIZED: &str = "authorized";
/// Gateway status string for a settled payment.
pub const STATUS_CAPTURED: &str = "captured";

/// Failures surfaced by the gateway client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Credentials rejected. Needs operator intervention.
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// Malformed or state-inconsistent request, e.g. capturing a non-authorized payment.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Gateway-side fault, timeout or unreadable response.
    #[error("Gateway error: {0}")]
    Gateway(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(_))
    }
}

/// API key pair used for HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Log-safe form of the credentials.
    pub fn redacted(&self) -> Value {
        json!({ "api_key": self.api_key, "api_secret": "<redacted>" })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

pub fn payment_path(payment_id: &str) -> String {
    format!("/v1/payments/{payment_id}")
}

pub fn capture_path(payment_id: &str) -> String {
    format!("/v1/payments/{payment_id}/capture")
}

pub fn list_path(count: usize, skip: usize) -> String {
    format!("/v1/payments?count={count}&skip={skip}")
}

/// Status the gateway reports in a payment response, if any.
pub fn reported_status(response: &Value) -> Option<&str> {
    response.get("status").and_then(Value::as_str)
}

/// Linkage metadata the storefront attaches to a payment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PaymentNotes {
    pub payment_request: Option<String>,
    pub reference_doctype: Option<String>,
    pub reference_docname: Option<String>,
}

// The gateway encodes "no notes" as an empty array.
fn deserialize_notes<'de, D>(deserializer: D) -> Result<PaymentNotes, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawNotes {
        Seq(Vec<Value>),
        Map(PaymentNotes),
        Null,
    }

    match RawNotes::deserialize(deserializer)? {
        RawNotes::Map(notes) => Ok(notes),
        RawNotes::Seq(_) | RawNotes::Null => Ok(PaymentNotes::default()),
    }
}

/// One entry of the gateway's payment list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default, deserialize_with = "deserialize_notes")]
    pub notes: PaymentNotes,
}

impl GatewayPayment {
    pub fn is_authorized(&self) -> bool {
        self.status == STATUS_AUTHORIZED
    }

    /// Link to the external record: the payment request when present, else the
    /// order/invoice named directly in the notes.
    pub fn reference(&self) -> Option<DocumentRef> {
        if let Some(request) = &self.notes.payment_request {
            return Some(DocumentRef::new(PAYMENT_REQUEST_DOCTYPE, request.clone()));
        }
        match (&self.notes.reference_doctype, &self.notes.reference_docname) {
            (Some(doctype), Some(docname)) => Some(DocumentRef::new(doctype.clone(), docname.clone())),
            _ => None,
        }
    }

    /// Builds the local record for a payment found authorized at the gateway.
    pub fn into_authorized_record(self) -> PaymentRecord {
        let reference = self.reference();
        let data = PaymentData {
            amount: self.amount,
            description: self.description,
            email: self.email,
            contact: self.contact,
            payment_request: self.notes.payment_request,
            reference_doctype: self.notes.reference_doctype,
            reference_docname: self.notes.reference_docname,
            extra: Default::default(),
        };
        let mut record = PaymentRecord::new(self.id, data);
        record.status = PaymentStatus::Authorized;
        record.reference = reference;
        record
    }
}
