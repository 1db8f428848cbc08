use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Record type name under which payment records are addressed by notification handlers.
pub const PAYMENT_DOCTYPE: &str = "Razorpay Payment";

/// Record type that recovered payments are linked to.
pub const PAYMENT_REQUEST_DOCTYPE: &str = "Payment Request";

/// Lifecycle state of a payment record.
///
/// The derived ordering is the lifecycle order: a record only ever moves to the
/// immediate successor of its current state.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
}

impl PaymentStatus {
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::Authorized),
            Self::Authorized => Some(Self::Captured),
            Self::Captured => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Authorized => "Authorized",
            Self::Captured => "Captured",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positive amount in the currency's minor unit, as the gateway expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(i64);

impl Amount {
    pub fn new(value: i64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(ReconcileError::MalformedPayload(format!(
                "Amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// Pointer to the external order/invoice record a payment settles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub doctype: String,
    pub docname: String,
}

impl DocumentRef {
    pub fn new(doctype: impl Into<String>, docname: impl Into<String>) -> Self {
        Self {
            doctype: doctype.into(),
            docname: docname.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.doctype, self.docname)
    }
}

/// Gateway-reported fields captured at creation or authorization time.
///
/// Known fields are typed; anything else the gateway or caller supplied is kept in `extra`
/// so the payload round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_doctype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_docname: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaymentData {
    /// Amount to submit with a capture request.
    pub fn capture_amount(&self) -> Result<Amount> {
        self.amount
            .ok_or_else(|| ReconcileError::MalformedPayload("payment data has no amount".into()))
            .and_then(Amount::new)
    }
}

/// Per-save flags that are never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFlags {
    /// Use the record's `sandbox_response` instead of calling the gateway.
    pub is_sandbox: bool,
    /// Set when the current operation moved the record into a new status.
    pub status_changed_to: Option<PaymentStatus>,
}

/// One attempt to collect money through the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Gateway-assigned identifier; the record's primary key.
    pub razorpay_payment_id: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub data: PaymentData,
    #[serde(default)]
    pub reference: Option<DocumentRef>,
    #[serde(default)]
    pub sandbox_response: Option<Value>,
    #[serde(skip)]
    pub flags: RecordFlags,
}

impl PaymentRecord {
    /// A payment requested by a caller, not yet confirmed with the gateway.
    pub fn new(razorpay_payment_id: impl Into<String>, data: PaymentData) -> Self {
        Self {
            razorpay_payment_id: razorpay_payment_id.into(),
            status: PaymentStatus::Created,
            data,
            reference: None,
            sandbox_response: None,
            flags: RecordFlags::default(),
        }
    }

    pub fn with_reference(mut self, reference: DocumentRef) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_sandbox_response(mut self, response: Value) -> Self {
        self.sandbox_response = Some(response);
        self.flags.is_sandbox = true;
        self
    }

    /// Checks that `to` is the immediate successor of the current status.
    pub fn check_transition(&self, to: PaymentStatus) -> Result<()> {
        if self.status.successor() == Some(to) {
            Ok(())
        } else {
            Err(ReconcileError::InvalidTransition {
                payment_id: self.razorpay_payment_id.clone(),
                from: self.status,
                to,
            })
        }
    }

    /// Moves the record to `to` and flags the change for the notifier.
    pub fn advance_to(&mut self, to: PaymentStatus) -> Result<()> {
        self.check_transition(to)?;
        self.status = to;
        self.flags.status_changed_to = Some(to);
        Ok(())
    }
}

/// A status change that has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub payment_id: String,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub reference: Option<DocumentRef>,
}
