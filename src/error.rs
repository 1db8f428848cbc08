use crate::domain::gateway::GatewayError;
use crate::domain::payment::PaymentStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Payment record not found: {0}")]
    RecordNotFound(String),
    #[error("Payment record already exists: {0}")]
    DuplicatePayment(String),
    #[error("Invalid status transition for {payment_id}: {from} -> {to}")]
    InvalidTransition {
        payment_id: String,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("Malformed payment payload: {0}")]
    MalformedPayload(String),
    #[error("{0} sweep is already running")]
    SweepInProgress(&'static str),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl ReconcileError {
    /// Whether the next sweep cycle may succeed without operator intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway(e) => e.is_retryable(),
            Self::SweepInProgress(_) | Self::IoError(_) | Self::InternalError(_) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for ReconcileError {
    fn from(e: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedPayload(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
