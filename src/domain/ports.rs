use super::gateway::{Credentials, GatewayError};
use super::payment::{DocumentRef, PaymentRecord, PaymentStatus, Transition};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Selects persisted payment records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub status: Option<PaymentStatus>,
    pub payment_id: Option<String>,
}

impl RecordFilter {
    pub fn status(status: PaymentStatus) -> Self {
        Self {
            status: Some(status),
            payment_id: None,
        }
    }

    pub fn with_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    pub fn matches(&self, record: &PaymentRecord) -> bool {
        self.status.is_none_or(|s| record.status == s)
            && self
                .payment_id
                .as_deref()
                .is_none_or(|id| record.razorpay_payment_id == id)
    }
}

/// Durable table of payment records keyed by gateway payment identifier.
#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    async fn list_by_filter(&self, filter: &RecordFilter) -> Result<Vec<PaymentRecord>>;
    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>>;
    async fn exists(&self, payment_id: &str) -> Result<bool>;
    /// Compare-and-set of the persisted status.
    ///
    /// Writes `to` only if the stored status is still `from` and `to` is its immediate
    /// successor; otherwise fails with `InvalidTransition` and writes nothing. Returns the
    /// stored record after the update.
    async fn transition(
        &self,
        payment_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<PaymentRecord>;
    /// Fails with `DuplicatePayment` if the identifier is already present.
    async fn insert(&self, record: PaymentRecord) -> Result<PaymentRecord>;
    async fn get_all(&self) -> Result<Vec<PaymentRecord>>;
}

/// Read/write access to the payment gateway's HTTP API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn fetch(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> std::result::Result<Value, GatewayError>;

    async fn submit(
        &self,
        path: &str,
        payload: Value,
        credentials: &Credentials,
    ) -> std::result::Result<Value, GatewayError>;
}

/// Implemented by any record type that reacts to a payment being authorized.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentAuthorizedHandler: Send + Sync {
    async fn on_payment_authorized(&self, target: &DocumentRef, payment: &PaymentRecord)
    -> Result<()>;
}

/// Host-application step run after all authorization handlers fired.
#[async_trait]
pub trait TransitionHook: Send + Sync {
    async fn after_transition(&self, transition: &Transition, payment: &PaymentRecord)
    -> Result<()>;
}

/// Operator-facing error journal for background sweeps.
#[async_trait]
pub trait IncidentLog: Send + Sync {
    async fn log_entry(&self, message: &str, context: Value);
}

/// Active gateway credentials and mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub credentials: Credentials,
    pub sandbox: bool,
}

pub trait SettingsProvider: Send + Sync {
    fn gateway_settings(&self) -> Result<GatewaySettings>;
}

impl SettingsProvider for GatewaySettings {
    fn gateway_settings(&self) -> Result<GatewaySettings> {
        Ok(self.clone())
    }
}

pub type PaymentRecordStoreBox = Box<dyn PaymentRecordStore>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
pub type IncidentLogBox = Box<dyn IncidentLog>;
pub type AuthorizedHandlerRef = Arc<dyn PaymentAuthorizedHandler>;
pub type TransitionHookBox = Box<dyn TransitionHook>;
