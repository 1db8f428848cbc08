use crate::domain::payment::{PaymentRecord, PaymentStatus};
use crate::domain::ports::{IncidentLog, PaymentRecordStore, RecordFilter};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for payment records.
///
/// Uses `Arc<RwLock<BTreeMap<String, PaymentRecord>>>` so clones share state and
/// listings come back in identifier order.
/// Ideal for testing or hosts that persist records elsewhere.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    records: Arc<RwLock<BTreeMap<String, PaymentRecord>>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory payment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRecordStore for InMemoryPaymentStore {
    async fn list_by_filter(&self, filter: &RecordFilter) -> Result<Vec<PaymentRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        let records = self.records.read().await;
        Ok(records.get(payment_id).cloned())
    }

    async fn exists(&self, payment_id: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records.contains_key(payment_id))
    }

    async fn transition(
        &self,
        payment_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<PaymentRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(payment_id)
            .ok_or_else(|| ReconcileError::RecordNotFound(payment_id.to_owned()))?;
        if record.status != from {
            return Err(ReconcileError::InvalidTransition {
                payment_id: payment_id.to_owned(),
                from: record.status,
                to,
            });
        }
        record.check_transition(to)?;
        record.status = to;
        Ok(record.clone())
    }

    async fn insert(&self, mut record: PaymentRecord) -> Result<PaymentRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.razorpay_payment_id) {
            return Err(ReconcileError::DuplicatePayment(record.razorpay_payment_id));
        }
        record.flags = Default::default();
        records.insert(record.razorpay_payment_id.clone(), record.clone());
        Ok(record)
    }

    async fn get_all(&self) -> Result<Vec<PaymentRecord>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }
}

/// One operator-facing log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub message: String,
    pub context: Value,
}

/// Incident log that keeps entries in memory for inspection.
#[derive(Default, Clone)]
pub struct InMemoryIncidentLog {
    entries: Arc<RwLock<Vec<Incident>>>,
}

impl InMemoryIncidentLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<Incident> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl IncidentLog for InMemoryIncidentLog {
    async fn log_entry(&self, message: &str, context: Value) {
        self.entries.write().await.push(Incident {
            message: message.to_owned(),
            context,
        });
    }
}
