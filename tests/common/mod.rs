#![allow(dead_code)]

use async_trait::async_trait;
use razorpay_reconcile::application::notifier::LifecycleNotifier;
use razorpay_reconcile::application::reconciler::Reconciler;
use razorpay_reconcile::domain::gateway::{Credentials, GatewayError};
use razorpay_reconcile::domain::payment::{
    DocumentRef, PAYMENT_DOCTYPE, PaymentData, PaymentRecord, PaymentStatus,
};
use razorpay_reconcile::domain::ports::{PaymentAuthorizedHandler, PaymentGateway};
use razorpay_reconcile::error::Result;
use razorpay_reconcile::infrastructure::in_memory::{InMemoryIncidentLog, InMemoryPaymentStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Fetch(String),
    Submit(String, Value),
}

/// Scripted gateway: answers by request path and records every call.
#[derive(Default, Clone)]
pub struct FakeGateway {
    responses: Arc<Mutex<HashMap<String, std::result::Result<Value, GatewayError>>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    fetch_delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, response: std::result::Result<Value, GatewayError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_owned(), response);
    }

    /// Serves `items` as the (single page) payment list.
    pub fn list(&self, items: Value) {
        self.respond(
            "/v1/payments?count=100&skip=0",
            Ok(serde_json::json!({ "entity": "collection", "items": items })),
        );
    }

    /// Holds every `fetch` for `delay` before answering.
    pub fn delay_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, path: &str) -> std::result::Result<Value, GatewayError> {
        self.responses
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| Err(GatewayError::InvalidRequest(format!("no route for {path}"))))
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn fetch(
        &self,
        path: &str,
        _credentials: &Credentials,
    ) -> std::result::Result<Value, GatewayError> {
        self.calls.lock().unwrap().push(Call::Fetch(path.to_owned()));
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.answer(path)
    }

    async fn submit(
        &self,
        path: &str,
        payload: Value,
        _credentials: &Credentials,
    ) -> std::result::Result<Value, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Submit(path.to_owned(), payload));
        self.answer(path)
    }
}

/// Handler that remembers every notification it received.
#[derive(Default, Clone)]
pub struct RecordingHandler {
    received: Arc<Mutex<Vec<(DocumentRef, String)>>>,
}

impl RecordingHandler {
    pub fn received(&self) -> Vec<(DocumentRef, String)> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentAuthorizedHandler for RecordingHandler {
    async fn on_payment_authorized(
        &self,
        target: &DocumentRef,
        payment: &PaymentRecord,
    ) -> Result<()> {
        self.received
            .lock()
            .unwrap()
            .push((target.clone(), payment.razorpay_payment_id.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub store: InMemoryPaymentStore,
    pub gateway: FakeGateway,
    pub incidents: InMemoryIncidentLog,
    pub handler: RecordingHandler,
    pub reconciler: Reconciler,
}

/// Reconciler over in-memory collaborators; `handler` receives notifications for the
/// payment record itself and for any reference type.
pub fn harness() -> Harness {
    let store = InMemoryPaymentStore::new();
    let gateway = FakeGateway::new();
    let incidents = InMemoryIncidentLog::new();
    let handler = RecordingHandler::default();

    let notifier = LifecycleNotifier::new()
        .with_handler(PAYMENT_DOCTYPE, Arc::new(handler.clone()))
        .with_fallback(Arc::new(handler.clone()));
    let reconciler = Reconciler::new(
        Box::new(store.clone()),
        Box::new(gateway.clone()),
        notifier,
        Box::new(incidents.clone()),
    );

    Harness {
        store,
        gateway,
        incidents,
        handler,
        reconciler,
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("rzp_test_1DP5mmOlF5G5ag", "thisissupersecret")
}

pub fn payment(id: &str, status: PaymentStatus, amount: i64) -> PaymentRecord {
    let mut record = PaymentRecord::new(
        id,
        PaymentData {
            amount: Some(amount),
            ..Default::default()
        },
    );
    record.status = status;
    record
}
