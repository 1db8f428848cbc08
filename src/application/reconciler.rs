use super::notifier::LifecycleNotifier;
use crate::domain::gateway::{
    Credentials, GatewayPayment, STATUS_AUTHORIZED, STATUS_CAPTURED, capture_path, list_path,
    payment_path, reported_status,
};
use crate::domain::payment::{PaymentRecord, PaymentStatus};
use crate::domain::ports::{
    GatewaySettings, IncidentLogBox, PaymentGatewayBox, PaymentRecordStoreBox, RecordFilter,
};
use crate::error::{ReconcileError, Result};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Page size requested from the gateway's payment list.
pub const LIST_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Authorize,
    Capture,
    Recover,
}

impl SweepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authorize => "authorize",
            Self::Capture => "capture",
            Self::Recover => "recover",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub payment_id: String,
    pub error: String,
    pub retryable: bool,
}

/// Outcome of one batch sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub kind: SweepKind,
    pub examined: usize,
    /// Identifiers that changed status (or were inserted, for recovery).
    pub transitioned: Vec<String>,
    pub skipped: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn new(kind: SweepKind) -> Self {
        Self {
            kind,
            examined: 0,
            transitioned: Vec::new(),
            skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Authorized,
    /// The gateway does not report the payment as authorized yet.
    Pending(Option<String>),
    /// Record is past `Created`; nothing to confirm.
    Skipped(PaymentStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured,
    NotCaptured(Option<String>),
    Skipped(PaymentStatus),
}

/// The payment reconciliation state machine.
///
/// Every status change is applied only after the gateway confirmed it, as a single
/// status update on the store. Each sweep kind is serialized by its own lock.
pub struct Reconciler {
    store: PaymentRecordStoreBox,
    gateway: PaymentGatewayBox,
    notifier: LifecycleNotifier,
    incidents: IncidentLogBox,
    authorize_lock: Mutex<()>,
    capture_lock: Mutex<()>,
    recover_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        store: PaymentRecordStoreBox,
        gateway: PaymentGatewayBox,
        notifier: LifecycleNotifier,
        incidents: IncidentLogBox,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            incidents,
            authorize_lock: Mutex::new(()),
            capture_lock: Mutex::new(()),
            recover_lock: Mutex::new(()),
        }
    }

    pub fn notifier(&self) -> &LifecycleNotifier {
        &self.notifier
    }

    /// Persists a caller-requested payment and runs the save hook on it.
    pub async fn create_payment(
        &self,
        mut record: PaymentRecord,
        credentials: &Credentials,
    ) -> Result<PaymentRecord> {
        if record.status != PaymentStatus::Created {
            return Err(ReconcileError::InvalidTransition {
                payment_id: record.razorpay_payment_id,
                from: record.status,
                to: PaymentStatus::Created,
            });
        }
        let flags = record.flags;
        let mut stored = self.store.insert(record).await?;
        stored.flags = flags;
        self.confirm(&mut stored, credentials, flags.is_sandbox).await?;
        Ok(stored)
    }

    /// Record-update hook: confirms records saved in a non-terminal state.
    ///
    /// Gateway failures propagate to the caller.
    pub async fn on_record_saved(
        &self,
        record: &mut PaymentRecord,
        settings: &GatewaySettings,
    ) -> Result<ConfirmOutcome> {
        let sandbox = record.flags.is_sandbox || settings.sandbox;
        self.confirm(record, &settings.credentials, sandbox).await
    }

    /// Checks a single payment with the gateway and marks it authorized if confirmed.
    pub async fn confirm(
        &self,
        record: &mut PaymentRecord,
        credentials: &Credentials,
        sandbox: bool,
    ) -> Result<ConfirmOutcome> {
        record.flags.status_changed_to = None;
        if record.status != PaymentStatus::Created {
            debug!(
                payment_id = %record.razorpay_payment_id,
                status = %record.status,
                "confirm skipped, payment already past created"
            );
            return Ok(ConfirmOutcome::Skipped(record.status));
        }

        let response = match (&record.sandbox_response, sandbox) {
            (Some(response), true) => response.clone(),
            _ => {
                self.gateway
                    .fetch(&payment_path(&record.razorpay_payment_id), credentials)
                    .await?
            }
        };

        let reported = reported_status(&response);
        if reported != Some(STATUS_AUTHORIZED) {
            debug!(
                payment_id = %record.razorpay_payment_id,
                reported = ?reported,
                "payment not authorized yet"
            );
            return Ok(ConfirmOutcome::Pending(reported.map(str::to_owned)));
        }

        // The stored status may have moved on while the gateway call was in flight.
        let from = record.status;
        self.store
            .transition(&record.razorpay_payment_id, from, PaymentStatus::Authorized)
            .await?;
        record.advance_to(PaymentStatus::Authorized)?;
        info!(payment_id = %record.razorpay_payment_id, "payment authorized");

        self.notifier.notify(record, from).await?;
        Ok(ConfirmOutcome::Authorized)
    }

    /// Confirms every record still in `Created`; one failure never stops the others.
    pub async fn authorize_batch(&self, credentials: &Credentials) -> Result<SweepReport> {
        let _guard = self
            .authorize_lock
            .try_lock()
            .map_err(|_| ReconcileError::SweepInProgress(SweepKind::Authorize.as_str()))?;

        let mut report = SweepReport::new(SweepKind::Authorize);
        let records = self
            .store
            .list_by_filter(&RecordFilter::status(PaymentStatus::Created))
            .await?;

        for mut record in records {
            report.examined += 1;
            let prior = record.status;
            match self.confirm(&mut record, credentials, false).await {
                Ok(ConfirmOutcome::Authorized) => report.transitioned.push(record.razorpay_payment_id),
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    self.record_failure(&mut report, &record.razorpay_payment_id, prior, credentials, e)
                        .await
                }
            }
        }

        log_report(&report);
        Ok(report)
    }

    /// Captures authorized payments, optionally narrowed to one identifier.
    ///
    /// With `sandbox` set and a `sandbox_response` supplied, the response stands in for
    /// the gateway's capture call.
    pub async fn capture(
        &self,
        payment_id: Option<&str>,
        credentials: &Credentials,
        sandbox: bool,
        sandbox_response: Option<&Value>,
    ) -> Result<SweepReport> {
        let _guard = self
            .capture_lock
            .try_lock()
            .map_err(|_| ReconcileError::SweepInProgress(SweepKind::Capture.as_str()))?;

        let mut filter = RecordFilter::status(PaymentStatus::Authorized);
        if let Some(id) = payment_id {
            filter = filter.with_payment_id(id);
        }
        let canned = sandbox_response.filter(|_| sandbox);

        let mut report = SweepReport::new(SweepKind::Capture);
        for record in self.store.list_by_filter(&filter).await? {
            report.examined += 1;
            match self.capture_payment(&record, credentials, canned).await {
                Ok(CaptureOutcome::Captured) => report.transitioned.push(record.razorpay_payment_id),
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    self.record_failure(
                        &mut report,
                        &record.razorpay_payment_id,
                        record.status,
                        credentials,
                        e,
                    )
                    .await
                }
            }
        }

        log_report(&report);
        Ok(report)
    }

    /// Captures one payment. Records not in `Authorized` are left alone and the gateway
    /// is not contacted.
    pub async fn capture_payment(
        &self,
        record: &PaymentRecord,
        credentials: &Credentials,
        sandbox_response: Option<&Value>,
    ) -> Result<CaptureOutcome> {
        if record.status != PaymentStatus::Authorized {
            debug!(
                payment_id = %record.razorpay_payment_id,
                status = %record.status,
                "capture skipped, payment not authorized"
            );
            return Ok(CaptureOutcome::Skipped(record.status));
        }

        let response = match sandbox_response {
            Some(response) => response.clone(),
            None => {
                let amount = record.data.capture_amount()?;
                self.gateway
                    .submit(
                        &capture_path(&record.razorpay_payment_id),
                        json!({ "amount": amount.value() }),
                        credentials,
                    )
                    .await?
            }
        };

        let reported = reported_status(&response);
        if reported != Some(STATUS_CAPTURED) {
            return Ok(CaptureOutcome::NotCaptured(reported.map(str::to_owned)));
        }

        self.store
            .transition(
                &record.razorpay_payment_id,
                record.status,
                PaymentStatus::Captured,
            )
            .await?;
        info!(payment_id = %record.razorpay_payment_id, "payment captured");
        Ok(CaptureOutcome::Captured)
    }

    /// Inserts payments the gateway reports as authorized but the store has never seen.
    pub async fn recover_missing(&self, credentials: &Credentials) -> Result<SweepReport> {
        let _guard = self
            .recover_lock
            .try_lock()
            .map_err(|_| ReconcileError::SweepInProgress(SweepKind::Recover.as_str()))?;

        let items = match self.fetch_all_payments(credentials).await {
            Ok(items) => items,
            Err(e) => {
                self.incidents
                    .log_entry(
                        &e.to_string(),
                        json!({ "credentials": credentials.redacted(), "sweep": "recover" }),
                    )
                    .await;
                return Err(e);
            }
        };

        let mut report = SweepReport::new(SweepKind::Recover);
        for item in items {
            report.examined += 1;
            let payment_id = item
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_owned();
            match self.recover_one(item).await {
                Ok(true) => report.transitioned.push(payment_id),
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    self.record_failure(
                        &mut report,
                        &payment_id,
                        PaymentStatus::Authorized,
                        credentials,
                        e,
                    )
                    .await
                }
            }
        }

        log_report(&report);
        Ok(report)
    }

    async fn recover_one(&self, item: Value) -> Result<bool> {
        let payment: GatewayPayment = serde_json::from_value(item)?;
        if !payment.is_authorized() || self.store.exists(&payment.id).await? {
            return Ok(false);
        }

        let record = self.store.insert(payment.into_authorized_record()).await?;
        info!(
            payment_id = %record.razorpay_payment_id,
            reference = ?record.reference,
            "recovered authorized payment missing from records"
        );
        Ok(true)
    }

    /// Pages through the gateway's payment list until a short page, or until a page
    /// brings no identifier not already seen.
    async fn fetch_all_payments(&self, credentials: &Credentials) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut skip = 0;
        loop {
            let response = self
                .gateway
                .fetch(&list_path(LIST_PAGE_SIZE, skip), credentials)
                .await?;
            let page = match response.get("items") {
                Some(Value::Array(page)) => page.clone(),
                _ => {
                    return Err(ReconcileError::MalformedPayload(
                        "payment list has no items array".into(),
                    ));
                }
            };
            let short_page = page.len() < LIST_PAGE_SIZE;
            skip += page.len();

            let mut fresh = 0;
            for item in page {
                match item.get("id").and_then(Value::as_str) {
                    Some(id) if !seen.insert(id.to_owned()) => continue,
                    Some(_) => fresh += 1,
                    None => {}
                }
                items.push(item);
            }

            if short_page {
                return Ok(items);
            }
            if fresh == 0 {
                warn!(skip, "payment list page repeated known payments, stopping");
                return Ok(items);
            }
        }
    }

    async fn record_failure(
        &self,
        report: &mut SweepReport,
        payment_id: &str,
        prior: PaymentStatus,
        credentials: &Credentials,
        error: ReconcileError,
    ) {
        warn!(
            sweep = %report.kind,
            payment_id = %payment_id,
            error = %error,
            "payment failed during sweep"
        );
        self.incidents
            .log_entry(
                &error.to_string(),
                json!({
                    "credentials": credentials.redacted(),
                    "doc_name": payment_id,
                    "status": prior.as_str(),
                    "sweep": report.kind.as_str(),
                }),
            )
            .await;
        report.failures.push(SweepFailure {
            payment_id: payment_id.to_owned(),
            retryable: error.is_retryable(),
            error: error.to_string(),
        });
    }
}

fn log_report(report: &SweepReport) {
    if report.is_clean() {
        info!(
            sweep = %report.kind,
            examined = report.examined,
            transitioned = report.transitioned.len(),
            skipped = report.skipped,
            "sweep finished"
        );
    } else {
        warn!(
            sweep = %report.kind,
            examined = report.examined,
            transitioned = report.transitioned.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "sweep finished with failures"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gateway::GatewayError;
    use crate::domain::payment::PaymentData;
    use crate::domain::ports::{MockPaymentGateway, PaymentRecordStore};
    use crate::infrastructure::in_memory::{InMemoryIncidentLog, InMemoryPaymentStore};

    fn credentials() -> Credentials {
        Credentials::new("rzp_test_key", "secret")
    }

    fn record(id: &str, status: PaymentStatus, amount: i64) -> PaymentRecord {
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

    fn reconciler(
        store: &InMemoryPaymentStore,
        gateway: MockPaymentGateway,
        incidents: &InMemoryIncidentLog,
    ) -> Reconciler {
        Reconciler::new(
            Box::new(store.clone()),
            Box::new(gateway),
            LifecycleNotifier::new(),
            Box::new(incidents.clone()),
        )
    }

    #[tokio::test]
    async fn test_capture_never_touches_created_record() {
        let store = InMemoryPaymentStore::new();
        let created = store
            .insert(record("pay_1", PaymentStatus::Created, 100))
            .await
            .unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_submit().times(0);
        gateway.expect_fetch().times(0);

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);

        let outcome = engine
            .capture_payment(&created, &credentials(), None)
            .await
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Skipped(PaymentStatus::Created));
        let stored = store.get("pay_1").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Created);
    }

    #[tokio::test]
    async fn test_capture_submits_amount() {
        let store = InMemoryPaymentStore::new();
        store
            .insert(record("pay_1", PaymentStatus::Authorized, 4200))
            .await
            .unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_submit()
            .withf(|path, payload, _| {
                path == "/v1/payments/pay_1/capture" && payload == &json!({"amount": 4200})
            })
            .times(1)
            .returning(|_, _, _| Ok(json!({"id": "pay_1", "status": "captured"})));

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);
        let report = engine
            .capture(None, &credentials(), false, None)
            .await
            .unwrap();

        assert_eq!(report.transitioned, vec!["pay_1".to_string()]);
        let stored = store.get("pay_1").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Captured);
    }

    #[tokio::test]
    async fn test_capture_failure_is_logged_and_isolated() {
        let store = InMemoryPaymentStore::new();
        store
            .insert(record("pay_bad", PaymentStatus::Authorized, 100))
            .await
            .unwrap();
        store
            .insert(record("pay_ok", PaymentStatus::Authorized, 200))
            .await
            .unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_submit()
            .withf(|path, _, _| path.contains("pay_bad"))
            .returning(|_, _, _| {
                Err(GatewayError::InvalidRequest(
                    "payment has already been captured".into(),
                ))
            });
        gateway
            .expect_submit()
            .withf(|path, _, _| path.contains("pay_ok"))
            .returning(|_, _, _| Ok(json!({"status": "captured"})));

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);
        let report = engine
            .capture(None, &credentials(), false, None)
            .await
            .unwrap();

        assert_eq!(report.examined, 2);
        assert_eq!(report.transitioned, vec!["pay_ok".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.failures[0].retryable);

        let entries = incidents.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].context["doc_name"], "pay_bad");
        assert_eq!(entries[0].context["status"], "Authorized");
        assert_eq!(entries[0].context["credentials"]["api_key"], "rzp_test_key");
        assert!(!entries[0].context.to_string().contains("\"secret\""));

        let bad = store.get("pay_bad").await.unwrap().unwrap();
        assert_eq!(bad.status, PaymentStatus::Authorized);
    }

    #[tokio::test]
    async fn test_capture_sandbox_response_skips_gateway() {
        let store = InMemoryPaymentStore::new();
        store
            .insert(record("pay_1", PaymentStatus::Authorized, 100))
            .await
            .unwrap();
        store
            .insert(record("pay_2", PaymentStatus::Authorized, 100))
            .await
            .unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_submit().times(0);

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);
        let canned = json!({"status": "captured"});
        let report = engine
            .capture(Some("pay_2"), &credentials(), true, Some(&canned))
            .await
            .unwrap();

        assert_eq!(report.examined, 1);
        assert_eq!(
            store.get("pay_1").await.unwrap().unwrap().status,
            PaymentStatus::Authorized
        );
        assert_eq!(
            store.get("pay_2").await.unwrap().unwrap().status,
            PaymentStatus::Captured
        );
    }

    #[tokio::test]
    async fn test_capture_missing_amount_is_isolated_failure() {
        let store = InMemoryPaymentStore::new();
        let mut no_amount = record("pay_1", PaymentStatus::Authorized, 1);
        no_amount.data.amount = None;
        store.insert(no_amount).await.unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_submit().times(0);

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);
        let report = engine
            .capture(None, &credentials(), false, None)
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(incidents.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_skips_authorized_record_without_gateway_call() {
        let store = InMemoryPaymentStore::new();
        let mut authorized = store
            .insert(record("pay_1", PaymentStatus::Authorized, 100))
            .await
            .unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_fetch().times(0);

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);
        let outcome = engine
            .confirm(&mut authorized, &credentials(), false)
            .await
            .unwrap();

        assert_eq!(outcome, ConfirmOutcome::Skipped(PaymentStatus::Authorized));
        assert_eq!(authorized.flags.status_changed_to, None);
        assert!(engine.notifier().last_transition().await.is_none());
    }

    #[tokio::test]
    async fn test_confirm_failure_propagates() {
        let store = InMemoryPaymentStore::new();
        let mut created = store
            .insert(record("pay_1", PaymentStatus::Created, 100))
            .await
            .unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_fetch()
            .returning(|_, _| Err(GatewayError::Authentication("bad key".into())));

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);
        let result = engine.confirm(&mut created, &credentials(), false).await;

        assert!(matches!(
            result,
            Err(ReconcileError::Gateway(GatewayError::Authentication(_)))
        ));
        assert_eq!(created.status, PaymentStatus::Created);
        // Foreground failures go to the caller, not the incident log.
        assert!(incidents.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_recover_pages_through_list() {
        let store = InMemoryPaymentStore::new();
        let mut gateway = MockPaymentGateway::new();

        let full_page: Vec<Value> = (0..LIST_PAGE_SIZE)
            .map(|i| json!({"id": format!("pay_{i}"), "status": "captured", "notes": []}))
            .collect();
        gateway
            .expect_fetch()
            .withf(|path, _| path == "/v1/payments?count=100&skip=0")
            .times(1)
            .returning(move |_, _| Ok(json!({ "items": full_page.clone() })));
        gateway
            .expect_fetch()
            .withf(|path, _| path == "/v1/payments?count=100&skip=100")
            .times(1)
            .returning(|_, _| {
                Ok(json!({"items": [
                    {"id": "pay_late", "status": "authorized", "amount": 10, "notes": []}
                ]}))
            });

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);
        let report = engine.recover_missing(&credentials()).await.unwrap();

        assert_eq!(report.examined, LIST_PAGE_SIZE + 1);
        assert_eq!(report.transitioned, vec!["pay_late".to_string()]);
        assert!(store.exists("pay_late").await.unwrap());
    }

    #[tokio::test]
    async fn test_recover_stops_when_skip_is_ignored() {
        let store = InMemoryPaymentStore::new();
        let mut gateway = MockPaymentGateway::new();

        let same_page: Vec<Value> = (0..LIST_PAGE_SIZE)
            .map(|i| json!({"id": format!("pay_{i}"), "status": "captured", "notes": []}))
            .collect();
        gateway
            .expect_fetch()
            .times(2)
            .returning(move |_, _| Ok(json!({ "items": same_page.clone() })));

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);
        let report = engine.recover_missing(&credentials()).await.unwrap();

        assert_eq!(report.examined, LIST_PAGE_SIZE);
        assert!(report.transitioned.is_empty());
    }

    #[tokio::test]
    async fn test_recover_list_failure_aborts_sweep() {
        let store = InMemoryPaymentStore::new();
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_fetch()
            .returning(|_, _| Err(GatewayError::Gateway("503 Service Unavailable".into())));

        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);
        let result = engine.recover_missing(&credentials()).await;

        assert!(matches!(result, Err(ReconcileError::Gateway(_))));
        assert_eq!(incidents.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sweep_is_rejected() {
        let store = InMemoryPaymentStore::new();
        let gateway = MockPaymentGateway::new();
        let incidents = InMemoryIncidentLog::new();
        let engine = reconciler(&store, gateway, &incidents);

        let _held = engine.capture_lock.lock().await;
        let result = engine.capture(None, &credentials(), false, None).await;
        assert!(matches!(result, Err(ReconcileError::SweepInProgress("capture"))));

        // Other sweep kinds are unaffected.
        assert!(engine.authorize_batch(&credentials()).await.is_ok());
    }
}
