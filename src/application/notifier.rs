use crate::domain::payment::{
    DocumentRef, PAYMENT_DOCTYPE, PaymentRecord, PaymentStatus, Transition,
};
use crate::domain::ports::{AuthorizedHandlerRef, TransitionHookBox};
use crate::error::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Tells interested records that a payment changed state.
///
/// Handlers are keyed by record type. The payment record's own callback lives under
/// [`PAYMENT_DOCTYPE`]; linked orders and invoices under their own type names.
#[derive(Default)]
pub struct LifecycleNotifier {
    handlers: HashMap<String, AuthorizedHandlerRef>,
    fallback: Option<AuthorizedHandlerRef>,
    hooks: Vec<TransitionHookBox>,
    last_transition: RwLock<Option<Transition>>,
}

impl LifecycleNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, doctype: impl Into<String>, handler: AuthorizedHandlerRef) -> Self {
        self.handlers.insert(doctype.into(), handler);
        self
    }

    /// Handler for reference types without a dedicated registration.
    pub fn with_fallback(mut self, handler: AuthorizedHandlerRef) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn with_hook(mut self, hook: TransitionHookBox) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Fires the authorization callbacks for a record that just transitioned.
    ///
    /// Returns `None` without side effects unless `status_changed_to` marks an
    /// authorization.
    pub async fn notify(
        &self,
        record: &PaymentRecord,
        from: PaymentStatus,
    ) -> Result<Option<Transition>> {
        if record.flags.status_changed_to != Some(PaymentStatus::Authorized) {
            return Ok(None);
        }

        let own = DocumentRef::new(PAYMENT_DOCTYPE, record.razorpay_payment_id.clone());
        self.dispatch(&own, record).await?;

        if let Some(reference) = &record.reference {
            self.dispatch(reference, record).await?;
        }

        let transition = Transition {
            payment_id: record.razorpay_payment_id.clone(),
            from,
            to: PaymentStatus::Authorized,
            reference: record.reference.clone(),
        };

        for hook in &self.hooks {
            hook.after_transition(&transition, record).await?;
        }

        *self.last_transition.write().await = Some(transition.clone());
        Ok(Some(transition))
    }

    pub async fn last_transition(&self) -> Option<Transition> {
        self.last_transition.read().await.clone()
    }

    async fn dispatch(&self, target: &DocumentRef, record: &PaymentRecord) -> Result<()> {
        let handler = self.handlers.get(&target.doctype).or_else(|| {
            // The payment record itself never goes to the fallback.
            (target.doctype != PAYMENT_DOCTYPE)
                .then_some(self.fallback.as_ref())
                .flatten()
        });

        match handler {
            Some(handler) => {
                handler.on_payment_authorized(target, record).await?;
                info!(
                    payment_id = %record.razorpay_payment_id,
                    target = %target,
                    "payment authorized notification delivered"
                );
            }
            None => warn!(
                payment_id = %record.razorpay_payment_id,
                doctype = %target.doctype,
                "no payment authorized handler registered, skipping"
            ),
        }
        Ok(())
    }
}
