use crate::domain::payment::{DocumentRef, PaymentRecord};
use crate::domain::ports::PaymentAuthorizedHandler;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Handler for hosts that only need an audit trail of authorizations.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAuthorizedHandler;

#[async_trait]
impl PaymentAuthorizedHandler for LoggingAuthorizedHandler {
    async fn on_payment_authorized(
        &self,
        target: &DocumentRef,
        payment: &PaymentRecord,
    ) -> Result<()> {
        info!(
            doctype = %target.doctype,
            docname = %target.docname,
            payment_id = %payment.razorpay_payment_id,
            amount = ?payment.data.amount,
            "on_payment_authorized"
        );
        Ok(())
    }
}
