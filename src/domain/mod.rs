//! Domain layer: payment records, the gateway vocabulary and the ports the
//! reconciliation engine depends on.

pub mod gateway;
pub mod payment;
pub mod ports;
