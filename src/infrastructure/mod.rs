//! Adapters for the domain ports: record stores, the gateway HTTP client and
//! logging-backed collaborators.

pub mod handlers;
pub mod in_memory;
pub mod incident_log;
pub mod razorpay;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
