//! Application layer containing the reconciliation state machine.
//!
//! `Reconciler` applies gateway-confirmed status transitions to payment records,
//! `LifecycleNotifier` tells linked records about authorizations, and
//! `SweepScheduler` drives the batch sweeps on a fixed cadence.

pub mod notifier;
pub mod reconciler;
pub mod scheduler;
