//! Reconciliation of orders left unresolved by their synchronous flow.
//!
//! - [`ReconciliationJob`] sweeps expired `PENDING`/`PROCESSING` orders and
//!   every expired `VERIFYING` order, asks the bank for ground truth where
//!   needed, and settles the ledger record and the order
//! - [`ReconciliationScheduler`] runs the sweep on an interval until shutdown
//!
//! The sweep is safe to run concurrently with itself and with live flows:
//! every write goes through the order store's monotonic conditional replace.

pub mod config;
pub mod error;
pub mod job;
pub mod scheduler;

pub use config::ReconciliationConfig;
pub use error::{ReconciliationError, Result};
pub use job::{ReconciliationJob, Resolution, SweepReport};
pub use scheduler::{MIN_INTERVAL, ReconciliationScheduler};
