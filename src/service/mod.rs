//! Service layer: session lifecycle orchestration.
//!
//! [`SessionSupervisor`] owns the active protocol clients,
//! [`StartupReconciler`] brings stored devices online at boot, and
//! [`ShutdownCoordinator`] disconnects everything on termination.

pub mod session_supervisor;
pub mod shutdown;
pub mod startup;

#[cfg(test)]
pub(crate) mod testing;

pub use session_supervisor::{ActiveClient, DisconnectOutcome, SessionSupervisor};
pub use shutdown::{ShutdownCoordinator, ShutdownReport, ShutdownSignal};
pub use startup::{StartupReconciler, StartupReport};
