//! Domain services for the LaborLedger service
//!
//! Accounts and password recovery, supervisor onboarding, the worker roster,
//! same-day attendance and payroll. Each service owns its queries and
//! borrows the shared [`Storage`](crate::core::storage::Storage).

pub mod accounts;
pub mod attendance;
pub mod models;
pub mod payroll;
pub mod rate_limit;
pub mod recovery;
pub mod supervisors;
pub mod workers;

// Re-export services for convenience
pub use accounts::AccountService;
pub use attendance::{AttendanceBook, AttendanceEvent};
pub use payroll::{PayPolicy, PayrollEngine};
pub use recovery::{LogMailer, Mailer, PasswordRecovery};
pub use supervisors::SupervisorAdmin;
pub use workers::WorkerRoster;
