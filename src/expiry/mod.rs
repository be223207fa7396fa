//! The expiry engine: classify leases, notify owners and administrators,
//! retry failed sends, and compute renewals.

pub mod dispatcher;
pub mod renewal;
pub mod retry;
pub mod scanner;
pub mod service;

pub use dispatcher::{DispatchSettings, NotificationDispatcher};
pub use renewal::{RenewLeaseError, RenewalError, RenewalRequest, RenewalTarget};
pub use retry::{RetryCoordinator, RetryOutcome};
pub use scanner::{NotificationThresholds, ScanResult};
pub use service::{ExpiryCheckError, ExpiryCheckService, ExpiryCheckSettings, ExpiryCheckSummary};
