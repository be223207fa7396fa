use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::enums::ExpiryClass;
use crate::db::models::VmLease;
use crate::db::store::{LeaseStore, StoreError};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Day counts before expiry at which reminders become due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationThresholds {
    pub user_days: i64,
    pub admin_days: i64,
}

impl NotificationThresholds {
    pub fn new(user_days: i64, admin_days: i64) -> Self {
        Self { user_days, admin_days }
    }

    pub fn classify(&self, days_until_expiry: i64) -> ExpiryClass {
        if days_until_expiry < 0 {
            ExpiryClass::Expired
        } else if days_until_expiry <= self.admin_days {
            ExpiryClass::AdminDue
        } else if days_until_expiry <= self.user_days {
            ExpiryClass::UserDue
        } else {
            ExpiryClass::NotDue
        }
    }

    /// Instant at which a lease expiring at `expires_at` crossed into `class`.
    ///
    /// This is the dedupe window key: it is stable across scans and moves
    /// when a renewal moves the expiry. Saturates at the earliest
    /// representable instant.
    pub fn window_start(&self, class: ExpiryClass, expires_at: DateTime<Utc>) -> DateTime<Utc> {
        match class {
            ExpiryClass::UserDue => days_before(expires_at, self.user_days),
            ExpiryClass::AdminDue => days_before(expires_at, self.admin_days),
            ExpiryClass::Expired | ExpiryClass::NotDue => expires_at,
        }
    }
}

fn days_before(instant: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    TimeDelta::try_days(days)
        .and_then(|delta| instant.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Whole days until expiry, rounded up. Negative once the lease is more than
/// a full day past its expiry.
pub fn days_until_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (expires_at - now).num_milliseconds();
    let days = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        days
    } else {
        days + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub lease: VmLease,
    pub class: ExpiryClass,
    pub days_until_expiry: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCounts {
    pub not_due: usize,
    pub user_due: usize,
    pub admin_due: usize,
    pub expired: usize,
}

impl ClassCounts {
    fn add(&mut self, class: ExpiryClass) {
        match class {
            ExpiryClass::NotDue => self.not_due += 1,
            ExpiryClass::UserDue => self.user_due += 1,
            ExpiryClass::AdminDue => self.admin_due += 1,
            ExpiryClass::Expired => self.expired += 1,
        }
    }

    pub fn due(&self) -> usize {
        self.user_due + self.admin_due + self.expired
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub scanned_at: DateTime<Utc>,
    pub total: usize,
    pub counts: ClassCounts,
    /// Due and expired leases, in store order.
    pub worklist: Vec<WorkItem>,
}

/// Classifies every active lease. Read-only.
pub async fn scan(
    store: &dyn LeaseStore,
    now: DateTime<Utc>,
    thresholds: NotificationThresholds,
) -> Result<ScanResult, StoreError> {
    let leases = store.list_active_vm_leases().await?;
    let total = leases.len();
    let mut counts = ClassCounts::default();
    let mut worklist = Vec::new();

    for lease in leases {
        let days = days_until_expiry(lease.expires_at, now);
        let class = thresholds.classify(days);
        counts.add(class);
        if class.is_due() {
            debug!(lease_id = lease.id, days_until_expiry = days, class = %class, "Lease is due for notification.");
            worklist.push(WorkItem {
                lease,
                class,
                days_until_expiry: days,
            });
        }
    }

    Ok(ScanResult {
        scanned_at: now,
        total,
        counts,
        worklist,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryLeaseStore, lease_expiring_at};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_days_until_expiry_rounds_up() {
        let now = now();
        assert_eq!(days_until_expiry(now + Duration::days(7), now), 7);
        assert_eq!(days_until_expiry(now + Duration::days(6) + Duration::hours(1), now), 7);
        assert_eq!(days_until_expiry(now + Duration::seconds(1), now), 1);
        assert_eq!(days_until_expiry(now, now), 0);
        assert_eq!(days_until_expiry(now - Duration::hours(12), now), 0);
        assert_eq!(days_until_expiry(now - Duration::days(1), now), -1);
        assert_eq!(days_until_expiry(now - Duration::days(1) - Duration::hours(1), now), -1);
        assert_eq!(days_until_expiry(now - Duration::days(2), now), -2);
    }

    #[test]
    fn test_classification_boundaries() {
        let t = NotificationThresholds::new(30, 7);
        assert_eq!(t.classify(-1), ExpiryClass::Expired);
        assert_eq!(t.classify(0), ExpiryClass::AdminDue);
        assert_eq!(t.classify(7), ExpiryClass::AdminDue);
        assert_eq!(t.classify(8), ExpiryClass::UserDue);
        assert_eq!(t.classify(30), ExpiryClass::UserDue);
        assert_eq!(t.classify(31), ExpiryClass::NotDue);
    }

    #[test]
    fn test_window_start_per_class() {
        let t = NotificationThresholds::new(30, 7);
        let expiry = now();
        assert_eq!(t.window_start(ExpiryClass::UserDue, expiry), expiry - Duration::days(30));
        assert_eq!(t.window_start(ExpiryClass::AdminDue, expiry), expiry - Duration::days(7));
        assert_eq!(t.window_start(ExpiryClass::Expired, expiry), expiry);
    }

    #[test]
    fn test_window_start_saturates_for_oversized_thresholds() {
        let t = NotificationThresholds::new(200_000_000_000_000, 1_000_000_000);
        let expiry = now();
        assert_eq!(t.window_start(ExpiryClass::UserDue, expiry), DateTime::<Utc>::MIN_UTC);
        assert_eq!(t.window_start(ExpiryClass::AdminDue, expiry), DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_scan_classifies_and_builds_worklist() {
        let store = InMemoryLeaseStore::new();
        let now = now();
        let admin_due = store.insert_lease(lease_expiring_at(now + Duration::days(7))).await;
        let user_due = store.insert_lease(lease_expiring_at(now + Duration::days(20))).await;
        store.insert_lease(lease_expiring_at(now + Duration::days(90))).await;
        let expired = store.insert_lease(lease_expiring_at(now - Duration::days(3))).await;

        let result = scan(&store, now, NotificationThresholds::new(30, 7)).await.unwrap();

        assert_eq!(result.total, 4);
        assert_eq!(
            result.counts,
            ClassCounts {
                not_due: 1,
                user_due: 1,
                admin_due: 1,
                expired: 1
            }
        );
        let classes: Vec<(i32, ExpiryClass)> = result.worklist.iter().map(|w| (w.lease.id, w.class)).collect();
        assert_eq!(
            classes,
            vec![
                (admin_due, ExpiryClass::AdminDue),
                (user_due, ExpiryClass::UserDue),
                (expired, ExpiryClass::Expired)
            ]
        );
        assert_eq!(result.worklist[0].days_until_expiry, 7);
    }

    #[tokio::test]
    async fn test_scan_surfaces_storage_errors() {
        let store = InMemoryLeaseStore::new();
        store.set_unavailable(true).await;
        let err = scan(&store, now(), NotificationThresholds::new(30, 7)).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
