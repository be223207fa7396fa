use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use thiserror::Error;
use tracing::info;

use crate::audit::{AuditEvent, AuditRecorder};
use crate::db::models::{NewRenewal, RenewalEvent};
use crate::db::store::{LeaseStore, StoreError};

/// Renewals may not be scheduled further out than this.
pub const MAX_RENEWAL_HORIZON_MONTHS: u32 = 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    #[error("renewal date must be in the future")]
    InvalidPast,
    #[error("renewal date is more than {MAX_RENEWAL_HORIZON_MONTHS} months ahead")]
    InvalidTooFar,
    #[error("renewal period must be at least one month, got {0}")]
    InvalidPeriod(u32),
    #[error("renewal date is outside the supported calendar range")]
    OutOfRange,
    #[error("renewal to {proposed} would move expiry earlier than {current}")]
    NotMonotonic {
        current: DateTime<Utc>,
        proposed: DateTime<Utc>,
    },
}

/// Adds calendar months, keeping day-of-month and time of day.
///
/// A day that does not exist in the target month rolls forward into the next
/// month (Nov 30 + 3 months is Mar 2 in a non-leap year, not Feb 28).
pub fn add_calendar_months(date: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    let naive = date.date_naive();
    let total = i64::from(naive.year()) * 12 + i64::from(naive.month0()) + i64::from(months);
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    let first_of_month = NaiveDate::from_ymd_opt(year, month, 1)?;
    let target = first_of_month.checked_add_days(Days::new(u64::from(naive.day() - 1)))?;
    Some(target.and_time(date.time()).and_utc())
}

/// Expiry after renewing `current_expiry` for `period_months`.
pub fn compute_default_renewal_date(
    current_expiry: DateTime<Utc>,
    period_months: u32,
) -> Result<DateTime<Utc>, RenewalError> {
    if period_months == 0 {
        return Err(RenewalError::InvalidPeriod(period_months));
    }
    add_calendar_months(current_expiry, period_months).ok_or(RenewalError::OutOfRange)
}

/// Checks a proposed renewal date against the policy window `(now, now + 2 years]`.
pub fn validate_renewal_date(proposed: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), RenewalError> {
    if proposed <= now {
        return Err(RenewalError::InvalidPast);
    }
    let horizon = add_calendar_months(now, MAX_RENEWAL_HORIZON_MONTHS).ok_or(RenewalError::OutOfRange)?;
    if proposed > horizon {
        return Err(RenewalError::InvalidTooFar);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalTarget {
    /// Extend the current expiry by a number of calendar months.
    Period(u32),
    /// Set an explicit new expiry.
    Date(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalRequest {
    pub lease_id: i32,
    pub target: RenewalTarget,
    pub actor: String,
}

#[derive(Error, Debug)]
pub enum RenewLeaseError {
    #[error(transparent)]
    Validation(#[from] RenewalError),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Applies a renewal to a lease and records it.
pub async fn renew_lease(
    store: &dyn LeaseStore,
    audit: &dyn AuditRecorder,
    request: RenewalRequest,
    now: DateTime<Utc>,
) -> Result<RenewalEvent, RenewLeaseError> {
    let lease = store.get_vm_lease(request.lease_id).await?;

    let (new_expiry, period_months) = match request.target {
        RenewalTarget::Period(months) => (
            compute_default_renewal_date(lease.expires_at, months)?,
            Some(i32::try_from(months).map_err(|_| RenewalError::InvalidPeriod(months))?),
        ),
        RenewalTarget::Date(date) => (date, None),
    };

    validate_renewal_date(new_expiry, now)?;
    if new_expiry < lease.expires_at {
        return Err(RenewalError::NotMonotonic {
            current: lease.expires_at,
            proposed: new_expiry,
        }
        .into());
    }

    let event = store
        .apply_renewal(NewRenewal {
            vm_lease_id: lease.id,
            expected_previous: lease.expires_at,
            new_expiry,
            period_months,
            actor: request.actor,
            applied_at: now,
        })
        .await?;

    info!(
        lease_id = event.vm_lease_id,
        actor = %event.actor,
        previous_expiry = %event.previous_expiry,
        new_expiry = %event.new_expiry,
        "Lease renewed."
    );
    audit
        .record(AuditEvent::RenewalApplied {
            lease_id: event.vm_lease_id,
            actor: event.actor.clone(),
            previous_expiry: event.previous_expiry,
            new_expiry: event.new_expiry,
            period_months: event.period_months,
        })
        .await;

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryLeaseStore, RecordingAuditRecorder, lease_expiring_at};
    use chrono::{Duration, TimeZone};

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_calendar_month_overflow_rolls_forward() {
        let renewed = compute_default_renewal_date(ts(2024, 11, 30), 3).unwrap();
        assert_eq!(renewed, ts(2025, 3, 2));
        assert_eq!(renewed.year(), 2025);
        assert_eq!(renewed.month0(), 2);
    }

    #[test]
    fn test_plain_month_addition() {
        assert_eq!(compute_default_renewal_date(ts(2025, 1, 15), 1).unwrap(), ts(2025, 2, 15));
        assert_eq!(compute_default_renewal_date(ts(2025, 10, 31), 12).unwrap(), ts(2026, 10, 31));
        // Leap day into a leap year keeps its day.
        assert_eq!(compute_default_renewal_date(ts(2024, 1, 29), 1).unwrap(), ts(2024, 2, 29));
        assert_eq!(compute_default_renewal_date(ts(2024, 1, 31), 1).unwrap(), ts(2024, 3, 2));
        assert_eq!(compute_default_renewal_date(ts(2024, 2, 29), 12).unwrap(), ts(2025, 3, 1));
    }

    #[test]
    fn test_renewal_date_is_always_after_expiry() {
        let mut expiry = ts(2023, 1, 1);
        while expiry < ts(2025, 1, 1) {
            for months in [1, 2, 3, 6, 11, 12, 24, 36] {
                let renewed = compute_default_renewal_date(expiry, months).unwrap();
                assert!(renewed > expiry, "{expiry} + {months} months gave {renewed}");
            }
            expiry += Duration::days(1);
        }
    }

    #[test]
    fn test_zero_period_is_rejected() {
        assert_eq!(
            compute_default_renewal_date(ts(2025, 1, 1), 0),
            Err(RenewalError::InvalidPeriod(0))
        );
    }

    #[test]
    fn test_validate_renewal_date() {
        let now = ts(2025, 5, 10);
        assert_eq!(validate_renewal_date(now - Duration::days(1), now), Err(RenewalError::InvalidPast));
        assert_eq!(validate_renewal_date(now, now), Err(RenewalError::InvalidPast));
        assert_eq!(
            validate_renewal_date(add_calendar_months(now, 36).unwrap(), now),
            Err(RenewalError::InvalidTooFar)
        );
        assert_eq!(validate_renewal_date(now + Duration::days(30), now), Ok(()));
        // The horizon itself is still allowed.
        assert_eq!(validate_renewal_date(ts(2027, 5, 10), now), Ok(()));
        assert_eq!(
            validate_renewal_date(ts(2027, 5, 10) + Duration::seconds(1), now),
            Err(RenewalError::InvalidTooFar)
        );
    }

    #[tokio::test]
    async fn test_renew_lease_by_period() {
        let store = InMemoryLeaseStore::new();
        let lease_id = store.insert_lease(lease_expiring_at(ts(2025, 6, 1))).await;
        let audit = RecordingAuditRecorder::default();

        let event = renew_lease(
            &store,
            &audit,
            RenewalRequest {
                lease_id,
                target: RenewalTarget::Period(3),
                actor: "alice".to_string(),
            },
            ts(2025, 5, 20),
        )
        .await
        .unwrap();

        assert_eq!(event.previous_expiry, ts(2025, 6, 1));
        assert_eq!(event.new_expiry, ts(2025, 9, 1));
        assert_eq!(event.period_months, Some(3));

        let reread = store.get_vm_lease(lease_id).await.unwrap();
        assert_eq!(reread.expires_at, event.new_expiry);
        assert_eq!(store.renewal_events().await.len(), 1);

        let events = audit.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "renewal_applied");
    }

    #[tokio::test]
    async fn test_renew_lease_rejects_earlier_date() {
        let store = InMemoryLeaseStore::new();
        let lease_id = store.insert_lease(lease_expiring_at(ts(2025, 9, 1))).await;
        let audit = RecordingAuditRecorder::default();

        let err = renew_lease(
            &store,
            &audit,
            RenewalRequest {
                lease_id,
                target: RenewalTarget::Date(ts(2025, 7, 1)),
                actor: "alice".to_string(),
            },
            ts(2025, 5, 20),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RenewLeaseError::Validation(RenewalError::NotMonotonic { .. })));
        assert_eq!(store.get_vm_lease(lease_id).await.unwrap().expires_at, ts(2025, 9, 1));
        assert!(store.renewal_events().await.is_empty());
        assert!(audit.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_renew_lease_validates_policy_window() {
        let store = InMemoryLeaseStore::new();
        let lease_id = store.insert_lease(lease_expiring_at(ts(2025, 6, 1))).await;
        let audit = RecordingAuditRecorder::default();
        let request = |target| RenewalRequest {
            lease_id,
            target,
            actor: "alice".to_string(),
        };

        let too_far = renew_lease(&store, &audit, request(RenewalTarget::Date(ts(2030, 1, 1))), ts(2025, 5, 20)).await;
        assert!(matches!(too_far, Err(RenewLeaseError::Validation(RenewalError::InvalidTooFar))));

        // A lapsed lease renewed by a short period still lands in the past.
        let lapsed = renew_lease(&store, &audit, request(RenewalTarget::Period(1)), ts(2025, 8, 1)).await;
        assert!(matches!(lapsed, Err(RenewLeaseError::Validation(RenewalError::InvalidPast))));

        let missing = renew_lease(
            &store,
            &audit,
            RenewalRequest {
                lease_id: 404,
                target: RenewalTarget::Period(1),
                actor: "alice".to_string(),
            },
            ts(2025, 5, 20),
        )
        .await;
        assert!(matches!(missing, Err(RenewLeaseError::Storage(StoreError::LeaseNotFound(404)))));
    }
}
