use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "lease_status_enum")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseStatus {
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    /// Retained for audit history, never scanned.
    #[sea_orm(string_value = "DECOMMISSIONED")]
    Decommissioned,
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "recipient_class_enum")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientClass {
    #[sea_orm(string_value = "USER")]
    User,
    #[sea_orm(string_value = "ADMIN")]
    Admin,
}

impl fmt::Display for RecipientClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientClass::User => write!(f, "USER"),
            RecipientClass::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Lifecycle of a notification record.
///
/// `PENDING` is the claim written before the send; it becomes `SENT` or
/// `FAILED` once the mail provider answers. `FAILED` records are revisited by
/// the retry pass until they succeed or reach the attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "notification_outcome_enum")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationOutcome {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "SENT")]
    Sent,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationOutcome::Pending => write!(f, "PENDING"),
            NotificationOutcome::Sent => write!(f, "SENT"),
            NotificationOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// Scan classification of a lease, persisted on notification records so a
/// retry renders the same message as the original attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "expiry_class_enum")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpiryClass {
    #[sea_orm(string_value = "NOT_DUE")]
    NotDue,
    #[sea_orm(string_value = "USER_DUE")]
    UserDue,
    #[sea_orm(string_value = "ADMIN_DUE")]
    AdminDue,
    #[sea_orm(string_value = "EXPIRED")]
    Expired,
}

impl ExpiryClass {
    /// Recipient classes notified for this classification.
    pub fn recipient_classes(self) -> &'static [RecipientClass] {
        match self {
            ExpiryClass::NotDue => &[],
            ExpiryClass::UserDue => &[RecipientClass::User],
            ExpiryClass::AdminDue | ExpiryClass::Expired => {
                &[RecipientClass::User, RecipientClass::Admin]
            }
        }
    }

    pub fn is_due(self) -> bool {
        !matches!(self, ExpiryClass::NotDue)
    }
}

impl fmt::Display for ExpiryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExpiryClass::NotDue => "NOT_DUE",
            ExpiryClass::UserDue => "USER_DUE",
            ExpiryClass::AdminDue => "ADMIN_DUE",
            ExpiryClass::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}
