use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::enums::{ExpiryClass, RecipientClass};
use crate::db::models::VmLease;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Values available to the message templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseNoticeContext {
    pub lease_id: i32,
    pub lease_name: String,
    pub project_name: String,
    pub hostname: String,
    pub ip_address: String,
    pub account_id: String,
    pub expires_at: String,
    pub days_until_expiry: i64,
    pub days_overdue: i64,
    pub suggested_renewal_date: String,
    pub recipient_class: RecipientClass,
    pub expiry_class: ExpiryClass,
    pub app_url: String,
}

impl LeaseNoticeContext {
    pub fn new(
        lease: &VmLease,
        expiry_class: ExpiryClass,
        recipient_class: RecipientClass,
        days_until_expiry: i64,
        suggested_renewal_date: Option<DateTime<Utc>>,
        app_url: &str,
    ) -> Self {
        let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        Self {
            lease_id: lease.id,
            lease_name: lease.name.clone(),
            project_name: lease.project_name.clone(),
            hostname: or_dash(&lease.hostname),
            ip_address: or_dash(&lease.ip_address),
            account_id: or_dash(&lease.account_id),
            expires_at: lease.expires_at.format(DATE_FORMAT).to_string(),
            days_until_expiry,
            days_overdue: (-days_until_expiry).max(0),
            suggested_renewal_date: suggested_renewal_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            recipient_class,
            expiry_class,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub subject: String,
    pub text_body: String,
}
