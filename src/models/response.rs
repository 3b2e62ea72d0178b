use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Approver, ContactMethod, PaymentDetail, PaymentId, PaymentStatus, UserId};

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub database: bool,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// A payment as one particular viewer sees it.
///
/// `status` is the projected status, never the stored one. Economic fields are
/// `None` when the viewer is an approver whose policy hides the cost.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaymentView {
    pub id: PaymentId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_display_name: String,
    pub receiver_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_email: Option<String>,
    pub contact_method: ContactMethod,

    pub amount: Option<Decimal>,
    pub hourly_rate: Option<Decimal>,
    pub details: Vec<PaymentDetail>,
    pub payment_method: Option<String>,
    pub payment_address: Option<String>,
    pub convert_rate: Option<Decimal>,
    pub convert_time: Option<DateTime<Utc>>,
    pub expected_amount: Option<Decimal>,

    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_fully_approved: Option<bool>,
    pub rejection_reason: Option<String>,
    pub approvers: Vec<Approver>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub tx_id: Option<String>,
}
