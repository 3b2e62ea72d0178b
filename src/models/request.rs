//! One request type per operation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ApproverRule, ContactMethod, PaymentDetail, PaymentStatus, UserId};

/// Who a payment is requested from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "contact_method", rename_all = "snake_case")]
pub enum PaymentTarget {
    Internal { receiver_id: UserId },
    Email { email: String },
}

impl PaymentTarget {
    pub fn contact_method(&self) -> ContactMethod {
        match self {
            PaymentTarget::Internal { .. } => ContactMethod::Internal,
            PaymentTarget::Email { .. } => ContactMethod::Email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Economics {
    pub amount: Decimal,
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
    #[serde(default)]
    pub details: Vec<PaymentDetail>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_address: Option<String>,
}

impl Economics {
    pub fn fixed(amount: Decimal) -> Self {
        Self {
            amount,
            hourly_rate: None,
            details: Vec::new(),
            payment_method: None,
            payment_address: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub target: PaymentTarget,
    #[serde(flatten)]
    pub economics: Economics,
    #[serde(default)]
    pub send_now: bool,
}

/// Sender-side edit. `target` may only change while the payment is a draft.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePaymentRequest {
    #[serde(default)]
    pub target: Option<PaymentTarget>,
    #[serde(flatten)]
    pub economics: Economics,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmPaymentRequest {
    /// Currency code the receiver intends to pay with.
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessPaymentRequest {
    pub tx_id: String,
    pub payment_method: String,
    pub payment_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectPaymentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetApproverPolicyRequest {
    pub rules: Vec<ApproverRule>,
}

/// Which side of the payment the listing is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListRole {
    Sender,
    Receiver,
    Approver,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPaymentsQuery {
    #[serde(default)]
    pub role: Option<ListRole>,
    /// Comma separated canonical statuses.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl ListPaymentsQuery {
    pub fn status_filters(&self) -> Result<Vec<PaymentStatus>, String> {
        match &self.status {
            None => Ok(Vec::new()),
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect(),
        }
    }
}
