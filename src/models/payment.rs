use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type PaymentId = i64;

/// `receiver_id` of a payment addressed to an email contact.
pub const EXTERNAL_RECEIVER: UserId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Sent,
    Confirmed,
    WaitApproval,
    Approved,
    Paid,
    Rejected,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 7] = [
        PaymentStatus::Created,
        PaymentStatus::Sent,
        PaymentStatus::Confirmed,
        PaymentStatus::WaitApproval,
        PaymentStatus::Approved,
        PaymentStatus::Paid,
        PaymentStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Sent => "sent",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::WaitApproval => "wait_approval",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Rejected)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown payment status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMethod {
    Internal,
    Email,
}

impl ContactMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactMethod::Internal => "internal",
            ContactMethod::Email => "email",
        }
    }
}

impl FromStr for ContactMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(ContactMethod::Internal),
            "email" => Ok(ContactMethod::Email),
            other => Err(format!("unknown contact method: {}", other)),
        }
    }
}

/// One invoice line. `quantity` is a unit count or hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetail {
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    pub cost: Decimal,
    #[serde(default)]
    pub description: String,
}

/// Snapshot of one required approver, owned by the payment it is embedded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub approver_id: UserId,
    pub approver_name: String,
    pub is_approved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,

    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_display_name: String,
    pub receiver_id: UserId,
    pub external_email: Option<String>,
    pub contact_method: ContactMethod,

    pub amount: Decimal,
    pub hourly_rate: Option<Decimal>,
    pub details: Vec<PaymentDetail>,
    pub payment_method: Option<String>,
    pub payment_address: Option<String>,
    pub convert_rate: Option<Decimal>,
    pub convert_time: Option<DateTime<Utc>>,
    pub expected_amount: Option<Decimal>,

    pub status: PaymentStatus,
    pub rejection_reason: Option<String>,
    pub approvers: Vec<Approver>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub tx_id: Option<String>,
}

impl Payment {
    pub fn is_external(&self) -> bool {
        self.contact_method == ContactMethod::Email
    }

    pub fn requires_approval(&self) -> bool {
        !self.approvers.is_empty()
    }

    pub fn approved_count(&self) -> usize {
        self.approvers.iter().filter(|a| a.is_approved).count()
    }

    pub fn approver(&self, user_id: UserId) -> Option<&Approver> {
        self.approvers.iter().find(|a| a.approver_id == user_id)
    }

    pub fn has_approved(&self, user_id: UserId) -> bool {
        self.approvers
            .iter()
            .any(|a| a.approver_id == user_id && a.is_approved)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
