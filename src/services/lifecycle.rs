//! Canonical payment state machine.
//!
//! Only the stored status is handled here; what each viewer sees is the job of
//! [`crate::services::projection`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PayError;
use crate::models::{Payment, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Update,
    Send,
    Confirm,
    Approve,
    Process,
    Reject,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Update => "update",
            Action::Send => "send",
            Action::Confirm => "confirm",
            Action::Approve => "approve",
            Action::Process => "process",
            Action::Reject => "reject",
        };
        f.write_str(name)
    }
}

/// Status a payment moves to when `action` is applied in `status`.
///
/// `WaitApproval` and `Approved` are accepted as stored values for rows written
/// by older clients; this crate never persists them itself.
pub fn next_status(
    payment_id: i64,
    status: PaymentStatus,
    action: Action,
) -> Result<PaymentStatus, PayError> {
    use PaymentStatus::*;

    if status == Paid {
        return Err(PayError::AlreadyPaid(payment_id));
    }

    let next = match (action, status) {
        (Action::Update, Created | Sent) => status,
        (Action::Send, Created) => Sent,
        (Action::Confirm, Sent | WaitApproval | Approved) => Confirmed,
        (Action::Approve, Sent | WaitApproval | Approved | Confirmed) => status,
        (Action::Process, Confirmed | Approved) => Paid,
        (Action::Reject, Sent | WaitApproval | Approved | Confirmed) => Rejected,
        _ => return Err(PayError::InvalidTransition { action, status }),
    };

    Ok(next)
}

/// Validates `action` against the payment and returns the target status
/// without mutating anything.
pub fn check(payment: &Payment, action: Action) -> Result<PaymentStatus, PayError> {
    next_status(payment.id, payment.status, action)
}
