//! Viewer-specific status projection.
//!
//! Everything here is a pure function of the stored payment, who is looking
//! and the live approval policy. Nothing is written back.

use crate::error::PayError;
use crate::models::{ApproverSettings, Payment, PaymentStatus, PaymentView, UserId};
use crate::services::snapshot;

/// How the caller relates to a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Sender,
    Receiver,
    /// Holder of an access token, standing in for an email-contact receiver.
    ExternalContact,
    /// Anyone else with access, normally an approver.
    ThirdParty(UserId),
}

impl Perspective {
    pub fn resolve(payment: &Payment, viewer: Option<UserId>) -> Result<Self, PayError> {
        match viewer {
            Some(id) if id == payment.sender_id => Ok(Perspective::Sender),
            Some(id) if !payment.is_external() && id == payment.receiver_id => {
                Ok(Perspective::Receiver)
            }
            Some(id) => Ok(Perspective::ThirdParty(id)),
            None if payment.is_external() => Ok(Perspective::ExternalContact),
            None => Err(PayError::forbidden(
                "an anonymous caller cannot view an internal payment",
            )),
        }
    }

    fn is_receiving_side(self) -> bool {
        matches!(self, Perspective::Receiver | Perspective::ExternalContact)
    }
}

/// Status shown to `perspective`.
pub fn project_status(payment: &Payment, perspective: Perspective) -> PaymentStatus {
    use PaymentStatus::*;

    match perspective {
        Perspective::ThirdParty(viewer) => {
            if payment.has_approved(viewer) {
                Approved
            } else {
                WaitApproval
            }
        }
        Perspective::Sender => match payment.status {
            Confirmed | Approved => Sent,
            other => other,
        },
        Perspective::Receiver | Perspective::ExternalContact => {
            let settled = matches!(payment.status, Confirmed | Rejected | Approved | Paid);
            if !settled && payment.requires_approval() {
                WaitApproval
            } else {
                payment.status
            }
        }
    }
}

/// Full view of `payment` for `perspective`. `live_policy` holds the current
/// policy rows for the payment's (receiver, sender) pair.
pub fn project(
    payment: &Payment,
    perspective: Perspective,
    live_policy: &[ApproverSettings],
) -> PaymentView {
    let is_fully_approved = perspective
        .is_receiving_side()
        .then(|| snapshot::is_fully_approved(payment, live_policy.len()));

    let mut view = PaymentView {
        id: payment.id,
        sender_id: payment.sender_id,
        sender_name: payment.sender_name.clone(),
        sender_display_name: payment.sender_display_name.clone(),
        receiver_id: payment.receiver_id,
        external_email: payment.external_email.clone(),
        contact_method: payment.contact_method,
        amount: Some(payment.amount),
        hourly_rate: payment.hourly_rate,
        details: payment.details.clone(),
        payment_method: payment.payment_method.clone(),
        payment_address: payment.payment_address.clone(),
        convert_rate: payment.convert_rate,
        convert_time: payment.convert_time,
        expected_amount: payment.expected_amount,
        status: project_status(payment, perspective),
        is_fully_approved,
        rejection_reason: payment.rejection_reason.clone(),
        approvers: payment.approvers.clone(),
        created_at: payment.created_at,
        updated_at: payment.updated_at,
        sent_at: payment.sent_at,
        paid_at: payment.paid_at,
        tx_id: payment.tx_id.clone(),
    };

    if let Perspective::ThirdParty(viewer) = perspective {
        let shows_cost = live_policy
            .iter()
            .any(|row| row.approver_id == viewer && row.show_cost);
        if !shows_cost {
            redact_costs(&mut view);
        }
    }

    view
}

fn redact_costs(view: &mut PaymentView) {
    view.amount = None;
    view.hourly_rate = None;
    view.expected_amount = None;
    view.convert_rate = None;
    for detail in view.details.iter_mut() {
        detail.price = None;
        detail.cost = Default::default();
    }
}
