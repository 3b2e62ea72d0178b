//! Approver snapshots embedded in payments.
//!
//! A snapshot is taken when a payment is sent and is only rewritten by
//! [`reconcile`] when the receiver replaces their policy, or by [`approve`].

use std::collections::HashMap;

use crate::models::{Approver, ApproverSettings, Payment, UserId};

/// Snapshot for a payment being sent, one unapproved entry per policy row.
pub fn capture(policy: &[ApproverSettings]) -> Vec<Approver> {
    let mut approvers: Vec<Approver> = Vec::with_capacity(policy.len());
    for row in policy {
        if approvers.iter().any(|a| a.approver_id == row.approver_id) {
            continue;
        }
        approvers.push(Approver {
            approver_id: row.approver_id,
            approver_name: row.approver_name.clone(),
            is_approved: false,
        });
    }
    approvers
}

/// Rebuilds the snapshot of an in-flight payment from `sender_id` against the
/// receiver's new policy rows.
///
/// Entries keep their approval only if the same approver was already present
/// and approved; dropped approvers disappear and new ones start unapproved.
pub fn reconcile(sender_id: UserId, old: &[Approver], policy: &[ApproverSettings]) -> Vec<Approver> {
    let previous: HashMap<UserId, bool> = old
        .iter()
        .map(|a| (a.approver_id, a.is_approved))
        .collect();

    let mut approvers: Vec<Approver> = Vec::new();
    for row in policy.iter().filter(|row| row.send_user_id == sender_id) {
        if approvers.iter().any(|a| a.approver_id == row.approver_id) {
            continue;
        }
        approvers.push(Approver {
            approver_id: row.approver_id,
            approver_name: row.approver_name.clone(),
            is_approved: previous.get(&row.approver_id).copied().unwrap_or(false),
        });
    }
    approvers
}

/// Marks every entry for `approver_id` as approved. Returns how many matched.
pub fn approve(approvers: &mut [Approver], approver_id: UserId) -> usize {
    let mut matched = 0;
    for entry in approvers.iter_mut().filter(|a| a.approver_id == approver_id) {
        entry.is_approved = true;
        matched += 1;
    }
    matched
}

/// Clears every approval, used when the sender edits a payment in flight.
pub fn reset(approvers: &mut [Approver]) {
    for entry in approvers.iter_mut() {
        entry.is_approved = false;
    }
}

/// Approval gate, measured against the size of the *live* policy rather than
/// the snapshot. Shrinking a policy can therefore release a payment that was
/// waiting on an approver who was removed.
pub fn is_fully_approved(payment: &Payment, live_policy_size: usize) -> bool {
    live_policy_size <= payment.approved_count()
}
