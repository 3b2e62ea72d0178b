//! Approval policy store and the reconciliation that keeps in-flight payment
//! snapshots consistent with it.

use std::collections::{HashMap, HashSet};

use crate::error::PayError;
use crate::models::{ApproverRule, ApproverSettings, User, UserId};
use crate::services::snapshot;
use crate::services::store::{self, Store};

#[derive(Clone)]
pub struct PolicyService {
    store: Store,
}

/// Outcome of a policy replace.
#[derive(Debug)]
pub struct PolicyUpdate {
    pub rows: Vec<ApproverSettings>,
    pub reconciled_payments: usize,
}

impl PolicyService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Replaces every rule of `recipient_id` and rewrites the approver
    /// snapshot of each of their sent payments, all in one transaction.
    pub async fn set_policy(
        &self,
        recipient_id: UserId,
        rules: &[ApproverRule],
    ) -> Result<PolicyUpdate, PayError> {
        validate_rules(recipient_id, rules)?;

        let mut tx = self.store.begin().await?;

        let referenced = referenced_users(recipient_id, rules);
        let users = store::fetch_users(&mut *tx, &referenced).await?;
        if !users.contains_key(&recipient_id) {
            return Err(PayError::NotFound(format!("user {}", recipient_id)));
        }
        let mut rows = build_rows(recipient_id, rules, &users)?;

        let mut reconciled = 0;
        for mut payment in store::fetch_in_flight_for_receiver(&mut *tx, recipient_id).await? {
            let approvers = snapshot::reconcile(payment.sender_id, &payment.approvers, &rows);
            if approvers == payment.approvers {
                continue;
            }
            tracing::debug!(
                payment_id = payment.id,
                before = payment.approvers.len(),
                after = approvers.len(),
                "Reconciling approver snapshot"
            );
            payment.approvers = approvers;
            payment.touch();
            store::update_payment(&mut *tx, &payment).await?;
            reconciled += 1;
        }

        let removed = store::delete_recipient_policy(&mut *tx, recipient_id).await?;
        for row in rows.iter_mut() {
            row.id = store::insert_policy_row(&mut *tx, row).await?;
        }

        tx.commit().await?;

        tracing::info!(
            recipient_id,
            removed,
            inserted = rows.len(),
            reconciled,
            "Approver policy replaced"
        );

        Ok(PolicyUpdate {
            rows,
            reconciled_payments: reconciled,
        })
    }

    /// Approver ids required for payments from `send_user_id` to `recipient_id`.
    pub async fn policy_for(
        &self,
        recipient_id: UserId,
        send_user_id: UserId,
    ) -> Result<Vec<UserId>, PayError> {
        let mut conn = self.store.pool().acquire().await?;
        let rows = store::fetch_policy_rows(&mut conn, recipient_id, send_user_id).await?;
        Ok(rows.into_iter().map(|row| row.approver_id).collect())
    }

    /// (recipient, sender) pairs `approver_id` signs off for.
    pub async fn policies_where_approver(
        &self,
        approver_id: UserId,
    ) -> Result<Vec<(UserId, UserId)>, PayError> {
        let mut conn = self.store.pool().acquire().await?;
        store::fetch_policies_where_approver(&mut conn, approver_id).await
    }

    pub async fn recipient_policy(
        &self,
        recipient_id: UserId,
    ) -> Result<Vec<ApproverSettings>, PayError> {
        let mut conn = self.store.pool().acquire().await?;
        store::fetch_recipient_policy(&mut conn, recipient_id).await
    }
}

fn validate_rules(recipient_id: UserId, rules: &[ApproverRule]) -> Result<(), PayError> {
    let mut senders = HashSet::new();
    for rule in rules {
        if rule.send_user_id == recipient_id {
            return Err(PayError::validation(
                "a rule cannot cover payments sent by the recipient",
            ));
        }
        if !senders.insert(rule.send_user_id) {
            return Err(PayError::Validation(format!(
                "duplicate rule for sender {}",
                rule.send_user_id
            )));
        }
        if rule.approver_ids.contains(&recipient_id) {
            return Err(PayError::validation(
                "the recipient cannot approve their own incoming payments",
            ));
        }
    }
    Ok(())
}

fn referenced_users(recipient_id: UserId, rules: &[ApproverRule]) -> Vec<UserId> {
    let mut ids = vec![recipient_id];
    for rule in rules {
        ids.push(rule.send_user_id);
        ids.extend(rule.approver_ids.iter().copied());
    }
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Expands rules into rows, in rule order, one per distinct approver.
fn build_rows(
    recipient_id: UserId,
    rules: &[ApproverRule],
    users: &HashMap<UserId, User>,
) -> Result<Vec<ApproverSettings>, PayError> {
    let lookup = |id: UserId| {
        users
            .get(&id)
            .ok_or_else(|| PayError::Validation(format!("unknown user {}", id)))
    };

    let mut rows = Vec::new();
    for rule in rules {
        let sender = lookup(rule.send_user_id)?;
        let mut seen = HashSet::new();
        for &approver_id in &rule.approver_ids {
            if !seen.insert(approver_id) {
                continue;
            }
            let approver = lookup(approver_id)?;
            rows.push(ApproverSettings {
                id: 0,
                recipient_id,
                send_user_id: sender.id,
                send_user_name: sender.name.clone(),
                approver_id,
                approver_name: approver.display_name.clone(),
                show_cost: rule.show_cost,
            });
        }
    }
    Ok(rows)
}
