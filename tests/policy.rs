mod common;

use common::*;
use payreq::error::PayError;
use payreq::models::{ApproverRule, PaymentStatus, RejectPaymentRequest};
use payreq::services::Caller;

fn rule(sender: i64, approvers: &[i64]) -> ApproverRule {
    ApproverRule {
        send_user_id: sender,
        approver_ids: approvers.to_vec(),
        show_cost: false,
    }
}

#[tokio::test]
async fn unknown_approver_leaves_everything_untouched() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;
    let x = h.user("xavier").await;
    h.policy(&r, &s, &[&x]).await;

    let payment = h.payments.create(s.id, to_user(&r, "100", true)).await.unwrap();

    let err = h
        .policies
        .set_policy(r.id, &[rule(s.id, &[x.id, 999])])
        .await
        .unwrap_err();
    assert!(matches!(err, PayError::Validation(_)));

    assert_eq!(h.policies.policy_for(r.id, s.id).await.unwrap(), vec![x.id]);
    let view = h.payments.get(payment.id, &Caller::user(s.id)).await.unwrap();
    assert_eq!(view.approvers.len(), 1);
}

#[tokio::test]
async fn replace_is_total_and_reports_pairs() {
    let h = Harness::new().await;
    let r = h.user("rita").await;
    let s1 = h.user("sam").await;
    let s2 = h.user("sue").await;
    let x = h.user("xavier").await;

    h.policies
        .set_policy(r.id, &[rule(s1.id, &[x.id]), rule(s2.id, &[x.id])])
        .await
        .unwrap();
    let mut pairs = h.policies.policies_where_approver(x.id).await.unwrap();
    pairs.sort();
    assert_eq!(pairs, vec![(r.id, s1.id), (r.id, s2.id)]);

    h.policies.set_policy(r.id, &[rule(s2.id, &[x.id])]).await.unwrap();
    assert!(h.policies.policy_for(r.id, s1.id).await.unwrap().is_empty());
    assert_eq!(h.policies.recipient_policy(r.id).await.unwrap().len(), 1);

    h.policies.set_policy(r.id, &[]).await.unwrap();
    assert!(h.policies.recipient_policy(r.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn reconciliation_only_touches_sent_payments_of_that_sender() {
    let h = Harness::new().await;
    let s1 = h.user("sam").await;
    let s2 = h.user("sue").await;
    let r = h.user("rita").await;
    let x = h.user("xavier").await;
    let y = h.user("yuki").await;

    h.policies
        .set_policy(r.id, &[rule(s1.id, &[x.id]), rule(s2.id, &[x.id])])
        .await
        .unwrap();

    let draft = h.payments.create(s1.id, to_user(&r, "5", false)).await.unwrap();
    let sent = h.payments.create(s1.id, to_user(&r, "10", true)).await.unwrap();
    let other = h.payments.create(s2.id, to_user(&r, "20", true)).await.unwrap();
    let closed = h.payments.create(s1.id, to_user(&r, "30", true)).await.unwrap();
    h.payments
        .reject(closed.id, &Caller::user(r.id), RejectPaymentRequest { reason: "dup".into() })
        .await
        .unwrap();

    let update = h
        .policies
        .set_policy(r.id, &[rule(s1.id, &[y.id]), rule(s2.id, &[x.id])])
        .await
        .unwrap();
    assert_eq!(update.reconciled_payments, 1);

    let as_sender = Caller::user(s1.id);
    let sent_view = h.payments.get(sent.id, &as_sender).await.unwrap();
    assert_eq!(sent_view.approvers[0].approver_id, y.id);
    assert!(!sent_view.approvers[0].is_approved);

    let draft_view = h.payments.get(draft.id, &as_sender).await.unwrap();
    assert!(draft_view.approvers.is_empty());
    assert_eq!(draft_view.status, PaymentStatus::Created);

    let closed_view = h.payments.get(closed.id, &as_sender).await.unwrap();
    assert_eq!(closed_view.approvers[0].approver_id, x.id);

    let other_view = h.payments.get(other.id, &Caller::user(s2.id)).await.unwrap();
    assert_eq!(other_view.approvers[0].approver_id, x.id);
}

#[tokio::test]
async fn third_party_cost_visibility_follows_show_cost() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;
    let x = h.user("xavier").await;
    h.policy(&r, &s, &[&x]).await;

    let payment = h.payments.create(s.id, to_user(&r, "100", true)).await.unwrap();
    let hidden = h.payments.get(payment.id, &Caller::user(x.id)).await.unwrap();
    assert_eq!(hidden.amount, None);

    h.policies
        .set_policy(
            r.id,
            &[ApproverRule {
                send_user_id: s.id,
                approver_ids: vec![x.id],
                show_cost: true,
            }],
        )
        .await
        .unwrap();
    let shown = h.payments.get(payment.id, &Caller::user(x.id)).await.unwrap();
    assert_eq!(shown.amount, Some(dec("100")));
}

#[tokio::test]
async fn unknown_recipient_is_not_found() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let err = h.policies.set_policy(404, &[rule(s.id, &[])]).await.unwrap_err();
    assert!(matches!(err, PayError::NotFound(_)));
}
