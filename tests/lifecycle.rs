mod common;

use common::*;
use payreq::error::{ErrorKind, PayError};
use payreq::models::{
    ConfirmPaymentRequest, Economics, PaymentStatus, ProcessPaymentRequest, RejectPaymentRequest,
    UpdatePaymentRequest,
};
use payreq::services::Caller;

fn settle() -> ProcessPaymentRequest {
    ProcessPaymentRequest {
        tx_id: "0xabc".into(),
        payment_method: "BTC".into(),
        payment_address: "bc1qexample".into(),
    }
}

#[tokio::test]
async fn full_internal_flow_ends_paid_and_frozen() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;

    let draft = h.payments.create(s.id, to_user(&r, "250", false)).await.unwrap();
    assert_eq!(draft.status, PaymentStatus::Created);

    h.payments.send(draft.id, s.id).await.unwrap();

    let confirmed = h
        .payments
        .confirm(
            draft.id,
            &Caller::user(r.id),
            ConfirmPaymentRequest {
                payment_method: Some("btc".into()),
                payment_address: Some("bc1qexample".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(confirmed.status, PaymentStatus::Confirmed);
    assert_eq!(confirmed.convert_rate, Some(dec("0.00002")));
    assert_eq!(confirmed.expected_amount, Some(dec("0.005")));

    // The sender still sees a pending request.
    let sender_view = h.payments.get(draft.id, &Caller::user(s.id)).await.unwrap();
    assert_eq!(sender_view.status, PaymentStatus::Sent);

    let paid = h.payments.process(draft.id, &Caller::user(r.id), settle()).await.unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert_eq!(paid.tx_id.as_deref(), Some("0xabc"));
    assert_eq!(h.outbox.last().unwrap().template, "payment_paid");
    assert_eq!(h.outbox.last().unwrap().recipient, "sam@example.com");

    let again = h
        .payments
        .reject(
            draft.id,
            &Caller::user(r.id),
            RejectPaymentRequest { reason: "changed my mind".into() },
        )
        .await
        .unwrap_err();
    assert!(matches!(again, PayError::AlreadyPaid(_)));
    assert_eq!(again.kind(), ErrorKind::Conflict);

    let edit = h
        .payments
        .update(
            draft.id,
            s.id,
            UpdatePaymentRequest {
                target: None,
                economics: Economics::fixed(dec("1")),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(edit, PayError::AlreadyPaid(_)));
}

#[tokio::test]
async fn drafts_are_invisible_to_the_receiver() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;

    let draft = h.payments.create(s.id, to_user(&r, "10", false)).await.unwrap();

    let err = h.payments.get(draft.id, &Caller::user(r.id)).await.unwrap_err();
    assert!(matches!(err, PayError::Forbidden(_)));

    let listed = h
        .payments
        .list(r.id, &Default::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 0);

    let own = h.payments.list(s.id, &Default::default()).await.unwrap();
    assert_eq!(own.total, 1);
}

#[tokio::test]
async fn only_the_sender_may_send_or_edit() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;

    let draft = h.payments.create(s.id, to_user(&r, "10", false)).await.unwrap();
    assert!(matches!(
        h.payments.send(draft.id, r.id).await,
        Err(PayError::NotOwner(_))
    ));

    h.payments.send(draft.id, s.id).await.unwrap();
    assert!(matches!(
        h.payments.send(draft.id, s.id).await,
        Err(PayError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn editing_a_sent_payment_voids_approvals() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;
    let x = h.user("xavier").await;
    h.policy(&r, &s, &[&x]).await;

    let payment = h.payments.create(s.id, to_user(&r, "100", true)).await.unwrap();
    h.payments.approve(payment.id, x.id).await.unwrap();

    let edited = h
        .payments
        .update(
            payment.id,
            s.id,
            UpdatePaymentRequest {
                target: None,
                economics: Economics::fixed(dec("120")),
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.amount, Some(dec("120")));
    assert!(edited.approvers.iter().all(|a| !a.is_approved));

    // Retargeting is a draft-only edit.
    let other = h.user("olga").await;
    let err = h
        .payments
        .update(
            payment.id,
            s.id,
            UpdatePaymentRequest {
                target: Some(payreq::models::PaymentTarget::Internal { receiver_id: other.id }),
                economics: Economics::fixed(dec("120")),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PayError::InvalidTransition { .. }));
}

#[tokio::test]
async fn processing_waits_for_approvals() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;
    let x = h.user("xavier").await;
    h.policy(&r, &s, &[&x]).await;

    let payment = h.payments.create(s.id, to_user(&r, "100", true)).await.unwrap();
    h.payments
        .confirm(payment.id, &Caller::user(r.id), Default::default())
        .await
        .unwrap();

    let err = h
        .payments
        .process(payment.id, &Caller::user(r.id), settle())
        .await
        .unwrap_err();
    assert!(matches!(err, PayError::ApprovalPending(_)));

    h.payments.approve(payment.id, x.id).await.unwrap();
    let paid = h
        .payments
        .process(payment.id, &Caller::user(r.id), settle())
        .await
        .unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn approvers_cannot_settle_and_strangers_cannot_approve() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;
    let x = h.user("xavier").await;
    let z = h.user("zed").await;
    h.policy(&r, &s, &[&x]).await;

    let payment = h.payments.create(s.id, to_user(&r, "100", true)).await.unwrap();

    assert!(matches!(
        h.payments.approve(payment.id, z.id).await,
        Err(PayError::Forbidden(_))
    ));
    assert!(matches!(
        h.payments
            .reject(payment.id, &Caller::user(x.id), RejectPaymentRequest { reason: "no".into() })
            .await,
        Err(PayError::Forbidden(_))
    ));

    // An approver in the snapshot may confirm on the receiver's behalf.
    let confirmed = h
        .payments
        .confirm(payment.id, &Caller::user(x.id), Default::default())
        .await
        .unwrap();
    assert_eq!(confirmed.status, PaymentStatus::WaitApproval);
}

#[tokio::test]
async fn external_receiver_works_through_the_token() {
    let h = Harness::new().await;
    let s = h.user("sam").await;

    let payment = h
        .payments
        .create(s.id, to_email("Vendor@Example.com", "75", true))
        .await
        .unwrap();
    assert_eq!(payment.external_email.as_deref(), Some("vendor@example.com"));

    let notice = h.outbox.last().unwrap();
    assert_eq!(notice.template, "external_payment_request");
    assert_eq!(notice.recipient, "vendor@example.com");
    let token = notice.payload["token"].as_str().unwrap().to_string();
    assert!(notice.payload["link"].as_str().unwrap().ends_with(&token));

    let anonymous = h.payments.get(payment.id, &Caller::default()).await.unwrap_err();
    assert!(matches!(anonymous, PayError::Forbidden(_)));

    let forged = h
        .payments
        .get(payment.id, &Caller::token(h.tokens.issue(payment.id + 1).unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(forged, PayError::Forbidden(_)));

    let rejected = h
        .payments
        .reject(
            payment.id,
            &Caller::token(token.clone()),
            RejectPaymentRequest { reason: "wrong invoice".into() },
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, PaymentStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("wrong invoice"));
    assert_eq!(h.outbox.last().unwrap().template, "payment_rejected");
}

#[tokio::test]
async fn create_validates_before_writing() {
    let h = Harness::new().await;
    let s = h.user("sam").await;

    let err = h
        .payments
        .create(s.id, to_user(&s, "10", false))
        .await
        .unwrap_err();
    assert!(matches!(err, PayError::Validation(_)));

    let mut ghost = to_user(&s, "10", false);
    ghost.target = payreq::models::PaymentTarget::Internal { receiver_id: 999 };
    assert!(matches!(
        h.payments.create(s.id, ghost).await,
        Err(PayError::Validation(_))
    ));

    assert_eq!(h.payments.list(s.id, &Default::default()).await.unwrap().total, 0);
}

#[tokio::test]
async fn confirm_checks_state_and_access_before_quoting() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;
    let stranger = h.user("zed").await;

    let payment = h.payments.create(s.id, to_user(&r, "100", true)).await.unwrap();
    h.payments
        .confirm(payment.id, &Caller::user(r.id), Default::default())
        .await
        .unwrap();
    h.payments.process(payment.id, &Caller::user(r.id), settle()).await.unwrap();

    // JPY has no quote, so any quote lookup would surface as a validation error.
    let with_method = || ConfirmPaymentRequest {
        payment_method: Some("JPY".into()),
        payment_address: None,
    };

    let by_receiver = h
        .payments
        .confirm(payment.id, &Caller::user(r.id), with_method())
        .await
        .unwrap_err();
    assert!(matches!(by_receiver, PayError::AlreadyPaid(_)));

    let by_stranger = h
        .payments
        .confirm(payment.id, &Caller::user(stranger.id), with_method())
        .await
        .unwrap_err();
    assert!(matches!(by_stranger, PayError::Forbidden(_)));

    let anonymous = h
        .payments
        .confirm(payment.id, &Caller::default(), with_method())
        .await
        .unwrap_err();
    assert!(matches!(anonymous, PayError::Forbidden(_)));

    let odd_code = h
        .payments
        .confirm(
            payment.id,
            &Caller::user(r.id),
            ConfirmPaymentRequest {
                payment_method: Some("../rates".into()),
                payment_address: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(odd_code, PayError::Validation(_)));
}

#[tokio::test]
async fn drafts_are_invisible_to_approvers() {
    let h = Harness::new().await;
    let s = h.user("sam").await;
    let r = h.user("rita").await;
    let x = h.user("xavier").await;
    h.policy(&r, &s, &[&x]).await;

    let draft = h.payments.create(s.id, to_user(&r, "10", false)).await.unwrap();

    let err = h.payments.get(draft.id, &Caller::user(x.id)).await.unwrap_err();
    assert!(matches!(err, PayError::Forbidden(_)));
    assert_eq!(h.payments.list(x.id, &Default::default()).await.unwrap().total, 0);

    h.payments.send(draft.id, s.id).await.unwrap();
    assert!(h.payments.get(draft.id, &Caller::user(x.id)).await.is_ok());
    assert_eq!(h.payments.list(x.id, &Default::default()).await.unwrap().total, 1);
}
