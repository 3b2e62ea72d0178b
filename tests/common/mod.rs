#![allow(dead_code)]

use async_trait::async_trait;
use payreq::models::{ApproverRule, CreatePaymentRequest, Economics, NewUser, PaymentTarget, User};
use payreq::services::{Notifier, PaymentService, PolicyService, StaticQuotes, Store, TokenCipher, UserDirectory};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Sent {
    pub template: String,
    pub recipient: String,
    pub payload: Value,
}

/// Keeps every notification for later inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn templates(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.template.clone())
            .collect()
    }

    pub fn last(&self) -> Option<Sent> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, template: &str, recipient: &str, payload: Value) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent {
            template: template.to_string(),
            recipient: recipient.to_string(),
            payload,
        });
        Ok(())
    }
}

pub struct Harness {
    pub store: Store,
    pub payments: PaymentService,
    pub policies: PolicyService,
    pub users: UserDirectory,
    pub tokens: TokenCipher,
    pub outbox: Arc<RecordingNotifier>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Store::open_in_memory().await.unwrap();
        let tokens = TokenCipher::new(&[7u8; 32]);
        let outbox = Arc::new(RecordingNotifier::default());

        let payments = PaymentService::new(
            store.clone(),
            tokens.clone(),
            outbox.clone(),
            "https://pay.example.com".to_string(),
        )
        .with_quotes(Arc::new(StaticQuotes::new(vec![(
            "BTC".to_string(),
            "0.00002".parse().unwrap(),
        )])));

        Self {
            policies: PolicyService::new(store.clone()),
            users: UserDirectory::new(store.clone()),
            store,
            payments,
            tokens,
            outbox,
        }
    }

    pub async fn user(&self, name: &str) -> User {
        self.users
            .create(NewUser::named(name).with_email(&format!("{}@example.com", name)))
            .await
            .unwrap()
    }

    pub async fn policy(&self, recipient: &User, sender: &User, approvers: &[&User]) {
        self.policies
            .set_policy(
                recipient.id,
                &[ApproverRule {
                    send_user_id: sender.id,
                    approver_ids: approvers.iter().map(|u| u.id).collect(),
                    show_cost: false,
                }],
            )
            .await
            .unwrap();
    }
}

pub fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

pub fn to_user(receiver: &User, amount: &str, send_now: bool) -> CreatePaymentRequest {
    CreatePaymentRequest {
        target: PaymentTarget::Internal {
            receiver_id: receiver.id,
        },
        economics: Economics::fixed(dec(amount)),
        send_now,
    }
}

pub fn to_email(email: &str, amount: &str, send_now: bool) -> CreatePaymentRequest {
    CreatePaymentRequest {
        target: PaymentTarget::Email {
            email: email.to_string(),
        },
        economics: Economics::fixed(dec(amount)),
        send_now,
    }
}
