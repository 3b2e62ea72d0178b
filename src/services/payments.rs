//! Payment workflow: every operation runs in one transaction and answers with
//! the payment projected for the caller.

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PayError;
use crate::models::{
    ApproverSettings, ConfirmPaymentRequest, ContactMethod, CreatePaymentRequest, Economics,
    ListPaymentsQuery, ListRole, Page, Payment, PaymentId, PaymentStatus, PaymentTarget,
    PaymentView, ProcessPaymentRequest, RejectPaymentRequest, UpdatePaymentRequest, UserId,
    EXTERNAL_RECEIVER,
};
use crate::services::access::{self, Caller};
use crate::services::lifecycle::{self, Action};
use crate::services::notifier::Notifier;
use crate::services::projection::{self, Perspective};
use crate::services::quote::{self, QuoteSource};
use crate::services::snapshot;
use crate::services::store::{self, PaymentFilter, Store};
use crate::services::token::TokenCipher;
use crate::services::validation;

/// Page size limits for listings.
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// An email to send once the transaction that produced it has committed.
struct Notice {
    template: &'static str,
    recipient: String,
    payload: Value,
}

pub struct PaymentService {
    store: Store,
    tokens: TokenCipher,
    notifier: Arc<dyn Notifier>,
    quotes: Option<Arc<dyn QuoteSource>>,
    public_base_url: String,
    paging: Paging,
}

impl PaymentService {
    pub fn new(
        store: Store,
        tokens: TokenCipher,
        notifier: Arc<dyn Notifier>,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            tokens,
            notifier,
            quotes: None,
            public_base_url,
            paging: Paging::default(),
        }
    }

    pub fn with_quotes(mut self, quotes: Arc<dyn QuoteSource>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    pub fn tokens(&self) -> &TokenCipher {
        &self.tokens
    }

    pub async fn create(
        &self,
        sender_id: UserId,
        request: CreatePaymentRequest,
    ) -> Result<PaymentView, PayError> {
        validation::validate_target(sender_id, &request.target)?;
        validation::validate_economics(&request.economics)?;

        let mut tx = self.store.begin().await?;

        let sender = store::fetch_user(&mut *tx, sender_id)
            .await?
            .ok_or_else(|| PayError::NotFound(format!("user {}", sender_id)))?;

        let now = Utc::now();
        let mut payment = Payment {
            id: 0,
            sender_id,
            sender_name: sender.name.clone(),
            sender_display_name: sender.display_name.clone(),
            receiver_id: EXTERNAL_RECEIVER,
            external_email: None,
            contact_method: request.target.contact_method(),
            amount: request.economics.amount,
            hourly_rate: None,
            details: Vec::new(),
            payment_method: None,
            payment_address: None,
            convert_rate: None,
            convert_time: None,
            expected_amount: None,
            status: PaymentStatus::Created,
            rejection_reason: None,
            approvers: Vec::new(),
            created_at: now,
            updated_at: now,
            sent_at: None,
            paid_at: None,
            tx_id: None,
        };
        apply_target(&mut *tx, &mut payment, &request.target).await?;
        apply_economics(&mut payment, request.economics);

        if request.send_now {
            apply_send(&mut *tx, &mut payment).await?;
        }

        payment.id = store::insert_payment(&mut *tx, &payment).await?;

        let notices = if request.send_now {
            self.sent_notices(&mut *tx, &payment).await?
        } else {
            Vec::new()
        };
        let view = view_for(&mut *tx, &payment, Perspective::Sender).await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = payment.id,
            sender_id,
            status = %payment.status,
            contact = payment.contact_method.as_str(),
            "Payment created"
        );
        self.deliver(notices).await;

        Ok(view)
    }

    /// Edits a draft or a sent payment. Editing a sent payment voids every
    /// approval already given, since the terms changed.
    pub async fn update(
        &self,
        payment_id: PaymentId,
        sender_id: UserId,
        request: UpdatePaymentRequest,
    ) -> Result<PaymentView, PayError> {
        validation::validate_economics(&request.economics)?;

        let mut tx = self.store.begin().await?;
        let mut payment = load(&mut *tx, payment_id).await?;

        if payment.sender_id != sender_id {
            return Err(PayError::NotOwner(payment_id));
        }
        lifecycle::check(&payment, Action::Update)?;

        if let Some(target) = &request.target {
            if payment.status != PaymentStatus::Created {
                return Err(PayError::InvalidTransition {
                    action: Action::Update,
                    status: payment.status,
                });
            }
            validation::validate_target(sender_id, target)?;
            apply_target(&mut *tx, &mut payment, target).await?;
        }
        apply_economics(&mut payment, request.economics);

        if payment.status == PaymentStatus::Sent && payment.requires_approval() {
            snapshot::reset(&mut payment.approvers);
        }
        payment.touch();

        store::update_payment(&mut *tx, &payment).await?;
        let view = view_for(&mut *tx, &payment, Perspective::Sender).await?;
        tx.commit().await?;

        tracing::info!(payment_id, "Payment updated");
        Ok(view)
    }

    pub async fn send(
        &self,
        payment_id: PaymentId,
        sender_id: UserId,
    ) -> Result<PaymentView, PayError> {
        let mut tx = self.store.begin().await?;
        let mut payment = load(&mut *tx, payment_id).await?;

        if payment.sender_id != sender_id {
            return Err(PayError::NotOwner(payment_id));
        }
        apply_send(&mut *tx, &mut payment).await?;

        store::update_payment(&mut *tx, &payment).await?;
        let notices = self.sent_notices(&mut *tx, &payment).await?;
        let view = view_for(&mut *tx, &payment, Perspective::Sender).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id,
            approvers = payment.approvers.len(),
            "Payment sent"
        );
        self.deliver(notices).await;

        Ok(view)
    }

    /// Receiver (or one of the payment's approvers) accepts the terms.
    /// A payment method triggers a quote for the expected amount.
    ///
    /// Access and state are checked before the quote service is called, then
    /// again inside the write transaction since the payment may have moved on
    /// while the quote was in flight.
    pub async fn confirm(
        &self,
        payment_id: PaymentId,
        caller: &Caller,
        request: ConfirmPaymentRequest,
    ) -> Result<PaymentView, PayError> {
        let method = request
            .payment_method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(quote::currency_code)
            .transpose()?;

        let rate = match (&method, &self.quotes) {
            (Some(method), Some(quotes)) => {
                let mut conn = self.store.pool().acquire().await?;
                self.confirmable(&mut conn, payment_id, caller).await?;
                drop(conn);
                Some(quotes.rate(method).await?)
            }
            _ => None,
        };

        let mut tx = self.store.begin().await?;
        let (mut payment, perspective, live) = self.confirmable(&mut *tx, payment_id, caller).await?;
        payment.status = lifecycle::check(&payment, Action::Confirm)?;

        if let Some(method) = method {
            payment.payment_method = Some(method);
            if request.payment_address.is_some() {
                payment.payment_address = request.payment_address;
            }
        }
        if let Some(rate) = rate {
            payment.convert_rate = Some(rate);
            payment.convert_time = Some(Utc::now());
            payment.expected_amount = Some((payment.amount * rate).round_dp(8));
        }
        payment.touch();

        store::update_payment(&mut *tx, &payment).await?;
        tx.commit().await?;

        tracing::info!(payment_id, "Payment confirmed");
        Ok(projection::project(&payment, perspective, &live))
    }

    /// Loads the payment and checks `caller` may confirm it in its current state.
    async fn confirmable(
        &self,
        conn: &mut SqliteConnection,
        payment_id: PaymentId,
        caller: &Caller,
    ) -> Result<(Payment, Perspective, Vec<ApproverSettings>), PayError> {
        let payment = load(conn, payment_id).await?;
        let (perspective, live) = access::authorize(conn, &self.tokens, &payment, caller).await?;

        let may_confirm = match perspective {
            Perspective::Receiver | Perspective::ExternalContact => true,
            Perspective::ThirdParty(viewer) => payment.approver(viewer).is_some(),
            Perspective::Sender => false,
        };
        if !may_confirm {
            return Err(PayError::forbidden("only the receiver or an approver can confirm"));
        }
        lifecycle::check(&payment, Action::Confirm)?;

        Ok((payment, perspective, live))
    }

    /// Records the settlement. Refused while required approvals are missing.
    pub async fn process(
        &self,
        payment_id: PaymentId,
        caller: &Caller,
        request: ProcessPaymentRequest,
    ) -> Result<PaymentView, PayError> {
        for (field, value) in [
            ("tx_id", &request.tx_id),
            ("payment_method", &request.payment_method),
            ("payment_address", &request.payment_address),
        ] {
            if value.trim().is_empty() {
                return Err(PayError::Validation(format!("{} is required", field)));
            }
        }

        let mut tx = self.store.begin().await?;
        let mut payment = load(&mut *tx, payment_id).await?;
        let (perspective, live) = access::authorize(&mut *tx, &self.tokens, &payment, caller).await?;
        require_receiving_side(perspective, "pay")?;

        let next = lifecycle::check(&payment, Action::Process)?;
        if payment.requires_approval() && !snapshot::is_fully_approved(&payment, live.len()) {
            return Err(PayError::ApprovalPending(payment_id));
        }

        let now = Utc::now();
        payment.status = next;
        payment.tx_id = Some(request.tx_id);
        payment.payment_method = Some(request.payment_method);
        payment.payment_address = Some(request.payment_address);
        payment.paid_at = Some(now);
        payment.updated_at = now;

        store::update_payment(&mut *tx, &payment).await?;
        let notices = self
            .sender_notice(&mut *tx, &payment, "payment_paid")
            .await?;
        tx.commit().await?;

        tracing::info!(payment_id, tx_id = ?payment.tx_id, "Payment paid");
        self.deliver(notices).await;

        Ok(projection::project(&payment, perspective, &live))
    }

    pub async fn reject(
        &self,
        payment_id: PaymentId,
        caller: &Caller,
        request: RejectPaymentRequest,
    ) -> Result<PaymentView, PayError> {
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(PayError::validation("a rejection reason is required"));
        }

        let mut tx = self.store.begin().await?;
        let mut payment = load(&mut *tx, payment_id).await?;
        let (perspective, live) = access::authorize(&mut *tx, &self.tokens, &payment, caller).await?;
        require_receiving_side(perspective, "reject")?;

        payment.status = lifecycle::check(&payment, Action::Reject)?;
        payment.rejection_reason = Some(reason);
        payment.touch();

        store::update_payment(&mut *tx, &payment).await?;
        let notices = self
            .sender_notice(&mut *tx, &payment, "payment_rejected")
            .await?;
        tx.commit().await?;

        tracing::info!(payment_id, "Payment rejected");
        self.deliver(notices).await;

        Ok(projection::project(&payment, perspective, &live))
    }

    /// Ticks every snapshot entry for `approver_id`. The live policy is not
    /// consulted; whatever was captured at send time is what gets approved.
    pub async fn approve(
        &self,
        payment_id: PaymentId,
        approver_id: UserId,
    ) -> Result<PaymentView, PayError> {
        let mut tx = self.store.begin().await?;
        let mut payment = load(&mut *tx, payment_id).await?;

        lifecycle::check(&payment, Action::Approve)?;
        if snapshot::approve(&mut payment.approvers, approver_id) == 0 {
            return Err(PayError::Forbidden(format!(
                "user {} is not an approver of payment {}",
                approver_id, payment_id
            )));
        }
        payment.touch();

        store::update_payment(&mut *tx, &payment).await?;
        let perspective = Perspective::resolve(&payment, Some(approver_id))?;
        let view = view_for(&mut *tx, &payment, perspective).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id,
            approver_id,
            approved = payment.approved_count(),
            of = payment.approvers.len(),
            "Payment approved"
        );
        Ok(view)
    }

    pub async fn get(&self, payment_id: PaymentId, caller: &Caller) -> Result<PaymentView, PayError> {
        let mut conn = self.store.pool().acquire().await?;
        let payment = load(&mut conn, payment_id).await?;
        let (perspective, live) = access::authorize(&mut conn, &self.tokens, &payment, caller).await?;
        Ok(projection::project(&payment, perspective, &live))
    }

    pub async fn list(
        &self,
        viewer: UserId,
        query: &ListPaymentsQuery,
    ) -> Result<Page<PaymentView>, PayError> {
        let statuses = query.status_filters().map_err(PayError::Validation)?;
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(self.paging.default_page_size)
            .clamp(1, self.paging.max_page_size);

        let mut conn = self.store.pool().acquire().await?;

        let approver_pairs = match query.role {
            None | Some(ListRole::Approver) => {
                store::fetch_policies_where_approver(&mut conn, viewer).await?
            }
            Some(_) => Vec::new(),
        };
        let filter = PaymentFilter {
            viewer,
            role: query.role,
            approver_pairs,
            statuses,
        };

        let offset = u64::from(page - 1) * u64::from(per_page);
        let (payments, total) = store::list_payments(&mut conn, &filter, per_page, offset).await?;

        let mut policies: HashMap<(UserId, UserId), Vec<ApproverSettings>> = HashMap::new();
        let mut items = Vec::with_capacity(payments.len());
        for payment in &payments {
            let key = (payment.receiver_id, payment.sender_id);
            if !policies.contains_key(&key) {
                let rows = store::fetch_policy_rows(&mut conn, key.0, key.1).await?;
                policies.insert(key, rows);
            }
            let perspective = Perspective::resolve(payment, Some(viewer))?;
            let live = policies.get(&key).map(Vec::as_slice).unwrap_or_default();
            items.push(projection::project(payment, perspective, live));
        }

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    async fn sent_notices(
        &self,
        conn: &mut SqliteConnection,
        payment: &Payment,
    ) -> Result<Vec<Notice>, PayError> {
        let base = self.public_base_url.trim_end_matches('/');

        match payment.contact_method {
            ContactMethod::Email => {
                let token = self.tokens.issue(payment.id)?;
                let recipient = payment.external_email.clone().unwrap_or_default();
                Ok(vec![Notice {
                    template: "external_payment_request",
                    recipient,
                    payload: json!({
                        "payment_id": payment.id,
                        "sender": payment.sender_display_name,
                        "amount": payment.amount,
                        "link": format!("{}/payments/{}?token={}", base, payment.id, token),
                        "token": token,
                    }),
                }])
            }
            ContactMethod::Internal => {
                let receiver = store::fetch_user(conn, payment.receiver_id).await?;
                Ok(receiver
                    .and_then(|user| user.email)
                    .map(|email| Notice {
                        template: "payment_request",
                        recipient: email,
                        payload: json!({
                            "payment_id": payment.id,
                            "sender": payment.sender_display_name,
                            "amount": payment.amount,
                            "link": format!("{}/payments/{}", base, payment.id),
                        }),
                    })
                    .into_iter()
                    .collect())
            }
        }
    }

    async fn sender_notice(
        &self,
        conn: &mut SqliteConnection,
        payment: &Payment,
        template: &'static str,
    ) -> Result<Vec<Notice>, PayError> {
        let sender = store::fetch_user(conn, payment.sender_id).await?;
        Ok(sender
            .and_then(|user| user.email)
            .map(|email| Notice {
                template,
                recipient: email,
                payload: json!({
                    "payment_id": payment.id,
                    "status": payment.status,
                    "tx_id": payment.tx_id,
                    "reason": payment.rejection_reason,
                }),
            })
            .into_iter()
            .collect())
    }

    async fn deliver(&self, notices: Vec<Notice>) {
        for notice in notices {
            if let Err(e) = self
                .notifier
                .notify(notice.template, &notice.recipient, notice.payload)
                .await
            {
                tracing::warn!("Notification {} failed: {}", notice.template, e);
            }
        }
    }
}

async fn load(conn: &mut SqliteConnection, payment_id: PaymentId) -> Result<Payment, PayError> {
    store::fetch_payment(conn, payment_id)
        .await?
        .ok_or_else(|| PayError::NotFound(format!("payment {}", payment_id)))
}

async fn view_for(
    conn: &mut SqliteConnection,
    payment: &Payment,
    perspective: Perspective,
) -> Result<PaymentView, PayError> {
    let live = store::fetch_policy_rows(conn, payment.receiver_id, payment.sender_id).await?;
    Ok(projection::project(payment, perspective, &live))
}

fn require_receiving_side(perspective: Perspective, what: &str) -> Result<(), PayError> {
    match perspective {
        Perspective::Receiver | Perspective::ExternalContact => Ok(()),
        _ => Err(PayError::Forbidden(format!(
            "only the receiver can {} this payment",
            what
        ))),
    }
}

/// Created → Sent, capturing the receiver's current policy for this sender.
async fn apply_send(conn: &mut SqliteConnection, payment: &mut Payment) -> Result<(), PayError> {
    let next = lifecycle::check(payment, Action::Send)?;

    let policy = if payment.is_external() {
        Vec::new()
    } else {
        store::fetch_policy_rows(conn, payment.receiver_id, payment.sender_id).await?
    };

    let now = Utc::now();
    payment.approvers = snapshot::capture(&policy);
    payment.status = next;
    payment.sent_at = Some(now);
    payment.updated_at = now;
    Ok(())
}

async fn apply_target(
    conn: &mut SqliteConnection,
    payment: &mut Payment,
    target: &PaymentTarget,
) -> Result<(), PayError> {
    match target {
        PaymentTarget::Internal { receiver_id } => {
            if store::fetch_user(conn, *receiver_id).await?.is_none() {
                return Err(PayError::Validation(format!(
                    "receiver {} does not exist",
                    receiver_id
                )));
            }
            payment.receiver_id = *receiver_id;
            payment.external_email = None;
        }
        PaymentTarget::Email { email } => {
            payment.receiver_id = EXTERNAL_RECEIVER;
            payment.external_email = Some(email.trim().to_lowercase());
        }
    }
    payment.contact_method = target.contact_method();
    Ok(())
}

fn apply_economics(payment: &mut Payment, economics: Economics) {
    payment.amount = economics.amount;
    payment.hourly_rate = economics.hourly_rate;
    payment.details = economics.details;
    if economics.payment_method.is_some() {
        payment.payment_method = economics.payment_method;
    }
    if economics.payment_address.is_some() {
        payment.payment_address = economics.payment_address;
    }
}
