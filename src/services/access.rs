use sqlx::SqliteConnection;

use crate::error::PayError;
use crate::models::{ApproverSettings, Payment, PaymentStatus, UserId};
use crate::services::projection::Perspective;
use crate::services::store;
use crate::services::token::TokenCipher;

/// Credentials presented with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub viewer: Option<UserId>,
    pub token: Option<String>,
}

impl Caller {
    pub fn user(id: UserId) -> Self {
        Self {
            viewer: Some(id),
            token: None,
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            viewer: None,
            token: Some(token.into()),
        }
    }

    pub fn require_viewer(&self) -> Result<UserId, PayError> {
        self.viewer
            .ok_or_else(|| PayError::forbidden("this operation needs a signed-in user"))
    }
}

/// Decides whether `caller` may see `payment`.
///
/// With a session: the sender, or once the payment left draft, the receiver
/// and anyone in the live policy for the payment's (receiver, sender) pair.
/// Without one: only a valid token for this exact email-contact payment.
///
/// Returns the caller's perspective and the live policy rows, which the
/// projection needs anyway.
pub async fn authorize(
    conn: &mut SqliteConnection,
    tokens: &TokenCipher,
    payment: &Payment,
    caller: &Caller,
) -> Result<(Perspective, Vec<ApproverSettings>), PayError> {
    let live = store::fetch_policy_rows(conn, payment.receiver_id, payment.sender_id).await?;

    match caller.viewer {
        Some(viewer) => {
            let is_sender = viewer == payment.sender_id;
            let is_receiver = !payment.is_external()
                && viewer == payment.receiver_id
                && payment.status != PaymentStatus::Created;
            let is_approver = payment.status != PaymentStatus::Created
                && live.iter().any(|row| row.approver_id == viewer);

            if !(is_sender || is_receiver || is_approver) {
                return Err(PayError::Forbidden(format!(
                    "user {} has no access to payment {}",
                    viewer, payment.id
                )));
            }
        }
        None => {
            if !payment.is_external() {
                return Err(PayError::forbidden(
                    "token access is only available for email contacts",
                ));
            }
            let token = caller
                .token
                .as_deref()
                .ok_or_else(|| PayError::forbidden("an access token is required"))?;
            tokens.verify(token, payment.id)?;
        }
    }

    let perspective = Perspective::resolve(payment, caller.viewer)?;
    Ok((perspective, live))
}
