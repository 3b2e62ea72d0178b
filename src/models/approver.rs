use serde::{Deserialize, Serialize};

use super::UserId;

/// One persisted policy row: payments from `send_user_id` to `recipient_id`
/// need sign-off from `approver_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApproverSettings {
    pub id: i64,
    pub recipient_id: UserId,
    pub send_user_id: UserId,
    pub send_user_name: String,
    pub approver_id: UserId,
    pub approver_name: String,
    pub show_cost: bool,
}

/// Input rule for a full policy replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverRule {
    pub send_user_id: UserId,
    pub approver_ids: Vec<UserId>,
    #[serde(default)]
    pub show_cost: bool,
}
