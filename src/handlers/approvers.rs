use crate::{
    error::PayError,
    handlers::AppState,
    models::{ApiResponse, ApproverSettings, SetApproverPolicyRequest},
    services::Caller,
};
use axum::{extract::State, Extension, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PolicyResponse {
    pub rules: Vec<ApproverSettings>,
    pub reconciled_payments: usize,
}

/// Current policy of the calling user, as recipient.
pub async fn get_policy(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiResponse<Vec<ApproverSettings>>>, PayError> {
    let recipient_id = caller.require_viewer()?;
    let rows = state.policies.recipient_policy(recipient_id).await?;
    Ok(Json(ApiResponse::ok(rows)))
}

/// Replaces the calling user's whole policy.
pub async fn set_policy(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<SetApproverPolicyRequest>,
) -> Result<Json<ApiResponse<PolicyResponse>>, PayError> {
    let recipient_id = caller.require_viewer()?;
    let update = state.policies.set_policy(recipient_id, &request.rules).await?;

    Ok(Json(ApiResponse::ok(PolicyResponse {
        rules: update.rows,
        reconciled_payments: update.reconciled_payments,
    })))
}
