use crate::{
    error::PayError,
    handlers::AppState,
    models::{
        ApiResponse, ConfirmPaymentRequest, CreatePaymentRequest, ListPaymentsQuery, Page,
        PaymentId, PaymentView, ProcessPaymentRequest, RejectPaymentRequest,
        UpdatePaymentRequest,
    },
    services::Caller,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};

type ViewResponse = Result<Json<ApiResponse<PaymentView>>, PayError>;

pub async fn create_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentView>>), PayError> {
    let sender_id = caller.require_viewer()?;
    let view = state.payments.create(sender_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<ApiResponse<Page<PaymentView>>>, PayError> {
    let viewer = caller.require_viewer()?;
    let page = state.payments.list(viewer, &query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<PaymentId>,
) -> ViewResponse {
    let view = state.payments.get(id, &caller).await?;
    Ok(Json(ApiResponse::ok(view)))
}

pub async fn update_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<PaymentId>,
    Json(request): Json<UpdatePaymentRequest>,
) -> ViewResponse {
    let sender_id = caller.require_viewer()?;
    let view = state.payments.update(id, sender_id, request).await?;
    Ok(Json(ApiResponse::ok(view)))
}

pub async fn send_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<PaymentId>,
) -> ViewResponse {
    let sender_id = caller.require_viewer()?;
    let view = state.payments.send(id, sender_id).await?;
    Ok(Json(ApiResponse::ok(view)))
}

// An empty body confirms without picking a currency.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<PaymentId>,
    body: Bytes,
) -> ViewResponse {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ConfirmPaymentRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| PayError::Validation(format!("invalid confirm body: {}", e)))?
    };
    let view = state.payments.confirm(id, &caller, request).await?;
    Ok(Json(ApiResponse::ok(view)))
}

pub async fn process_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<PaymentId>,
    Json(request): Json<ProcessPaymentRequest>,
) -> ViewResponse {
    let view = state.payments.process(id, &caller, request).await?;
    Ok(Json(ApiResponse::ok(view)))
}

pub async fn reject_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<PaymentId>,
    Json(request): Json<RejectPaymentRequest>,
) -> ViewResponse {
    let view = state.payments.reject(id, &caller, request).await?;
    Ok(Json(ApiResponse::ok(view)))
}

pub async fn approve_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<PaymentId>,
) -> ViewResponse {
    let approver_id = caller.require_viewer()?;
    let view = state.payments.approve(id, approver_id).await?;
    Ok(Json(ApiResponse::ok(view)))
}
