use crate::{
    error::PayError,
    handlers::AppState,
    models::{ApiResponse, NewUser, User, UserId},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

pub async fn create_user(
    State(state): State<AppState>,
    Json(new): Json<NewUser>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), PayError> {
    let user = state.users.create(new).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(user))))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<ApiResponse<User>>, PayError> {
    let user = state.users.get(id).await?;
    Ok(Json(ApiResponse::ok(user)))
}
