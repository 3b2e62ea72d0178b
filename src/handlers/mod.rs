pub mod approvers;
pub mod health;
pub mod payments;
pub mod users;

pub use approvers::*;
pub use health::*;
pub use payments::*;
pub use users::*;

use crate::{
    middleware::identify_caller,
    services::{PaymentService, PolicyService, Store, UserDirectory},
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Instant};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub policies: PolicyService,
    pub users: UserDirectory,
    pub store: Store,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Store, payments: PaymentService) -> Self {
        Self {
            payments: Arc::new(payments),
            policies: PolicyService::new(store.clone()),
            users: UserDirectory::new(store.clone()),
            store,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user))
        .route("/payments", post(create_payment).get(list_payments))
        .route("/payments/:id", get(get_payment).put(update_payment))
        .route("/payments/:id/send", post(send_payment))
        .route("/payments/:id/confirm", post(confirm_payment))
        .route("/payments/:id/process", post(process_payment))
        .route("/payments/:id/reject", post(reject_payment))
        .route("/payments/:id/approve", post(approve_payment))
        .route("/approvers", get(get_policy).put(set_policy))
        .layer(axum_middleware::from_fn(identify_caller))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
