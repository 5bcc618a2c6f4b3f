//! HTTP adapters - REST API implementations.
//!
//! `router` assembles the full service: reconciliation routes, the health
//! probe, and the tower-http middleware stack.

pub mod iap;

use std::time::Duration;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use iap::{iap_router, IapApiError, IapAppState};

/// Build the service router with request-id, tracing and timeout layers.
pub fn router(state: IapAppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(iap::handlers::health))
        .merge(iap_router())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
