use axum::{
    Router,
    routing::{get, post},
};
use merge_bridge_github::PullRequestApi;

use crate::AppState;

mod health;
mod webhook;

pub fn build_router<C: PullRequestApi + 'static>() -> Router<AppState<C>> {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhook", post(webhook::webhook::<C>))
        .route("/api/webhook", post(webhook::webhook::<C>))
}
