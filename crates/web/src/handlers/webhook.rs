use axum::{extract::State, http::StatusCode};
use merge_bridge_core::models::Envelope;
use merge_bridge_github::PullRequestApi;

use crate::{AppState, delivery::Delivery, ingest::Summary};

const ACKNOWLEDGEMENT: (StatusCode, &str) = (StatusCode::OK, "OK");

/// Chain-event webhook. Always acknowledges, whatever happened to the records:
/// a non-2xx response would make the provider redeliver the whole batch.
pub async fn webhook<C: PullRequestApi + 'static>(
    State(state): State<AppState<C>>,
    delivery: Delivery,
) -> (StatusCode, &'static str) {
    if !state.bridge.verifier.is_enforcing() {
        tracing::warn!("Provenance checking disabled: no marketplace contract address configured");
    }
    let envelope = match delivery {
        Delivery::Rejected(reason) => {
            tracing::warn!("Ignoring webhook delivery: {}", reason);
            return ACKNOWLEDGEMENT;
        }
        Delivery::Accepted(Envelope::Malformed(reason)) => {
            tracing::warn!("Ignoring malformed webhook envelope: {}", reason);
            return ACKNOWLEDGEMENT;
        }
        Delivery::Accepted(Envelope::Valid(envelope)) => envelope,
    };
    tracing::info!(
        "Received webhook {} ({}) with {} activity records",
        envelope.webhook_id.as_deref().unwrap_or("[unknown]"),
        envelope.kind.as_deref().unwrap_or("[unknown]"),
        envelope.activity.len()
    );
    let outcomes = state.bridge.process(&envelope).await;
    for (index, outcome) in outcomes.iter().enumerate() {
        tracing::debug!("Record {}: {}", index, outcome);
    }
    tracing::info!(
        "Webhook {} processed: {}",
        envelope.webhook_id.as_deref().unwrap_or("[unknown]"),
        Summary::of(&outcomes)
    );
    ACKNOWLEDGEMENT
}
