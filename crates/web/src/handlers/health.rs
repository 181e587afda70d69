use axum::Json;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
    timestamp: String,
}

pub async fn health() -> Json<HealthStatus> {
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    Json(HealthStatus { status: "ok", timestamp })
}
