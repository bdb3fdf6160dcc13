use actix_web::{web, HttpResponse};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

use super::Metrics;

/// Render every registered metric in the Prometheus text format
pub fn encode_text(registry: &Registry) -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub async fn metrics_handler(metrics: web::Data<Arc<Metrics>>) -> HttpResponse {
    match encode_text(metrics.registry()) {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}
