use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use super::error::ApiError;
use super::extractors::AuthenticatedActor;
use crate::gateway::PaymentDetails;
use crate::services::{ListQuery, NewOrder, OrderService, StatusUpdate, TransporterAssignment};

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub notes: Option<String>,
}

#[instrument(
    name = "handler::create_order",
    skip(service, actor, body),
    fields(actor_id = %actor.0.id, lines = body.items.len())
)]
pub async fn create_order(
    service: web::Data<OrderService>,
    actor: AuthenticatedActor,
    body: web::Json<NewOrder>,
) -> Result<HttpResponse, ApiError> {
    let created = service.create_order(&actor.0, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(created))
}

#[instrument(name = "handler::list_orders", skip(service, actor), fields(actor_id = %actor.0.id))]
pub async fn list_orders(
    service: web::Data<OrderService>,
    actor: AuthenticatedActor,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let views = service.list_orders(&actor.0, &query).await?;
    Ok(HttpResponse::Ok().json(views))
}

#[instrument(name = "handler::get_order", skip(service, actor), fields(actor_id = %actor.0.id))]
pub async fn get_order(
    service: web::Data<OrderService>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let view = service.get_order(path.into_inner(), &actor.0).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[instrument(
    name = "handler::update_status",
    skip(service, actor, body),
    fields(actor_id = %actor.0.id, to = %body.status)
)]
pub async fn update_status(
    service: web::Data<OrderService>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
    body: web::Json<StatusUpdate>,
) -> Result<HttpResponse, ApiError> {
    let order = service
        .update_status(path.into_inner(), &actor.0, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::assign_transporter", skip(service, actor, body), fields(actor_id = %actor.0.id))]
pub async fn assign_transporter(
    service: web::Data<OrderService>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
    body: web::Json<TransporterAssignment>,
) -> Result<HttpResponse, ApiError> {
    let order = service
        .assign_transporter(path.into_inner(), &actor.0, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::pay", skip(service, actor, body), fields(actor_id = %actor.0.id))]
pub async fn pay(
    service: web::Data<OrderService>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
    body: Option<web::Json<PaymentDetails>>,
) -> Result<HttpResponse, ApiError> {
    let details = body.map(|b| b.into_inner()).unwrap_or_default();
    let order = service.pay(path.into_inner(), &actor.0, details).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::cancel", skip(service, actor, body), fields(actor_id = %actor.0.id))]
pub async fn cancel(
    service: web::Data<OrderService>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
    body: Option<web::Json<CancelRequest>>,
) -> Result<HttpResponse, ApiError> {
    let notes = body.and_then(|b| b.into_inner().notes);
    let order = service.cancel(path.into_inner(), &actor.0, notes).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::tracking_history", skip(service, actor), fields(actor_id = %actor.0.id))]
pub async fn tracking_history(
    service: web::Data<OrderService>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let history = service.tracking_history(path.into_inner(), &actor.0).await?;
    Ok(HttpResponse::Ok().json(history))
}

pub async fn health(service: web::Data<OrderService>) -> HttpResponse {
    let report = service.health().await;
    let body = json!({
        "status": if report.healthy() { "healthy" } else { "degraded" },
        "service": "agrimarket-orders",
        "store": if report.store_ok { "up" } else { "down" },
        "payment_circuit": report.payment_circuit,
    });

    if report.healthy() {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
