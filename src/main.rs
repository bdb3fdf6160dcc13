use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agrimarket_orders::api;
use agrimarket_orders::config::AppConfig;
use agrimarket_orders::gateway::MockPaymentGateway;
use agrimarket_orders::metrics::Metrics;
use agrimarket_orders::services::{OrderService, Stores};
use agrimarket_orders::store::{
    InMemoryCatalog, InMemoryLedger, InMemoryOrderRepository, InMemoryVendorDirectory, PgStore,
};

async fn build_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match &config.database_url {
        Some(url) => {
            let store = Arc::new(PgStore::connect(url, config.database_max_connections).await?);
            store.migrate().await?;
            Ok(Stores {
                catalog: store.clone(),
                vendors: store.clone(),
                orders: store.clone(),
                ledger: store,
            })
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running with in-memory stores");
            Ok(Stores {
                catalog: Arc::new(InMemoryCatalog::new()),
                vendors: Arc::new(InMemoryVendorDirectory::new()),
                orders: Arc::new(InMemoryOrderRepository::new()),
                ledger: Arc::new(InMemoryLedger::new()),
            })
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agrimarket_orders=debug")),
        )
        .init();

    tracing::info!("Starting agrimarket order engine");

    let config = AppConfig::from_env()?;

    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(metric_families = metrics.registry().gather().len(), "Metrics registry created");

    let stores = build_stores(&config).await?;

    // Stand-in gateway until a real processor adapter is wired
    let gateway = Arc::new(MockPaymentGateway::new());

    let service = Arc::new(OrderService::new(
        stores,
        gateway,
        config.engine_settings(),
        metrics.clone(),
    ));

    let bind = (config.server_host.clone(), config.server_port);
    tracing::info!(host = %bind.0, port = bind.1, "HTTP server listening");

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::from(service.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .configure(api::configure)
    })
    .bind(bind)?
    .run()
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
