//! Gateway audit service
//!
//! API gateway error pipeline: every uncaught request error is classified,
//! answered with a uniform `{status, error, id}` JSON body and recorded in
//! an append-only audit store without delaying the response.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod classifier;
mod config;
mod error;
mod handlers;
mod id_generator;
mod models;
mod pipeline;
mod postgres_sink;
mod record;
mod renderer;
mod sink;
mod state;
mod validation;

use crate::config::{AuditStore, Settings};
use crate::id_generator::{resolve_node_id, IdGenerator, SnowflakeGenerator};
use crate::pipeline::{capture_errors, ErrorPipeline};
use crate::postgres_sink::PostgresAuditSink;
use crate::sink::{AuditDispatcher, AuditSink, MemoryAuditSink};
use crate::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenv::dotenv().ok();

    // Logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gateway_audit=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();

    // Load configuration
    let settings = Settings::from_env().context("Failed to load configuration")?;
    let bind_address = format!("{}:{}", settings.server.host, settings.server.port);

    info!(application = %settings.application.name, "Starting gateway audit service");

    // ---------------------------------------------------------------------
    // Audit sink and background writer
    // ---------------------------------------------------------------------
    let sink: Arc<dyn AuditSink> = match settings.audit.store {
        AuditStore::Memory => Arc::new(MemoryAuditSink::new(settings.audit.memory_capacity)),
        AuditStore::Postgres => {
            let sink = PostgresAuditSink::connect(&settings.storage)
                .await
                .context("Failed to connect audit storage")?;
            sink.ensure_schema(&settings.storage.keyspace)
                .await
                .context("Failed to prepare audit table")?;
            Arc::new(sink)
        }
    };

    let hostname = std::env::var("HOSTNAME").ok();
    let node_id = resolve_node_id(settings.audit.node_id, hostname.as_deref());
    info!(node_id, "Error id generator ready");
    let ids: Arc<dyn IdGenerator> = Arc::new(SnowflakeGenerator::new(node_id));

    let (dispatcher, writer) = AuditDispatcher::spawn(sink, settings.audit.queue_capacity);
    let pipeline = ErrorPipeline::new(ids.clone(), dispatcher, settings.application.name.clone())
        .context("Failed to build error pipeline")?;
    let pipeline = web::Data::new(pipeline);

    // Shared application state
    let app_state = web::Data::new(Arc::new(RwLock::new(AppState::new())));
    let id_data: web::Data<dyn IdGenerator> = web::Data::from(ids);
    let application = web::Data::new(settings.application.clone());

    // ---------------------------------------------------------------------
    // HTTP server
    // ---------------------------------------------------------------------
    info!("Binding server to {}", bind_address);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .app_data(id_data.clone())
            .app_data(application.clone())
            .app_data(pipeline.clone())
            .wrap(middleware::from_fn(capture_errors))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure_routes)
            .default_service(web::to(handlers::route_not_found))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    // Every dispatcher went away with the server; flush what is left.
    let grace = settings.audit.shutdown_grace();
    if writer.shutdown(grace).await.is_none() {
        warn!("Some error records were not persisted before shutdown");
    }

    info!("Gateway audit service stopped");
    Ok(())
}
