//! HTTP request handlers
//!
//! REST endpoints hosted behind the error pipeline. Handlers return
//! [`AppError`] freely; rendering and auditing happen in the pipeline.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::ApplicationSettings;
use crate::error::{AppError, AppResult};
use crate::id_generator::IdGenerator;
use crate::models::{Area, AreaInput, HealthCheck};
use crate::state::AppState;
use crate::validation::validate_area_input;

/// Configure all application routes
///
/// Path and query extractor errors are passed on unwrapped so the error
/// pipeline sees them as binding failures.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::PathConfig::default().error_handler(|err, _req| err.into()))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| err.into()))
            // Health check
            .route("/health", web::get().to(health_check))
            // Area directory
            .route("/areas", web::post().to(create_area))
            .route("/areas/{id}", web::get().to(get_area))
            .route("/areas/{id}/children", web::get().to(get_children)),
    );
}

/// Health check endpoint
///
/// GET /api/health
pub async fn health_check(
    state: web::Data<Arc<RwLock<AppState>>>,
    application: web::Data<ApplicationSettings>,
) -> AppResult<HttpResponse> {
    let state = state.read().await;

    let health = HealthCheck {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        application: application.name.clone(),
        timestamp: chrono::Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        areas: state.area_count(),
    };

    Ok(HttpResponse::Ok().json(health))
}

/// Register an area
///
/// POST /api/areas
pub async fn create_area(
    state: web::Data<Arc<RwLock<AppState>>>,
    ids: web::Data<dyn IdGenerator>,
    body: web::Json<AreaInput>,
) -> AppResult<HttpResponse> {
    validate_area_input(&body)?;

    let id = ids.generate();
    let area = state.write().await.add_area(id, body.into_inner())?;

    info!(area_id = area.id, area_code = %area.area_code, "Area registered");

    Ok(HttpResponse::Created().json(area))
}

/// Get a single area
///
/// GET /api/areas/{id}
pub async fn get_area(
    state: web::Data<Arc<RwLock<AppState>>>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let state = state.read().await;

    match state.get_area(id) {
        Some(area) => Ok(HttpResponse::Ok().json(area)),
        None => Err(AppError::NotFound(format!("Area {} not found", id))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    /// Include every descendant, not only direct children
    #[serde(default)]
    pub recursive: bool,
}

/// List the areas below an area
///
/// GET /api/areas/{id}/children?recursive=true
pub async fn get_children(
    state: web::Data<Arc<RwLock<AppState>>>,
    path: web::Path<u64>,
    query: web::Query<ChildrenQuery>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let state = state.read().await;

    if state.get_area(id).is_none() {
        return Err(AppError::NotFound(format!("Area {} not found", id)));
    }

    let areas: Vec<&Area> = if query.recursive {
        state.descendants_of(id)
    } else {
        state.children_of(id)
    };

    Ok(HttpResponse::Ok().json(areas))
}

/// Fallback for unmatched routes
pub async fn route_not_found(req: HttpRequest) -> AppResult<HttpResponse> {
    Err(AppError::NotFound(format!(
        "No route for {} {}",
        req.method(),
        req.path()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_generator::SequenceIdGenerator;
    use crate::models::ErrorBody;
    use crate::pipeline::{capture_errors, ErrorPipeline};
    use crate::sink::{AuditDispatcher, AuditWriter, MemoryAuditSink};
    use actix_web::middleware::from_fn;
    use actix_web::{test, App};
    use std::time::Duration;

    struct Harness {
        state: web::Data<Arc<RwLock<AppState>>>,
        ids: web::Data<dyn IdGenerator>,
        pipeline: web::Data<ErrorPipeline>,
        sink: Arc<MemoryAuditSink>,
        writer: AuditWriter,
    }

    fn harness() -> Harness {
        let ids: Arc<dyn IdGenerator> = Arc::new(SequenceIdGenerator::starting_at(1));
        let sink = Arc::new(MemoryAuditSink::new(16));
        let (dispatcher, writer) = AuditDispatcher::spawn(sink.clone(), 16);
        Harness {
            state: web::Data::new(Arc::new(RwLock::new(AppState::new()))),
            ids: web::Data::from(ids.clone()),
            pipeline: web::Data::new(ErrorPipeline::new(ids, dispatcher, "solaka-gateway").unwrap()),
            sink,
            writer,
        }
    }

    macro_rules! app {
        ($h:expr) => {
            test::init_service(
                App::new()
                    .app_data($h.state.clone())
                    .app_data($h.ids.clone())
                    .app_data($h.pipeline.clone())
                    .app_data(web::Data::new(ApplicationSettings {
                        name: "solaka-gateway".to_string(),
                    }))
                    .wrap(from_fn(capture_errors))
                    .configure(configure_routes)
                    .default_service(web::to(route_not_found)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_health_check() {
        let h = harness();
        let app = app!(h);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp: HealthCheck = test::call_and_read_body_json(&app, req).await;

        assert_eq!(resp.status, "healthy");
        assert_eq!(resp.application, "solaka-gateway");
    }

    #[actix_web::test]
    async fn test_create_and_get_area() {
        let h = harness();
        let app = app!(h);

        let req = test::TestRequest::post()
            .uri("/api/areas")
            .set_json(AreaInput {
                name: "Sichuan".to_string(),
                area_code: "510000".to_string(),
                zip_code: None,
                parent_id: None,
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let created: Area = test::read_body_json(resp).await;
        assert_eq!(created.id, 1);

        let req = test::TestRequest::get().uri("/api/areas/1").to_request();
        let fetched: Area = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched.name, "Sichuan");

        let req = test::TestRequest::get().uri("/api/areas/1/children").to_request();
        let children: Vec<Area> = test::call_and_read_body_json(&app, req).await;
        assert!(children.is_empty());
    }

    #[actix_web::test]
    async fn test_invalid_area_is_audited() {
        let h = harness();
        let app = app!(h);

        let req = test::TestRequest::post()
            .uri("/api/areas")
            .set_json(AreaInput {
                name: String::new(),
                area_code: "510000".to_string(),
                zip_code: None,
                parent_id: None,
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: ErrorBody = test::read_body_json(resp).await;
        assert_eq!(body.error, "Bad Request");

        drop(app);
        let Harness { sink, writer, pipeline, .. } = h;
        drop(pipeline);
        writer.shutdown(Duration::from_secs(5)).await;

        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].message().contains("name: Name must be between 1 and 64 characters"));
        assert_eq!(records[0].path(), "/api/areas");
        assert_eq!(records[0].method_name(), "POST");
    }

    #[actix_web::test]
    async fn test_get_missing_area() {
        let h = harness();
        let app = app!(h);

        let req = test::TestRequest::get().uri("/api/areas/42").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);

        let req = test::TestRequest::get().uri("/api/areas/not-a-number").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = test::TestRequest::get()
            .uri("/api/areas/42/children?recursive=maybe")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = test::TestRequest::get().uri("/api/unknown").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);

        drop(app);
        let Harness { sink, writer, pipeline, .. } = h;
        drop(pipeline);
        writer.shutdown(Duration::from_secs(5)).await;

        let records = sink.records().await;
        assert_eq!(records.len(), 4);
        assert!(records
            .iter()
            .any(|r| r.exception_type() == "actix_web::error::PathError" && r.status() == 400));
        assert!(records.iter().any(|r| {
            r.exception_type() == "actix_web::error::QueryPayloadError"
                && r.status() == 400
                && r.trace().is_some()
        }));
        assert!(records
            .iter()
            .any(|r| r.message() == "No route for GET /api/unknown" && r.trace().is_none()));
    }
}
