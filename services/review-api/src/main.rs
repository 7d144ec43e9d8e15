//! HTTP front for a single document review session: upload, anchored view,
//! decisions and export.

use std::sync::Arc;

use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{
    error::{ErrorBadGateway, ErrorBadRequest, ErrorConflict, ErrorInternalServerError, ErrorNotFound},
    http::header,
    middleware::Logger,
    web, App, HttpResponse, HttpServer, Responder,
};
use futures_util::StreamExt as _;
use serde::{Deserialize, Serialize};
use shared::backend::{BackendClient, ReviewBackend};
use shared::config::Settings;
use shared::dto::{Decision, ExportFormat, Finding, FindingId, ProcessResponse};
use shared::error::AppError;
use shared::overlay::{OverlayRenderer, OverlayView, StaticOverlayRenderer};
use shared::session::{RenderedDocument, ReviewSession};
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    session: Arc<ReviewSession>,
    backend: Arc<dyn ReviewBackend>,
    renderer: Arc<dyn OverlayRenderer>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
struct LoadDocumentRequest {
    filename: String,
    #[serde(flatten)]
    response: ProcessResponse,
}

#[derive(Serialize)]
struct FindingsResponse {
    findings: Vec<Finding>,
    overlays: Vec<OverlayView>,
}

#[derive(Serialize)]
struct DecisionResponse {
    id: FindingId,
    decision: Decision,
}

#[derive(Deserialize)]
struct RefinedUpdate {
    refined: String,
}

#[derive(Deserialize)]
struct ExportBody {
    #[serde(default)]
    export_filename: Option<String>,
    #[serde(default)]
    export_format: ExportFormat,
}

fn to_http(err: AppError) -> actix_web::Error {
    match err {
        AppError::FindingNotFound(_) => ErrorNotFound(err),
        AppError::UnsupportedFormat(_) => ErrorBadRequest(err),
        AppError::NoDocument => ErrorConflict(err),
        AppError::Upstream(_) => ErrorBadGateway(err),
        AppError::Io(_) | AppError::Serialization(_) => ErrorInternalServerError(err),
    }
}

fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/healthz", web::get().to(healthz))
        .route("/process-document", web::post().to(process_document))
        .route("/document", web::post().to(load_document))
        .route("/document", web::get().to(get_document))
        .route("/progress", web::get().to(progress))
        .route("/export", web::post().to(export))
        .service(
            web::scope("/findings")
                .route("", web::get().to(list_findings))
                .route("", web::put().to(replace_findings))
                .route("/{id}/approve", web::post().to(approve))
                .route("/{id}/reject", web::post().to(reject))
                .route("/{id}/refined", web::put().to(update_refined)),
        );
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Arc::new(Settings::new()?);
    let backend = Arc::new(BackendClient::from_settings(&settings)?);
    let state = AppState {
        session: Arc::new(ReviewSession::from_settings(&settings)),
        settings: settings.clone(),
        backend,
        renderer: Arc::new(StaticOverlayRenderer),
    };

    let bind_addr = format!("{}:{}", settings.http_bind, settings.http_port);
    info!(%bind_addr, upstream = %settings.upstream_url, "starting server");

    HttpServer::new(move || {
        let app_state = state.clone();
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT"])
            .allowed_headers(vec![header::CONTENT_TYPE])
            .max_age(3600);

        if let Some(origins) = app_state.settings.cors_origins() {
            for origin in &origins {
                cors = cors.allowed_origin(origin);
            }
        } else {
            warn!("CORS_ORIGINS not set; allowing any origin");
            cors = cors.allow_any_origin();
        }

        App::new()
            .app_data(web::Data::new(app_state))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(configure)
    })
    .bind(bind_addr)?
    .run()
    .await?;
    Ok(())
}

async fn healthz() -> impl Responder {
    web::Json(HealthResponse { status: "ok" })
}

/// Render once the pass for `generation` has landed. A newer load may
/// supersede it, in which case whatever is current is returned.
async fn anchored_view(state: &AppState, generation: u64) -> actix_web::Result<RenderedDocument> {
    if state.session.wait_until_anchored(generation).await.is_none() {
        warn!(generation, "match pass superseded before it was applied");
    }
    state.session.render(state.renderer.as_ref()).map_err(to_http)
}

async fn process_document(
    mut payload: Multipart,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    while let Some(field_res) = payload.next().await {
        let mut field = field_res?;
        if field.name() != "file" {
            continue;
        }
        let filename = field
            .content_disposition()
            .get_filename()
            .map(str::to_string)
            .ok_or_else(|| ErrorBadRequest("file field has no filename"))?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        info!(file = %filename, size = bytes.len(), "received upload");

        let generation = state
            .session
            .process_upload(state.backend.as_ref(), &filename, bytes)
            .await
            .map_err(to_http)?;
        let view = anchored_view(&state, generation).await?;
        return Ok(HttpResponse::Ok().json(view));
    }
    Err(ErrorBadRequest("missing multipart field `file`"))
}

async fn load_document(
    body: web::Json<LoadDocumentRequest>,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    let LoadDocumentRequest { filename, response } = body.into_inner();
    let generation = state.session.load_document(filename, response);
    Ok(web::Json(anchored_view(&state, generation).await?))
}

async fn get_document(state: web::Data<AppState>) -> actix_web::Result<impl Responder> {
    let view = state
        .session
        .render(state.renderer.as_ref())
        .map_err(to_http)?;
    Ok(web::Json(view))
}

async fn list_findings(state: web::Data<AppState>) -> impl Responder {
    web::Json(FindingsResponse {
        findings: state.session.findings(),
        overlays: state.session.overlays(),
    })
}

async fn replace_findings(
    body: web::Json<Vec<Finding>>,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    let generation = state
        .session
        .replace_findings(body.into_inner())
        .map_err(to_http)?;
    Ok(web::Json(anchored_view(&state, generation).await?))
}

async fn approve(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let decision = state.session.approve(&id).map_err(to_http)?;
    Ok(web::Json(DecisionResponse { id, decision }))
}

async fn reject(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let decision = state.session.reject(&id).map_err(to_http)?;
    Ok(web::Json(DecisionResponse { id, decision }))
}

async fn update_refined(
    path: web::Path<String>,
    body: web::Json<RefinedUpdate>,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    state
        .session
        .edit(&id, body.into_inner().refined)
        .map_err(to_http)?;
    let finding = state
        .session
        .finding(&id)
        .ok_or_else(|| to_http(AppError::FindingNotFound(id)))?;
    Ok(web::Json(finding))
}

async fn progress(state: web::Data<AppState>) -> impl Responder {
    web::Json(state.session.progress())
}

async fn export(
    body: web::Json<ExportBody>,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    let ExportBody {
        export_filename,
        export_format,
    } = body.into_inner();
    let artifact = state
        .session
        .export(
            state.backend.as_ref(),
            export_filename.as_deref(),
            export_format,
        )
        .await
        .map_err(to_http)?;
    Ok(web::Json(artifact))
}
