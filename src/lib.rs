pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::convert::ConversionPipeline;
use crate::services::lifecycle::ArtifactLifecycle;
use crate::services::redaction::RedactionService;
use crate::services::sequence::SequenceAllocator;
use crate::services::store::ArtifactStore;
use crate::services::viewer::Viewer;
use axum::{
    Router,
    middleware::from_fn,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::staging::upload_files,
        api::handlers::staging::convert_files,
        api::handlers::artifacts::list_pdfs,
        api::handlers::artifacts::delete_pdf,
        api::handlers::artifacts::download_pdf,
        api::handlers::artifacts::open_pdf,
        api::handlers::artifacts::serve_pdf,
        api::handlers::artifacts::serve_staged_pdf,
        api::handlers::redaction::redact_terms,
        api::handlers::redaction::redact_save,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::staging::UploadResponse,
            api::handlers::staging::ConvertRequest,
            api::handlers::staging::ConvertResponse,
            api::handlers::artifacts::PdfListResponse,
            api::handlers::artifacts::ActionResponse,
            api::handlers::redaction::RedactRequest,
            api::handlers::redaction::RedactResponse,
            api::handlers::redaction::RedactSaveRequest,
            api::handlers::redaction::RedactSaveResponse,
            services::convert::ItemOutcome,
            services::store::ArtifactInfo,
            services::store::BatchHandle,
            services::store::StageKind,
            services::pdf::RedactionBox,
        )
    ),
    tags(
        (name = "staging", description = "Upload and convert batches"),
        (name = "artifacts", description = "Generated PDF management"),
        (name = "redaction", description = "PDF redaction"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ArtifactStore>,
    pub pipeline: Arc<ConversionPipeline>,
    pub redaction: Arc<RedactionService>,
    pub lifecycle: Arc<ArtifactLifecycle>,
    pub config: AppConfig,
}

impl AppState {
    /// Wires the services around an already prepared store. Conversion and
    /// redaction share one sequence allocator so artifact numbers never collide.
    pub fn new(config: AppConfig, store: Arc<ArtifactStore>, viewer: Arc<dyn Viewer>) -> Self {
        let sequence = Arc::new(SequenceAllocator::new(store.output_dir()));

        let pipeline = Arc::new(ConversionPipeline::new(
            store.clone(),
            sequence.clone(),
            config.ffmpeg_path.clone(),
        ));
        let redaction = Arc::new(RedactionService::new(store.clone(), sequence));
        let lifecycle = Arc::new(ArtifactLifecycle::new(
            store.clone(),
            viewer,
            config.download_ttl,
        ));

        Self {
            store,
            pipeline,
            redaction,
            lifecycle,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let max_request_size = state.config.max_request_size;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::pages::index))
        .route("/health", get(api::handlers::health::health_check))
        .route("/api/upload", post(api::handlers::staging::upload_files))
        .route("/api/convert", post(api::handlers::staging::convert_files))
        .route("/api/pdfs", get(api::handlers::artifacts::list_pdfs))
        .route("/api/redact", post(api::handlers::redaction::redact_terms))
        .route("/api/redact-save", post(api::handlers::redaction::redact_save))
        .route(
            "/api/delete/:filename",
            delete(api::handlers::artifacts::delete_pdf),
        )
        .route(
            "/api/download/:filename",
            get(api::handlers::artifacts::download_pdf),
        )
        .route("/api/open/:filename", get(api::handlers::artifacts::open_pdf))
        .route("/pdf/:filename", get(api::handlers::artifacts::serve_pdf))
        .route(
            "/RedactPDF/:filename",
            get(api::handlers::artifacts::serve_staged_pdf),
        )
        .route(
            "/redact-editor/:filename",
            get(api::handlers::pages::redact_editor),
        )
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(max_request_size))
        .with_state(state)
}
