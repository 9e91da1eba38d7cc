mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(api::root_handler, api::upload_handler, api::duplicates_handler, api::metrics_handler),
    components(schemas(types::UploadForm, crate::IngestReport, crate::DuplicatePair))
)]
pub struct ApiDoc;

/// 构建API服务器
///
/// * `max_body_size` - 单次请求的最大字节数
pub fn create_app(state: Arc<AppState>, max_body_size: usize) -> Router {
    Router::new()
        .route("/", get(api::root_handler))
        .route("/images", post(api::upload_handler))
        .route("/duplicates/{id}", get(api::duplicates_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .with_state(state)
}
