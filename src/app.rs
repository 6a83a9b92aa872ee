use axum::{Router, routing::get};
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::cors::build_cors_layer;
use crate::features::{health::health_check, preview::create_preview_router};
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // 预览图本身就是 PNG，压缩只会浪费 CPU；只对 HTML/JSON（og-head、OpenAPI）生效。
    SizeAbove::default()
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(NotForContentType::const_new("application/octet-stream"))
}

/// 组装完整的 HTTP 路由：
/// - `/health`
/// - `{api.prefix}/og-image`、`{api.prefix}/og-head`
/// - `/docs` + `/api-docs/openapi.json`
///
/// 中间件自内向外：压缩 → CORS → request_id（含访问日志）。
pub fn build_router(state: AppState, config: &AppConfig) -> Router {
    let mut app = Router::<AppState>::new()
        .route("/health", get(health_check))
        .nest(&config.api.prefix, create_preview_router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state);

    app = app.layer(CompressionLayer::new().compress_when(compression_predicate()));
    if let Some(cors) = build_cors_layer(&config.cors) {
        app = app.layer(cors);
    }
    app.layer(axum::middleware::from_fn(request_id_middleware))
}
