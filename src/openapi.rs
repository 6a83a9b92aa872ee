use utoipa::openapi::server::{ServerBuilder, ServerVariableBuilder};
use utoipa::{Modify, OpenApi};

/// 为 Swagger UI 提供正确的“业务接口前缀”Servers 配置。
///
/// - 业务接口默认前缀为 `/api`（对应 `config.api.prefix` / `APP_API__PREFIX`）。
/// - `/health` 不带前缀，因此额外提供 `/` 作为备用 server。
struct ApiServers;

impl Modify for ApiServers {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let api = ServerBuilder::new()
            .url("{api_prefix}")
            .description(Some("业务接口（默认 /api）"))
            .parameter(
                "api_prefix",
                ServerVariableBuilder::new()
                    .default_value("/api")
                    .description(Some(
                        "业务接口前缀：对应 config.api.prefix（可通过 APP_API__PREFIX 覆盖）",
                    )),
            )
            .build();

        let root = ServerBuilder::new()
            .url("/")
            .description(Some("根路径（用于 /health）"))
            .build();

        openapi.servers = Some(vec![api, root]);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::preview::handler::og_image,
        crate::features::preview::handler::og_head,
    ),
    components(schemas(crate::features::health::HealthResponse)),
    modifiers(&ApiServers),
    tags(
        (
            name = "Preview",
            description = "列表分享预览：按公开 token 生成 1200x630 PNG，以及指向它的 meta 标签。"
        ),
        (name = "Health", description = "健康检查：服务探活。"),
    ),
    info(
        title = "Giftzly OG API",
        version = env!("CARGO_PKG_VERSION"),
        description = "礼物清单社交分享预览图服务（Axum + resvg）。除 /health 外，业务接口挂载在 `config.api.prefix`（默认 /api）下，OpenAPI 的 paths 不包含该前缀。"
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::ApiDoc;
    use utoipa::OpenApi;

    #[test]
    fn documents_preview_and_health_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        assert!(paths.contains(&"/og-image"));
        assert!(paths.contains(&"/og-head"));
        assert!(paths.contains(&"/health"));
        assert_eq!(doc.servers.as_ref().map(Vec::len), Some(2));
    }
}
