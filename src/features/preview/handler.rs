use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use reqwest::Url;

use crate::error::AppError;
use crate::state::AppState;

use super::types::PreviewQuery;

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[utoipa::path(
    get,
    path = "/og-image",
    summary = "生成列表分享预览图",
    description = "按列表公开 token 查询标题/创建者/封面，合成 1200x630 的 PNG 社交分享卡片。封面不可用时回退到默认图。",
    params(PreviewQuery),
    responses(
        (status = 200, description = "PNG bytes", content_type = "image/png"),
        (status = 400, description = "Missing token", body = String, content_type = "text/plain"),
        (status = 404, description = "List not found", body = String, content_type = "text/plain"),
        (status = 500, description = "Render / font / upstream error", body = String, content_type = "text/plain")
    ),
    tag = "Preview"
)]
pub async fn og_image(
    State(state): State<AppState>,
    Query(q): Query<PreviewQuery>,
) -> Result<Response, AppError> {
    let token = q
        .token()
        .ok_or_else(|| AppError::Validation("Missing token".to_string()))?;

    let image = state.preview.render(token).await?;

    let cache_control = HeaderValue::from_str(&format!(
        "public, max-age={}",
        state.cache_max_age_secs
    ))
    .map_err(|e| AppError::Internal(format!("Cache-Control 头构造失败: {e}")))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (header::CACHE_CONTROL, cache_control),
        ],
        image.bytes,
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/og-head",
    summary = "分享预览 meta 标签",
    description = "返回指向 og-image 的 Open Graph / Twitter meta 标签片段；未提供 token 时返回空文档。",
    params(PreviewQuery),
    responses(
        (status = 200, description = "HTML fragment", body = String, content_type = "text/html"),
        (status = 500, description = "public_base_url 配置无效", body = String, content_type = "text/plain")
    ),
    tag = "Preview"
)]
pub async fn og_head(
    State(state): State<AppState>,
    Query(q): Query<PreviewQuery>,
) -> Result<Response, AppError> {
    let body = match q.token() {
        None => String::new(),
        Some(token) => {
            let url = og_image_url(&state.public_base_url, &state.api_prefix, token)?;
            og_meta_tags(url.as_str())
        }
    };
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)],
        body,
    )
        .into_response())
}

/// 对外可访问的 og-image 地址（token 经过 URL 编码）
pub fn og_image_url(public_base_url: &str, api_prefix: &str, token: &str) -> Result<Url, AppError> {
    let raw = format!(
        "{}{}/og-image",
        public_base_url.trim_end_matches('/'),
        api_prefix.trim_end_matches('/')
    );
    let mut url = Url::parse(&raw)
        .map_err(|e| AppError::Internal(format!("preview.public_base_url 无效: {e}")))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

fn og_meta_tags(image_url: &str) -> String {
    let content = escape_html_attr(image_url);
    format!(
        "<meta property=\"og:image\" content=\"{content}\">\n\
         <meta property=\"twitter:image\" content=\"{content}\">\n\
         <meta name=\"twitter:card\" content=\"summary_large_image\">\n"
    )
}

fn escape_html_attr(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn create_preview_router() -> Router<AppState> {
    Router::new()
        .route("/og-image", get(og_image))
        .route("/og-head", get(og_head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn og_image_url_encodes_token() {
        let url = og_image_url("https://giftzly.example/", "/api", "a b&c").expect("url");
        assert_eq!(
            url.as_str(),
            "https://giftzly.example/api/og-image?token=a+b%26c"
        );
    }

    #[test]
    fn meta_tags_reference_image_and_escape_ampersands() {
        let html = og_meta_tags("https://x.example/api/og-image?token=t&x=1");
        assert!(html.contains(r#"<meta property="og:image" content="https://x.example/api/og-image?token=t&amp;x=1">"#));
        assert!(html.contains(r#"property="twitter:image""#));
        assert!(html.contains(r#"<meta name="twitter:card" content="summary_large_image">"#));
    }

    #[test]
    fn invalid_base_url_is_an_error() {
        assert!(og_image_url("not a base", "/api", "t").is_err());
    }
}
