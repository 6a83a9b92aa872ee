use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// 请求 ID 头名称
pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    /// 当前异步任务绑定的 request_id，用于错误日志关联。
    static TASK_REQUEST_ID: String;
}

/// 获取当前请求上下文中的 request_id（不在请求上下文中时为 `None`）
pub fn current_request_id() -> Option<String> {
    TASK_REQUEST_ID.try_with(|v| v.clone()).ok()
}

fn is_valid_request_id(v: &str) -> bool {
    !v.is_empty()
        && v.len() <= 128
        && v.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// 边缘网关（如 Vercel 的 `x-vercel-id`）已带 ID 时直接沿用，便于跨层排查
fn resolve_request_id(req: &Request) -> String {
    [REQUEST_ID_HEADER, "x-vercel-id"]
        .iter()
        .filter_map(|name| req.headers().get(*name))
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .find(|v| is_valid_request_id(v))
        .map(str::to_string)
        .unwrap_or_else(|| format!("req_{}", Uuid::new_v4().simple()))
}

/// request_id + 访问日志中间件：
/// 整个请求在带 request_id 的 span 内执行，结束时记录状态码与耗时，并回写 `X-Request-Id`。
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = resolve_request_id(&req);
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );

    let t0 = Instant::now();
    let mut res = TASK_REQUEST_ID
        .scope(request_id.clone(), next.run(req))
        .instrument(span.clone())
        .await;

    span.in_scope(|| {
        tracing::info!(
            status = res.status().as_u16(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "请求完成"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}
