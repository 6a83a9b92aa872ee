use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

/// 预览服务只暴露只读接口
const DEFAULT_METHODS: [Method; 2] = [Method::GET, Method::HEAD];

/// 配置项解析结果：`"*"` 或具体值列表
#[derive(Debug, PartialEq)]
enum Allow<T> {
    Any,
    List(Vec<T>),
}

impl<T> Allow<T> {
    fn is_any(&self) -> bool {
        matches!(self, Allow::Any)
    }
}

/// 解析配置列表：去空白、识别 `"*"`、丢弃无法解析的值（记录告警）
fn parse_list<T>(label: &str, values: &[String], parse: impl Fn(&str) -> Option<T>) -> Allow<T> {
    let mut out = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            return Allow::Any;
        }
        match parse(value) {
            Some(v) => out.push(v),
            None => tracing::warn!("CORS {} 含无效值: {}", label, value),
        }
    }
    Allow::List(out)
}

fn parse_origins(values: &[String]) -> Allow<HeaderValue> {
    parse_list("allowed_origins", values, |v| HeaderValue::from_str(v).ok())
}

fn parse_methods(values: &[String]) -> Allow<Method> {
    match parse_list("allowed_methods", values, |v| {
        Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok()
    }) {
        Allow::List(m) if m.is_empty() => Allow::List(DEFAULT_METHODS.to_vec()),
        other => other,
    }
}

fn parse_headers(label: &str, values: &[String]) -> Allow<HeaderName> {
    parse_list(label, values, |v| {
        HeaderName::from_bytes(v.to_ascii_lowercase().as_bytes()).ok()
    })
}

/// 根据配置构建 CORS 中间件；未启用或配置无效时返回 `None`
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let origins = parse_origins(&cors.allowed_origins);
    if origins == Allow::List(Vec::new()) {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }
    let methods = parse_methods(&cors.allowed_methods);
    let headers = parse_headers("allowed_headers", &cors.allowed_headers);
    let expose = parse_headers("expose_headers", &cors.expose_headers);

    if cors.allow_credentials
        && (origins.is_any() || methods.is_any() || headers.is_any() || expose.is_any())
    {
        tracing::error!("CORS 配置无效：allow_credentials=true 不能与 \"*\" 同时使用，已跳过启用");
        return None;
    }

    let mut layer = CorsLayer::new();
    layer = match origins {
        Allow::Any => layer.allow_origin(Any),
        Allow::List(v) => layer.allow_origin(v),
    };
    layer = match methods {
        Allow::Any => layer.allow_methods(Any),
        Allow::List(v) => layer.allow_methods(v),
    };
    layer = match headers {
        Allow::Any => layer.allow_headers(Any),
        Allow::List(v) if !v.is_empty() => layer.allow_headers(v),
        Allow::List(_) => layer,
    };
    layer = match expose {
        Allow::Any => layer.expose_headers(Any),
        Allow::List(v) if !v.is_empty() => layer.expose_headers(v),
        Allow::List(_) => layer,
    };
    if cors.allow_credentials {
        layer = layer.allow_credentials(true);
    }
    if let Some(secs) = cors.max_age_secs
        && secs > 0
    {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    Some(layer)
}
