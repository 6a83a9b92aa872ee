use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// 应用统一错误类型
///
/// 错误响应统一为简短的纯文本：
/// - 400/404 直接返回固定文案（例如 `Missing token`、`List not found`）
/// - 其余错误均映射为 500，正文为错误消息本身（为空时返回 `Unknown error`）
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 参数校验错误（缺少必需参数等）
    #[error("{0}")]
    Validation(String),

    /// 上游未找到对应资源
    #[error("{0}")]
    NotFound(String),

    /// 网络请求错误
    #[error("Network error: {0}")]
    Network(String),

    /// JSON 解析错误
    #[error("Invalid JSON: {0}")]
    Json(String),

    /// 字体加载错误
    #[error("Font error: {0}")]
    Font(String),

    /// 图像渲染错误
    #[error("{0}")]
    ImageRendererError(String),

    /// 内部服务器错误
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Network(_)
            | AppError::Json(_)
            | AppError::Font(_)
            | AppError::ImageRendererError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 对外展示的错误正文
    fn public_message(&self) -> String {
        let msg = self.to_string();
        if msg.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            msg
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.public_message();

        if status.is_server_error() {
            tracing::error!(
                request_id = crate::request_id::current_request_id().as_deref(),
                "请求处理失败: {}",
                body
            );
        } else {
            tracing::warn!(
                request_id = crate::request_id::current_request_id().as_deref(),
                status = status.as_u16(),
                "请求被拒绝: {}",
                body
            );
        }

        let mut res = (status, body).into_response();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Json(err.to_string())
    }
}

impl From<std::fmt::Error> for AppError {
    fn from(err: std::fmt::Error) -> Self {
        AppError::ImageRendererError(format!("SVG formatting error: {err}"))
    }
}
