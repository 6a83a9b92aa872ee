use reqwest::{Client, Url, header};

use crate::config::MetadataConfig;
use crate::error::AppError;

use super::types::{ListMetadata, PublicListResponse};

/// 列表不存在（或元数据服务不可用）时的固定响应文案
pub const LIST_NOT_FOUND: &str = "List not found";

/// 元数据服务客户端：按 token 查询列表的公开展示信息。
#[derive(Clone)]
pub struct MetadataClient {
    client: Client,
    endpoint: Url,
    anon_key: String,
    default_cover_url: String,
}

impl MetadataClient {
    pub fn new(
        client: Client,
        cfg: &MetadataConfig,
        default_cover_url: impl Into<String>,
    ) -> Result<Self, AppError> {
        let endpoint = public_list_endpoint(&cfg.base_url)?;
        Ok(Self {
            client,
            endpoint,
            anon_key: cfg.anon_key.clone(),
            default_cover_url: default_cover_url.into(),
        })
    }

    /// 实际请求的端点（不含 token 参数）
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// 查询列表元数据。
    ///
    /// 非 2xx 或网络错误统一视为 `NotFound`，调用方应直接返回 404，不再继续渲染。
    /// 不重试，也不设置额外超时。
    pub async fn fetch_list(&self, token: &str) -> Result<ListMetadata, AppError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("token", token);

        let resp = match self
            .client
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.anon_key))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("元数据服务请求失败: {}", e);
                return Err(AppError::NotFound(LIST_NOT_FOUND.to_string()));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            tracing::info!("元数据服务返回非成功状态: {}", status);
            return Err(AppError::NotFound(LIST_NOT_FOUND.to_string()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| AppError::Network(format!("读取元数据响应失败: {e}")))?;
        let parsed: PublicListResponse = serde_json::from_slice(&body)?;

        Ok(ListMetadata::from_public_list(
            parsed.list.unwrap_or_default(),
            &self.default_cover_url,
        ))
    }
}

/// 拼接 `{base_url}/functions/v1/public-list`，容忍 base_url 末尾的 `/`。
pub fn public_list_endpoint(base_url: &str) -> Result<Url, AppError> {
    let base = base_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(AppError::Internal(
            "metadata.base_url 未配置（或 SUPABASE_URL 为空）".to_string(),
        ));
    }
    Url::parse(&format!("{base}/functions/v1/public-list"))
        .map_err(|e| AppError::Internal(format!("metadata.base_url 无效: {e}")))
}

#[cfg(test)]
mod tests {
    use super::public_list_endpoint;

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let a = public_list_endpoint("https://demo.supabase.co/").expect("url");
        let b = public_list_endpoint("https://demo.supabase.co").expect("url");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://demo.supabase.co/functions/v1/public-list");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(public_list_endpoint("  ").is_err());
        assert!(public_list_endpoint("not a url").is_err());
    }
}
