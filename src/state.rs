use reqwest::Client;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::preview::PreviewService;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 预览图生成服务（内含字体缓存与渲染信号量）
    pub preview: Arc<PreviewService>,
    /// 业务接口前缀（用于拼接对外的 og-image 地址）
    pub api_prefix: String,
    /// 对外访问的站点根地址
    pub public_base_url: String,
    /// 预览图响应的 `Cache-Control: max-age`
    pub cache_max_age_secs: u64,
}

impl AppState {
    pub fn new(client: Client, config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            preview: Arc::new(PreviewService::new(client, config)?),
            api_prefix: config.api.prefix.clone(),
            public_base_url: config.preview.public_base_url.clone(),
            cache_max_age_secs: config.preview.cache_max_age_secs,
        })
    }
}
