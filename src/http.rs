use reqwest::Client;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::AppError;

/// 构建出站共享的 HTTP Client（统一连接池/Keep-Alive）。
///
/// 元数据查询、封面探测、字体与图片下载共用同一个 `Client`；
/// `Client` 内部为 `Arc`，clone 开销可忽略。
/// 未配置 `timeout_secs` 时不设置超时，上游挂起会一直等待到平台级超时。
pub fn build_client(cfg: &HttpConfig) -> Result<Client, AppError> {
    let mut builder = Client::builder().user_agent(cfg.user_agent.clone());
    if let Some(secs) = cfg.timeout_secs
        && secs > 0
    {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| AppError::Internal(format!("初始化 HTTP Client 失败: {e}")))
}
