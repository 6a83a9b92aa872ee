use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::Client;
use tokio::sync::OnceCell;

use crate::config::FontConfig;
use crate::error::AppError;

use super::types::FontResource;

/// 进程级字体持有者：首次使用时下载，之后一直复用同一份字节。
///
/// - 并发的首次调用共享同一次下载（single-flight），不会重复请求；
/// - 下载失败不会写入缓存，下一次调用会重新尝试；
/// - 成功后不再失效或刷新。
pub struct FontLoader {
    client: Client,
    cfg: FontConfig,
    cell: OnceCell<Arc<FontResource>>,
    fetches: AtomicUsize,
}

impl FontLoader {
    pub fn new(client: Client, cfg: FontConfig) -> Self {
        Self {
            client,
            cfg,
            cell: OnceCell::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// 获取字体（必要时下载并缓存）
    pub async fn load(&self) -> Result<Arc<FontResource>, AppError> {
        self.cell
            .get_or_try_init(|| async {
                let font = self.fetch().await?;
                tracing::info!(
                    "字体已加载并缓存: family={}, {} 字节",
                    font.family,
                    font.data.len()
                );
                Ok::<_, AppError>(Arc::new(font))
            })
            .await
            .cloned()
    }

    /// 字体是否已缓存
    pub fn is_cached(&self) -> bool {
        self.cell.initialized()
    }

    /// 已发起的字体下载次数（含失败）
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    async fn fetch(&self) -> Result<FontResource, AppError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("开始下载字体: {}", self.cfg.url);

        let resp = self
            .client
            .get(&self.cfg.url)
            .send()
            .await
            .map_err(|e| AppError::Font(format!("请求字体失败: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Font(format!("字体下载返回 HTTP {status}")));
        }
        let data = resp
            .bytes()
            .await
            .map_err(|e| AppError::Font(format!("读取字体数据失败: {e}")))?;
        if data.is_empty() {
            return Err(AppError::Font("字体数据为空".to_string()));
        }

        Ok(FontResource {
            family: self.cfg.family.clone(),
            weight: self.cfg.weight,
            style: self.cfg.style.clone(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::FontLoader;
    use crate::config::FontConfig;

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cfg = FontConfig {
            url: "http://127.0.0.1:1/font.ttf".to_string(),
            ..FontConfig::default()
        };
        let loader = FontLoader::new(reqwest::Client::new(), cfg);

        assert!(loader.load().await.is_err());
        assert!(!loader.is_cached());
        assert!(loader.load().await.is_err());
        assert_eq!(loader.fetch_count(), 2);
    }
}
