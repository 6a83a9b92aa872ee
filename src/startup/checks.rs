use reqwest::Url;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::preview::{PreviewService, og_image_url, public_list_endpoint};

/// 执行启动检查
///
/// 1. 校验元数据服务地址与对外地址（无效则拒绝启动）
/// 2. 检查匿名密钥（为空仅告警）
/// 3. 按配置预热字体（失败仅告警，首个请求会再次尝试）
pub async fn run_startup_checks(config: &AppConfig, preview: &PreviewService) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    check_urls(config)?;

    if config.metadata.anon_key.trim().is_empty() {
        tracing::warn!("⚠️ metadata.anon_key 为空，元数据服务可能拒绝请求");
    }

    if config.font.prewarm {
        let t0 = std::time::Instant::now();
        match preview.font_loader().load().await {
            Ok(font) => tracing::info!(
                "✅ 字体预热完成: {} ({} 字节), 耗时 {}ms",
                font.family,
                font.data.len(),
                t0.elapsed().as_millis()
            ),
            Err(e) => tracing::warn!("⚠️ 字体预热失败（将在首个请求时重试）: {}", e),
        }
    }

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

fn check_urls(config: &AppConfig) -> Result<(), AppError> {
    let endpoint = public_list_endpoint(&config.metadata.base_url)?;
    tracing::info!("✅ 元数据端点: {}", endpoint);

    let sample = og_image_url(&config.preview.public_base_url, &config.api.prefix, "token")?;
    tracing::info!("✅ 预览图对外地址示例: {}", sample);

    Url::parse(&config.font.url)
        .map_err(|e| AppError::Internal(format!("font.url 无效: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::check_urls;
    use crate::config::AppConfig;

    #[test]
    fn rejects_missing_metadata_base_url() {
        let cfg = AppConfig::default();
        assert!(check_urls(&cfg).is_err());
    }

    #[test]
    fn accepts_complete_config() {
        let mut cfg = AppConfig::default();
        cfg.metadata.base_url = "https://demo.supabase.co".to_string();
        assert!(check_urls(&cfg).is_ok());
    }
}
