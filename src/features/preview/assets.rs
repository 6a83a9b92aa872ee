use base64::{Engine as _, engine::general_purpose::STANDARD as base64_engine};
use reqwest::{Client, Url, header};

use crate::error::AppError;

use super::types::ResolvedAsset;

/// 轻量探测远程图片是否存在（HEAD）。
///
/// 仅在响应为 2xx 时返回 `true`；网络错误、非成功状态码等一律吞掉并返回 `false`。
/// 注意：HEAD 成功但内容无法解码为图片的情况不在此处拦截。
pub async fn probe_asset(client: &Client, url: &Url) -> bool {
    match client.head(url.clone()).send().await {
        Ok(resp) if resp.status().is_success() => true,
        Ok(resp) => {
            tracing::debug!("封面探测失败: {} -> {}", url, resp.status());
            false
        }
        Err(e) => {
            tracing::debug!("封面探测请求出错: {} -> {}", url, e);
            false
        }
    }
}

/// 只接受 http/https 的绝对地址
fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// 校验封面地址并在不可用时回退到默认图。
///
/// 默认图本身不做探测：它是部署方保证可用的固定资源。
pub async fn resolve_cover(
    client: &Client,
    candidate: &str,
    default_url: &Url,
) -> ResolvedAsset {
    let Some(url) = parse_http_url(candidate) else {
        tracing::debug!("封面地址格式无效，使用默认图: {:?}", candidate);
        return ResolvedAsset(default_url.clone());
    };
    if url == *default_url {
        return ResolvedAsset(url);
    }
    if probe_asset(client, &url).await {
        ResolvedAsset(url)
    } else {
        tracing::info!("封面不可用，回退默认图: {}", url);
        ResolvedAsset(default_url.clone())
    }
}

/// 解析默认封面地址（启动期/构建服务时调用）
pub fn parse_default_cover(raw: &str) -> Result<Url, AppError> {
    parse_http_url(raw)
        .ok_or_else(|| AppError::Internal(format!("preview.default_cover_url 无效: {raw}")))
}

/// 下载远程图片并编码为 Data URI，供 SVG 内嵌。
///
/// MIME 优先取响应头 `Content-Type`（仅 `image/*`），否则根据文件头嗅探。
/// 响应体超过 `max_bytes` 时中止读取并返回错误。
pub async fn fetch_image_data_uri(
    client: &Client,
    url: &str,
    max_bytes: usize,
) -> Result<String, AppError> {
    let mut resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::ImageRendererError(format!("下载图片失败 {url}: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AppError::ImageRendererError(format!(
            "下载图片失败 {url}: HTTP {status}"
        )));
    }
    if let Some(len) = resp.content_length()
        && len > max_bytes as u64
    {
        return Err(AppError::ImageRendererError(format!(
            "图片过大 {url}: {len} > {max_bytes} 字节"
        )));
    }
    let declared = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|v| v.starts_with("image/"));

    // Content-Length 可能缺失或不可信，按块累计
    let mut bytes = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| AppError::ImageRendererError(format!("读取图片失败 {url}: {e}")))?
    {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(AppError::ImageRendererError(format!(
                "图片过大 {url}: 超过 {max_bytes} 字节"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    let mime = declared.unwrap_or_else(|| sniff_mime(&bytes).to_string());
    Ok(encode_data_uri(&mime, &bytes))
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Gif) => "image/gif",
        _ => "application/octet-stream",
    }
}

fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    let b64 = base64_engine.encode(bytes);
    format!("data:{mime};base64,{b64}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_urls_are_accepted() {
        assert!(parse_http_url("https://example.com/a.png").is_some());
        assert!(parse_http_url("  http://example.com/a.png ").is_some());
        assert!(parse_http_url("ftp://example.com/a.png").is_none());
        assert!(parse_http_url("javascript:alert(1)").is_none());
        assert!(parse_http_url("/relative.png").is_none());
    }

    #[test]
    fn sniffs_png_signature() {
        let png_sig = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(sniff_mime(&png_sig), "image/png");
        assert_eq!(sniff_mime(b"not an image"), "application/octet-stream");
    }

    #[tokio::test]
    async fn malformed_candidate_falls_back_without_network() {
        let client = Client::new();
        let default = parse_default_cover("https://cdn.example/default.png").expect("url");
        let resolved = resolve_cover(&client, "not a url", &default).await;
        assert_eq!(resolved.as_str(), "https://cdn.example/default.png");
    }

    #[tokio::test]
    async fn unreachable_host_is_reported_as_missing() {
        let client = Client::new();
        // 端口 1 基本不会有服务监听，连接被拒绝 -> false
        let url = Url::parse("http://127.0.0.1:1/cover.jpg").expect("url");
        assert!(!probe_asset(&client, &url).await);
    }
}
