use std::sync::Arc;
use std::time::Instant;

use reqwest::{Client, Url};
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::error::AppError;

use super::assets::{parse_default_cover, resolve_cover};
use super::composer::build_preview_document;
use super::document::VisualDocument;
use super::font::FontLoader;
use super::metadata::MetadataClient;
use super::renderer::{FontBook, RenderSettings, embed_images, render_document};
use super::types::{FontResource, OutputImage, PreviewContent};

/// 分享预览图生成服务。
///
/// 每次请求都会重新查询元数据并探测封面；只有字体在进程内缓存。
pub struct PreviewService {
    client: Client,
    metadata: MetadataClient,
    fonts: Arc<FontLoader>,
    font_book: Arc<FontBook>,
    default_cover: Url,
    max_image_bytes: usize,
    brand_text: String,
    settings: RenderSettings,
    render_semaphore: Arc<Semaphore>,
}

impl PreviewService {
    pub fn new(client: Client, cfg: &AppConfig) -> Result<Self, AppError> {
        let default_cover = parse_default_cover(&cfg.preview.default_cover_url)?;
        let metadata = MetadataClient::new(client.clone(), &cfg.metadata, default_cover.as_str())?;
        let permits = cfg.image.effective_parallelism();
        tracing::info!("渲染并发上限: {}", permits);

        Ok(Self {
            fonts: Arc::new(FontLoader::new(client.clone(), cfg.font.clone())),
            font_book: Arc::new(FontBook::new(cfg.image.load_system_fonts)),
            client,
            metadata,
            default_cover,
            max_image_bytes: cfg.preview.max_image_bytes,
            brand_text: cfg.branding.footer_text.clone(),
            settings: RenderSettings::from(&cfg.image),
            render_semaphore: Arc::new(Semaphore::new(permits)),
        })
    }

    pub fn font_loader(&self) -> &FontLoader {
        &self.fonts
    }

    pub fn metadata(&self) -> &MetadataClient {
        &self.metadata
    }

    /// 查询元数据并组装视觉文档（不做栅格化）。
    ///
    /// 元数据查询失败直接返回；封面探测与字体加载并发进行。
    pub async fn build_document(
        &self,
        token: &str,
    ) -> Result<(VisualDocument, Arc<FontResource>), AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Validation("Missing token".to_string()));
        }

        let list = self.metadata.fetch_list(token).await?;
        let (background, font) = tokio::join!(
            resolve_cover(&self.client, &list.cover_url, &self.default_cover),
            self.fonts.load()
        );
        let font = font?;

        let content = PreviewContent {
            title: list.title,
            owner_name: list.owner_name,
            background,
            brand_text: self.brand_text.clone(),
        };
        let doc = build_preview_document(&content, &font);
        Ok((doc, font))
    }

    /// 按 token 生成预览图。
    ///
    /// 流程：元数据查询 → 并发（封面探测 + 字体加载）→ 组装文档 → 内嵌图片 → 栅格化。
    /// 元数据、字体与渲染失败直接返回；图片下载失败在内嵌阶段回退，不影响出图。
    pub async fn render(&self, token: &str) -> Result<OutputImage, AppError> {
        let t0 = Instant::now();
        let (doc, font) = self.build_document(token).await?;
        let t_doc = t0.elapsed();

        let images =
            embed_images(&self.client, &doc, &self.default_cover, self.max_image_bytes).await;
        let t_embed = t0.elapsed();

        let sem = self.render_semaphore.clone();
        let permits_avail = sem.available_permits();
        let _permit = sem
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("获取渲染信号量失败: {e}")))?;
        let t_permit = t0.elapsed();

        let font_book = self.font_book.clone();
        let settings = self.settings;
        let image = tokio::task::spawn_blocking(move || {
            render_document(&doc, &images, &font, &font_book, settings)
        })
        .await
        .map_err(|e| AppError::Internal(format!("阻塞渲染任务执行失败: {e}")))??;
        let t_done = t0.elapsed();

        tracing::info!(
            target: "og_image_performance",
            "预览图生成完成: 文档={:?}, 内嵌图片={:?}, 等待许可={:?}(可用 {}), 渲染={:?}, 总计={:?}, {} 字节",
            t_doc,
            t_embed - t_doc,
            t_permit - t_embed,
            permits_avail,
            t_done - t_permit,
            t_done,
            image.bytes.len()
        );

        Ok(image)
    }
}
