//! 视觉文档 → SVG → PNG。
//!
//! 文档先经 [`super::layout`] 算出每个盒子的绝对坐标，再序列化为 SVG，
//! 最后交给 resvg 栅格化并用 png crate 编码。远程图片必须提前内嵌为 Data URI，
//! usvg 不会自行发起网络请求。

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::body::Bytes;
use reqwest::{Client, Url};
use resvg::usvg::{self, Options as UsvgOptions, fontdb};
use resvg::{
    render,
    tiny_skia::{Pixmap, Transform},
};

use crate::config::ImageRenderConfig;
use crate::error::AppError;

use super::assets::fetch_image_data_uri;
use super::document::{
    Edges, NodeKind, Paint, Radii, Rgba, Shadow, TextAlign, VisualDocument,
};
use super::layout::{LayoutBox, Rect, layout};
use super::types::{FontResource, OutputImage};

/// 基线相对行框顶部的位置（按字号的倍数估算 ascent）
const ASCENT_EM: f32 = 0.8;

// 系统字体数据库单例（扫描一次，之后按需克隆）
static SYSTEM_FONT_DB: OnceLock<Arc<fontdb::Database>> = OnceLock::new();

fn system_font_db() -> Arc<fontdb::Database> {
    SYSTEM_FONT_DB
        .get_or_init(|| {
            let t0 = Instant::now();
            let mut db = fontdb::Database::new();
            db.load_system_fonts();
            tracing::info!("系统字体加载完成: {} 个字形, 耗时 {:?}", db.len(), t0.elapsed());
            Arc::new(db)
        })
        .clone()
}

/// 栅格化参数
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub optimize_speed: bool,
    pub load_system_fonts: bool,
    /// 输出宽度（按宽度等比缩放），`None` 表示使用画布原始宽度
    pub fit_width: Option<u32>,
}

impl From<&ImageRenderConfig> for RenderSettings {
    fn from(cfg: &ImageRenderConfig) -> Self {
        Self {
            optimize_speed: cfg.optimize_speed,
            load_system_fonts: cfg.load_system_fonts,
            fit_width: None,
        }
    }
}

/// 渲染用字体库：系统字体（可选）+ 下载的品牌字体，首次使用时构建一次。
pub struct FontBook {
    load_system_fonts: bool,
    db: OnceLock<Arc<fontdb::Database>>,
}

impl FontBook {
    pub fn new(load_system_fonts: bool) -> Self {
        Self {
            load_system_fonts,
            db: OnceLock::new(),
        }
    }

    /// 获取字体库。会阻塞（扫描系统字体目录），只应在阻塞线程中调用。
    pub fn database(&self, font: &FontResource) -> Arc<fontdb::Database> {
        self.db
            .get_or_init(|| {
                let mut db = if self.load_system_fonts {
                    (*system_font_db()).clone()
                } else {
                    fontdb::Database::new()
                };
                let before = db.len();
                db.load_font_data(font.data.to_vec());
                if db.len() == before {
                    tracing::warn!(
                        "字体数据未解析出任何字形（family={}），文本将使用回退字体",
                        font.family
                    );
                }
                Arc::new(db)
            })
            .clone()
    }
}

// ---------------- 图片内嵌 ----------------

/// 下载文档引用的全部远程图片，返回 `src -> Data URI` 映射。
///
/// 已是 `data:` 的地址原样保留。下载失败（含超出大小上限）时改用默认封面；
/// 默认封面也取不到时不写入映射，渲染时省略该图片，其余图层照常绘制。
pub async fn embed_images(
    client: &Client,
    doc: &VisualDocument,
    fallback: &Url,
    max_bytes: usize,
) -> HashMap<String, String> {
    let mut out = HashMap::new();
    // 默认封面最多下载一次
    let mut fallback_uri: Option<Option<String>> = None;

    for src in doc.image_sources() {
        if src.starts_with("data:") {
            out.insert(src.to_string(), src.to_string());
            continue;
        }
        let uri = match fetch_image_data_uri(client, src, max_bytes).await {
            Ok(uri) => Some(uri),
            Err(e) => {
                tracing::warn!("图片内嵌失败: {e}");
                if fallback_uri.is_none() {
                    let fetched = if src == fallback.as_str() {
                        None
                    } else {
                        match fetch_image_data_uri(client, fallback.as_str(), max_bytes).await {
                            Ok(uri) => Some(uri),
                            Err(e) => {
                                tracing::warn!("默认封面内嵌失败，省略背景图: {e}");
                                None
                            }
                        }
                    };
                    fallback_uri = Some(fetched);
                }
                fallback_uri.clone().flatten()
            }
        };
        if let Some(uri) = uri {
            out.insert(src.to_string(), uri);
        }
    }
    out
}

// ---------------- SVG 序列化 ----------------

struct SvgWriter<'a> {
    defs: String,
    body: String,
    next_id: usize,
    images: &'a HashMap<String, String>,
}

impl SvgWriter<'_> {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }
}

/// 把布局后的文档序列化为 SVG 字符串
pub fn document_to_svg(
    doc: &VisualDocument,
    images: &HashMap<String, String>,
) -> Result<String, AppError> {
    let root = layout(doc);
    let mut w = SvgWriter {
        defs: String::new(),
        body: String::new(),
        next_id: 0,
        images,
    };
    write_box(&mut w, &root)?;

    let mut svg = String::with_capacity(w.defs.len() + w.body.len() + 256);
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{0}" height="{1}" viewBox="0 0 {0} {1}">"#,
        doc.width, doc.height
    )?;
    if !w.defs.is_empty() {
        writeln!(svg, "<defs>{}</defs>", w.defs)?;
    }
    svg.push_str(&w.body);
    svg.push_str("</svg>");
    Ok(svg)
}

fn write_box(w: &mut SvgWriter<'_>, b: &LayoutBox<'_>) -> Result<(), AppError> {
    let style = &b.node.style;
    let r = b.rect;

    let mut group_attrs = String::new();
    if style.opacity < 1.0 {
        write!(group_attrs, r#" opacity="{}""#, style.opacity.clamp(0.0, 1.0))?;
    }
    let grouped = !group_attrs.is_empty();
    if grouped {
        writeln!(w.body, "<g{group_attrs}>")?;
    }

    let has_surface = style.background.is_some() || style.border.is_some();
    if let Some(shadow) = style.box_shadow.filter(|_| has_surface) {
        write_box_shadow(w, r, &style.radius, &shadow)?;
    }

    if let Some(paint) = &style.background {
        let fill = paint_attr(w, paint, r)?;
        writeln!(w.body, "{}", shape(r, &style.radius, &fill))?;
    }

    if let Some(border) = style.border.filter(|b| b.width > 0.0) {
        let half = border.width / 2.0;
        let inner = Rect {
            x: r.x + half,
            y: r.y + half,
            w: (r.w - border.width).max(0.0),
            h: (r.h - border.width).max(0.0),
        };
        let stroke = format!(
            r#"fill="none" stroke="{}" stroke-opacity="{}" stroke-width="{}""#,
            border.color.rgb(),
            border.color.alpha(),
            border.width
        );
        writeln!(w.body, "{}", shape(inner, &shrink(&style.radius, half), &stroke))?;
    }

    match &b.node.kind {
        NodeKind::Text(_) => write_text(w, b)?,
        NodeKind::Image { src } => write_image(w, r, &style.radius, src)?,
        NodeKind::Container => {}
    }

    // z-index 相同时保持文档顺序（sort_by_key 为稳定排序）
    let mut ordered: Vec<&LayoutBox<'_>> = b.children.iter().collect();
    ordered.sort_by_key(|c| c.node.style.z_index);
    for child in ordered {
        write_box(w, child)?;
    }

    if grouped {
        writeln!(w.body, "</g>")?;
    }
    Ok(())
}

fn write_box_shadow(
    w: &mut SvgWriter<'_>,
    r: Rect,
    radius: &Radii,
    shadow: &Shadow,
) -> Result<(), AppError> {
    let id = w.id("shadow");
    write!(
        w.defs,
        r#"<filter id="{id}" x="-50%" y="-50%" width="200%" height="200%"><feGaussianBlur stdDeviation="{}"/></filter>"#,
        shadow.blur / 2.0
    )?;
    let fill = format!(
        r#"fill="{}" fill-opacity="{}" transform="translate({} {})" filter="url(#{id})""#,
        shadow.color.rgb(),
        shadow.color.alpha(),
        shadow.dx,
        shadow.dy
    );
    writeln!(w.body, "{}", shape(r, radius, &fill))?;
    Ok(())
}

fn write_stops(out: &mut String, stops: &[super::document::GradientStop]) -> Result<(), AppError> {
    for s in stops {
        write!(
            out,
            r#"<stop offset="{}" stop-color="{}" stop-opacity="{}"/>"#,
            s.offset.clamp(0.0, 1.0),
            s.color.rgb(),
            s.color.alpha()
        )?;
    }
    Ok(())
}

/// 生成填充属性；渐变会写入 `<defs>`
fn paint_attr(w: &mut SvgWriter<'_>, paint: &Paint, r: Rect) -> Result<String, AppError> {
    match paint {
        Paint::Solid(c) => Ok(solid_fill(c)),
        Paint::Linear { angle_deg, stops } => {
            let id = w.id("lg");
            // CSS 角度：0deg 向上，顺时针
            let rad = angle_deg.to_radians();
            let (dx, dy) = (rad.sin() / 2.0, -rad.cos() / 2.0);
            write!(
                w.defs,
                r#"<linearGradient id="{id}" x1="{}" y1="{}" x2="{}" y2="{}">"#,
                0.5 - dx,
                0.5 - dy,
                0.5 + dx,
                0.5 + dy
            )?;
            write_stops(&mut w.defs, stops)?;
            w.defs.push_str("</linearGradient>");
            Ok(format!(r#"fill="url(#{id})""#))
        }
        Paint::Radial { stops } => {
            let id = w.id("rg");
            // farthest-corner：半径为半对角线
            let radius = (r.w * r.w + r.h * r.h).sqrt() / 2.0;
            write!(
                w.defs,
                r#"<radialGradient id="{id}" gradientUnits="userSpaceOnUse" cx="{}" cy="{}" r="{}">"#,
                r.x + r.w / 2.0,
                r.y + r.h / 2.0,
                radius
            )?;
            write_stops(&mut w.defs, stops)?;
            w.defs.push_str("</radialGradient>");
            Ok(format!(r#"fill="url(#{id})""#))
        }
    }
}

fn solid_fill(c: &Rgba) -> String {
    format!(r#"fill="{}" fill-opacity="{}""#, c.rgb(), c.alpha())
}

fn shrink(radius: &Radii, by: f32) -> Radii {
    Radii {
        top_left: (radius.top_left - by).max(0.0),
        top_right: (radius.top_right - by).max(0.0),
        bottom_right: (radius.bottom_right - by).max(0.0),
        bottom_left: (radius.bottom_left - by).max(0.0),
    }
}

/// 矩形 / 圆角矩形 / 非均匀圆角路径
fn shape(r: Rect, radius: &Radii, attrs: &str) -> String {
    if radius.is_zero() {
        format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" {attrs}/>"#,
            r.x, r.y, r.w, r.h
        )
    } else if radius.is_uniform() {
        let rr = radius.top_left.min(r.w / 2.0).min(r.h / 2.0);
        format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" rx="{rr}" ry="{rr}" {attrs}/>"#,
            r.x, r.y, r.w, r.h
        )
    } else {
        format!(r#"<path d="{}" {attrs}/>"#, rounded_path(r, radius))
    }
}

fn rounded_path(r: Rect, radius: &Radii) -> String {
    let cap = |v: f32| v.min(r.w / 2.0).min(r.h / 2.0).max(0.0);
    let (tl, tr, br, bl) = (
        cap(radius.top_left),
        cap(radius.top_right),
        cap(radius.bottom_right),
        cap(radius.bottom_left),
    );
    let (x0, y0, x1, y1) = (r.x, r.y, r.x + r.w, r.y + r.h);
    format!(
        "M{} {y0} H{} A{tr} {tr} 0 0 1 {x1} {} V{} A{br} {br} 0 0 1 {} {y1} H{} A{bl} {bl} 0 0 1 {x0} {} V{} A{tl} {tl} 0 0 1 {} {y0} Z",
        x0 + tl,
        x1 - tr,
        y0 + tr,
        y1 - br,
        x1 - br,
        x0 + bl,
        y1 - bl,
        y0 + tl,
        x0 + tl,
    )
}

fn write_text(w: &mut SvgWriter<'_>, b: &LayoutBox<'_>) -> Result<(), AppError> {
    let t = &b.text;
    let pad: Edges = b.node.style.padding;
    let content_x = b.rect.x + pad.left;
    let content_w = (b.rect.w - pad.horizontal()).max(0.0);
    let (x, anchor) = match t.align {
        TextAlign::Left => (content_x, "start"),
        TextAlign::Center => (content_x + content_w / 2.0, "middle"),
        TextAlign::Right => (content_x + content_w, "end"),
    };

    let mut attrs = format!(
        r#" font-size="{}" font-weight="{}" text-anchor="{anchor}" {}"#,
        t.font_size,
        t.font_weight,
        solid_fill(&t.color)
    );
    if let Some(family) = &t.font_family {
        write!(attrs, r#" font-family="{}, sans-serif""#, escape_xml(family))?;
    }
    if let Some(s) = t.shadow {
        let id = w.id("ts");
        write!(
            w.defs,
            r#"<filter id="{id}" x="-20%" y="-50%" width="140%" height="200%"><feDropShadow dx="{}" dy="{}" stdDeviation="{}" flood-color="{}" flood-opacity="{}"/></filter>"#,
            s.dx,
            s.dy,
            s.blur / 2.0,
            s.color.rgb(),
            s.color.alpha()
        )?;
        write!(attrs, r#" filter="url(#{id})""#)?;
    }

    writeln!(w.body, "<g{attrs}>")?;
    let line_px = t.line_px();
    let top = b.rect.y + pad.top;
    for (i, line) in b.lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let baseline =
            top + i as f32 * line_px + (line_px - t.font_size) / 2.0 + t.font_size * ASCENT_EM;
        writeln!(
            w.body,
            r#"<text x="{x}" y="{baseline}">{}</text>"#,
            escape_xml(line)
        )?;
    }
    writeln!(w.body, "</g>")?;
    Ok(())
}

fn write_image(
    w: &mut SvgWriter<'_>,
    r: Rect,
    radius: &Radii,
    src: &str,
) -> Result<(), AppError> {
    // 未能内嵌的图片直接省略（usvg 不会请求远程地址）
    let images = w.images;
    let Some(href) = images.get(src) else {
        tracing::debug!("图片未内嵌，跳过: {}", src);
        return Ok(());
    };
    let clip = w.id("clip");
    write!(
        w.defs,
        r#"<clipPath id="{clip}">{}</clipPath>"#,
        shape(r, radius, "")
    )?;
    writeln!(
        w.body,
        r#"<image x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="xMidYMid slice" clip-path="url(#{clip})" xlink:href="{}"/>"#,
        r.x,
        r.y,
        r.w,
        r.h,
        escape_xml(href)
    )?;
    Ok(())
}

/// XML 1.0 允许出现的字符（Char 产生式）
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
        || ('\u{20}'..='\u{D7FF}').contains(&c)
        || ('\u{E000}'..='\u{FFFD}').contains(&c)
        || c >= '\u{10000}'
}

/// 转义 XML 特殊字符，并丢弃 XML 不允许的控制字符
fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
    }
    out
}

// ---------------- 栅格化 ----------------

/// 把 SVG 栅格化为 PNG
pub fn rasterize_svg(
    svg: &str,
    font_db: Arc<fontdb::Database>,
    font_family: &str,
    settings: RenderSettings,
) -> Result<OutputImage, AppError> {
    let t0 = Instant::now();
    let speed = settings.optimize_speed;
    let opts = UsvgOptions {
        fontdb: font_db,
        font_family: font_family.to_string(),
        languages: vec!["fr".to_string(), "en".to_string()],
        shape_rendering: if speed {
            usvg::ShapeRendering::OptimizeSpeed
        } else {
            usvg::ShapeRendering::GeometricPrecision
        },
        text_rendering: if speed {
            usvg::TextRendering::OptimizeSpeed
        } else {
            usvg::TextRendering::OptimizeLegibility
        },
        image_rendering: if speed {
            usvg::ImageRendering::OptimizeSpeed
        } else {
            usvg::ImageRendering::OptimizeQuality
        },
        ..Default::default()
    };

    let tree = usvg::Tree::from_data(svg.as_bytes(), &opts)
        .map_err(|e| AppError::ImageRendererError(format!("Failed to parse SVG: {e}")))?;
    let t_parse = t0.elapsed();

    let size = tree.size();
    let target_w = settings
        .fit_width
        .filter(|w| *w > 0)
        .unwrap_or_else(|| size.width().round() as u32);
    let scale = target_w as f32 / size.width();
    let target_h = (size.height() * scale).round().max(1.0) as u32;

    let mut pixmap = Pixmap::new(target_w, target_h)
        .ok_or_else(|| AppError::ImageRendererError("Failed to create pixmap".to_string()))?;
    render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());
    let t_raster = t0.elapsed();

    let bytes = encode_png(&pixmap, speed)?;
    let t_encode = t0.elapsed();

    tracing::info!(
        target: "og_image_performance",
        "PNG渲染内部分段: 解析={:?}, 栅格化={:?}, 编码={:?}, 总计={:?}",
        t_parse,
        t_raster - t_parse,
        t_encode - t_raster,
        t_encode
    );

    Ok(OutputImage {
        bytes: Bytes::from(bytes),
        width: target_w,
        height: target_h,
    })
}

fn encode_png(pixmap: &Pixmap, speed: bool) -> Result<Vec<u8>, AppError> {
    let (w, h) = (pixmap.width(), pixmap.height());
    let mut out = Vec::with_capacity((w * h) as usize);
    {
        let mut encoder = png::Encoder::new(&mut out, w, h);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if speed {
            encoder.set_compression(png::Compression::Fast);
            encoder.set_filter(png::FilterType::NoFilter);
        } else {
            encoder.set_compression(png::Compression::Default);
            encoder.set_filter(png::FilterType::Paeth);
        }
        // tiny-skia 内部为预乘 alpha，PNG 需要直通 alpha
        let straight: Vec<u8> = pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();
        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::ImageRendererError(format!("PNG write_header error: {e}")))?;
        writer.write_image_data(&straight).map_err(|e| {
            AppError::ImageRendererError(format!("PNG write_image_data error: {e}"))
        })?;
        writer
            .finish()
            .map_err(|e| AppError::ImageRendererError(format!("PNG finish error: {e}")))?;
    }
    Ok(out)
}

/// 同步渲染入口：布局 + SVG 序列化 + 栅格化。CPU 密集，须在阻塞线程中调用。
pub fn render_document(
    doc: &VisualDocument,
    images: &HashMap<String, String>,
    font: &FontResource,
    fonts: &FontBook,
    settings: RenderSettings,
) -> Result<OutputImage, AppError> {
    let t0 = Instant::now();
    let svg = document_to_svg(doc, images)?;
    tracing::debug!(
        target: "og_image_performance",
        "SVG生成完成，大小: {} 字符, 耗时: {:?}",
        svg.len(),
        t0.elapsed()
    );
    rasterize_svg(&svg, fonts.database(font), &font.family, settings)
}
