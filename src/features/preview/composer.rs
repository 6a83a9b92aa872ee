use super::document::{
    Align, Border, Direction, Edges, Inset, Paint, Position, Radii, Rgba, Shadow,
    Node, TextAlign, VisualDocument, container, image, stop, text,
};
use super::types::{CANVAS_HEIGHT, CANVAS_WIDTH, FontResource, PreviewContent};

const CARD_WIDTH: f32 = 820.0;
const CARD_RADIUS: f32 = 32.0;
const CARD_Z_INDEX: i32 = 10;
const BRAND_Z_INDEX: i32 = 5;

/// 副标题文案
pub fn owner_caption(owner_name: &str) -> String {
    format!("Créée par {owner_name}")
}

/// 组装分享预览图的视觉文档（纯函数，不做任何 IO）。
///
/// 层次自下而上：背景封面 → 青色渐变着色 → 径向暗角 → 玻璃卡片（标题 + 创建者）→ 品牌字样。
/// 标题不做截断，长标题由布局阶段自动换行。
pub fn build_preview_document(content: &PreviewContent, font: &FontResource) -> VisualDocument {
    let background = image(content.background.as_str()).style(|s| {
        s.position = Position::Absolute(Inset::fill());
        s.opacity = 0.32;
    });

    let tint = container().style(|s| {
        s.position = Position::Absolute(Inset::fill());
        s.background = Some(Paint::Linear {
            angle_deg: 180.0,
            stops: vec![
                stop(0.0, Rgba::new(20, 184, 166, 0.45)),
                stop(1.0, Rgba::new(0, 0, 0, 0.55)),
            ],
        });
    });

    let vignette = container().style(|s| {
        s.position = Position::Absolute(Inset::fill());
        s.background = Some(Paint::Radial {
            stops: vec![
                stop(0.0, Rgba::TRANSPARENT),
                stop(0.8, Rgba::new(0, 0, 0, 0.55)),
            ],
        });
    });

    let mut root = container()
        .style(|s| {
            s.width = Some(CANVAS_WIDTH as f32);
            s.height = Some(CANVAS_HEIGHT as f32);
            s.justify = Align::Center;
            s.align = Align::Center;
            s.text.font_family = Some(font.family.clone());
            s.text.font_weight = Some(font.weight);
        })
        .child(background)
        .child(tint)
        .child(vignette)
        .child(glass_card(content));

    if !content.brand_text.trim().is_empty() {
        root = root.child(brand_mark(&content.brand_text));
    }

    VisualDocument {
        width: CANVAS_WIDTH,
        height: CANVAS_HEIGHT,
        root,
    }
}

fn glass_card(content: &PreviewContent) -> Node {
    // 卡片顶部的高光条
    let highlight = container().style(|s| {
        s.position = Position::Absolute(Inset {
            top: Some(0.0),
            left: Some(0.0),
            right: Some(0.0),
            bottom: None,
        });
        s.height = Some(40.0);
        s.radius = Radii::top(CARD_RADIUS);
        s.background = Some(Paint::Linear {
            angle_deg: 180.0,
            stops: vec![
                stop(0.0, Rgba::new(255, 255, 255, 0.33)),
                stop(1.0, Rgba::new(255, 255, 255, 0.0)),
            ],
        });
    });

    let title = text(content.title.clone()).style(|s| {
        s.text.color = Some(Rgba::WHITE);
        s.text.font_size = Some(72.0);
        s.text.font_weight = Some(700);
        s.text.align = Some(TextAlign::Center);
        s.text.line_height = Some(1.2);
        s.text.shadow = Some(Shadow {
            dx: 0.0,
            dy: 4.0,
            blur: 14.0,
            color: Rgba::new(0, 0, 0, 0.45),
        });
    });

    let mut card = container()
        .style(|s| {
            s.width = Some(CARD_WIDTH);
            s.padding = Edges::symmetric(60.0, 40.0);
            s.radius = Radii::all(CARD_RADIUS);
            s.background = Some(Paint::Solid(Rgba::new(255, 255, 255, 0.18)));
            s.border = Some(Border {
                width: 1.0,
                color: Rgba::new(255, 255, 255, 0.22),
            });
            s.box_shadow = Some(Shadow {
                dx: 0.0,
                dy: 12.0,
                blur: 40.0,
                color: Rgba::new(0, 0, 0, 0.35),
            });
            s.direction = Direction::Column;
            s.justify = Align::Center;
            s.align = Align::Center;
            s.gap = 16.0;
            s.z_index = CARD_Z_INDEX;
        })
        .child(highlight)
        .child(title);

    if !content.owner_name.trim().is_empty() {
        card = card.child(text(owner_caption(&content.owner_name)).style(|s| {
            s.text.color = Some(Rgba::new(255, 255, 255, 0.85));
            s.text.font_size = Some(32.0);
            s.text.font_weight = Some(400);
            s.text.align = Some(TextAlign::Center);
            s.text.line_height = Some(1.3);
        }));
    }

    card
}

fn brand_mark(label: &str) -> Node {
    text(label.to_string()).style(|s| {
        s.position = Position::Absolute(Inset {
            top: None,
            left: None,
            right: Some(40.0),
            bottom: Some(32.0),
        });
        s.z_index = BRAND_Z_INDEX;
        s.text.color = Some(Rgba::new(255, 255, 255, 0.7));
        s.text.font_size = Some(28.0);
        s.text.font_weight = Some(700);
        s.text.align = Some(TextAlign::Right);
        s.text.line_height = Some(1.0);
    })
}
