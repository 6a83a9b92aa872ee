//! 文档布局：把 [`VisualDocument`] 转成带绝对坐标的盒子树。
//!
//! 只实现文档实际用到的 flexbox 子集：
//! - 绝对定位（inset 四边 + 可选宽高）
//! - 行/列方向的流式排列，主轴 `justify`、交叉轴 `align`、`gap`、`padding`
//! - 文本按估算字宽贪心换行（全角字符按两倍宽度计）
//!
//! 内容溢出时不缩放、不截断，超出画布的部分由画布本身裁掉。

use unicode_width::UnicodeWidthChar;

use super::document::{
    Align, Direction, Inset, Node, NodeKind, Position, Rgba, Shadow, TextAlign, TextStyle,
    VisualDocument,
};

const DEFAULT_FONT_SIZE: f32 = 16.0;
const DEFAULT_LINE_HEIGHT: f32 = 1.2;
const DEFAULT_FONT_WEIGHT: u16 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// 继承计算后的文本样式
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedText {
    pub color: Rgba,
    pub font_size: f32,
    pub font_weight: u16,
    pub font_family: Option<String>,
    pub line_height: f32,
    pub align: TextAlign,
    pub shadow: Option<Shadow>,
}

impl Default for ComputedText {
    fn default() -> Self {
        Self {
            color: Rgba::BLACK,
            font_size: DEFAULT_FONT_SIZE,
            font_weight: DEFAULT_FONT_WEIGHT,
            font_family: None,
            line_height: DEFAULT_LINE_HEIGHT,
            align: TextAlign::Left,
            shadow: None,
        }
    }
}

impl ComputedText {
    fn inherit(&self, own: &TextStyle) -> Self {
        Self {
            color: own.color.unwrap_or(self.color),
            font_size: own.font_size.unwrap_or(self.font_size),
            font_weight: own.font_weight.unwrap_or(self.font_weight),
            font_family: own
                .font_family
                .clone()
                .or_else(|| self.font_family.clone()),
            line_height: own.line_height.unwrap_or(self.line_height),
            align: own.align.unwrap_or(self.align),
            // text-shadow 同样可继承
            shadow: own.shadow.or(self.shadow),
        }
    }

    /// 单行行高（像素）
    pub fn line_px(&self) -> f32 {
        self.font_size * self.line_height
    }
}

/// 布局结果
#[derive(Debug, Clone)]
pub struct LayoutBox<'a> {
    pub node: &'a Node,
    pub rect: Rect,
    pub text: ComputedText,
    /// 文本节点换行后的各行（其他节点为空）
    pub lines: Vec<String>,
    pub children: Vec<LayoutBox<'a>>,
}

/// 对整份文档布局，根节点固定占满画布
pub fn layout(doc: &VisualDocument) -> LayoutBox<'_> {
    let canvas = Rect {
        x: 0.0,
        y: 0.0,
        w: doc.width as f32,
        h: doc.height as f32,
    };
    arrange(&doc.root, canvas, &ComputedText::default())
}

// ---------------- 文本测量 ----------------

/// 估算单个字符的前进宽度（单位：字号的倍数）
fn char_advance_em(ch: char) -> f32 {
    match UnicodeWidthChar::width(ch) {
        Some(0) | None => 0.0,
        Some(2) => 1.0,
        _ => match ch {
            ' ' => 0.28,
            'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' | 'I' => 0.3,
            'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '-' => 0.38,
            'm' | 'w' | 'M' | 'W' => 0.85,
            c if c.is_uppercase() => 0.68,
            c if c.is_ascii_digit() => 0.6,
            _ => 0.56,
        },
    }
}

/// 估算一段文本在给定字号/字重下的渲染宽度
pub fn measure_text(text: &str, font_size: f32, font_weight: u16) -> f32 {
    let bold = if font_weight >= 600 { 1.06 } else { 1.0 };
    text.chars().map(char_advance_em).sum::<f32>() * font_size * bold
}

/// 按最大宽度贪心换行：优先在空白处断行，单词本身超宽时按字符断开。
pub fn wrap_text(text: &str, max_width: f32, font_size: f32, font_weight: u16) -> Vec<String> {
    let measure = |s: &str| measure_text(s, font_size, font_weight);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if measure(&candidate) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if measure(word) <= max_width {
                current = word.to_string();
                continue;
            }
            // 超长单词：逐字符切分
            for ch in word.chars() {
                let mut next = current.clone();
                next.push(ch);
                if measure(&next) > max_width && !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current.push(ch);
                } else {
                    current = next;
                }
            }
        }
        lines.push(current);
    }

    // 去掉首尾的空行（但至少保留一行，保证高度稳定）
    while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

// ---------------- 盒子测量 ----------------

fn is_flow(node: &Node) -> bool {
    matches!(node.style.position, Position::Flow)
}

/// 计算节点在给定可用宽度下的外框尺寸（宽，高）
fn measure(node: &Node, avail_w: f32, parent: &ComputedText) -> (f32, f32) {
    let style = &node.style;
    let text = parent.inherit(&style.text);
    let pad = style.padding;
    let inner_max = (style.width.unwrap_or(avail_w) - pad.horizontal()).max(0.0);

    let (content_w, content_h) = match &node.kind {
        NodeKind::Text(s) => {
            let lines = wrap_text(s, inner_max, text.font_size, text.font_weight);
            let w = lines
                .iter()
                .map(|l| measure_text(l, text.font_size, text.font_weight))
                .fold(0.0_f32, f32::max);
            (w, lines.len() as f32 * text.line_px())
        }
        NodeKind::Image { .. } => (0.0, 0.0),
        NodeKind::Container => {
            let sizes: Vec<(f32, f32)> = node
                .children
                .iter()
                .filter(|c| is_flow(c))
                .map(|c| measure(c, inner_max, &text))
                .collect();
            let gaps = style.gap * sizes.len().saturating_sub(1) as f32;
            match style.direction {
                Direction::Column => (
                    sizes.iter().map(|s| s.0).fold(0.0, f32::max),
                    sizes.iter().map(|s| s.1).sum::<f32>() + gaps,
                ),
                Direction::Row => (
                    sizes.iter().map(|s| s.0).sum::<f32>() + gaps,
                    sizes.iter().map(|s| s.1).fold(0.0, f32::max),
                ),
            }
        }
    };

    (
        style.width.unwrap_or(content_w + pad.horizontal()),
        style.height.unwrap_or(content_h + pad.vertical()),
    )
}

/// 单轴绝对定位求解：返回（相对父盒的起点，长度）
fn resolve_axis(
    start: Option<f32>,
    end: Option<f32>,
    size: Option<f32>,
    total: f32,
    measured: f32,
) -> (f32, f32) {
    match (start, end, size) {
        (Some(s), Some(e), None) => (s, (total - s - e).max(0.0)),
        (Some(s), _, Some(z)) => (s, z),
        (None, Some(e), Some(z)) => (total - e - z, z),
        (Some(s), None, None) => (s, measured),
        (None, Some(e), None) => (total - e - measured, measured),
        (None, None, z) => (0.0, z.unwrap_or(measured)),
    }
}

fn absolute_rect(node: &Node, inset: &Inset, parent: Rect, text: &ComputedText) -> Rect {
    let (mw, mh) = measure(node, parent.w, text);
    let (x, w) = resolve_axis(inset.left, inset.right, node.style.width, parent.w, mw);
    let (y, h) = resolve_axis(inset.top, inset.bottom, node.style.height, parent.h, mh);
    Rect {
        x: parent.x + x,
        y: parent.y + y,
        w,
        h,
    }
}

fn align_offset(align: Align, avail: f32, used: f32) -> f32 {
    match align {
        Align::Center => (avail - used) / 2.0,
        Align::End => avail - used,
        Align::Start | Align::Stretch => 0.0,
    }
}

fn arrange<'a>(node: &'a Node, rect: Rect, parent: &ComputedText) -> LayoutBox<'a> {
    let style = &node.style;
    let text = parent.inherit(&style.text);
    let pad = style.padding;
    let content = Rect {
        x: rect.x + pad.left,
        y: rect.y + pad.top,
        w: (rect.w - pad.horizontal()).max(0.0),
        h: (rect.h - pad.vertical()).max(0.0),
    };

    let lines = match &node.kind {
        NodeKind::Text(s) => wrap_text(s, content.w, text.font_size, text.font_weight),
        _ => Vec::new(),
    };

    // 流式子节点的尺寸（含 stretch 拉伸）
    let flow: Vec<(usize, f32, f32)> = node
        .children
        .iter()
        .enumerate()
        .filter(|(_, c)| is_flow(c))
        .map(|(i, c)| {
            let (mut w, mut h) = measure(c, content.w, &text);
            if style.align == Align::Stretch {
                match style.direction {
                    Direction::Column if c.style.width.is_none() => w = content.w,
                    Direction::Row if c.style.height.is_none() => h = content.h,
                    _ => {}
                }
            }
            (i, w, h)
        })
        .collect();

    let gaps = style.gap * flow.len().saturating_sub(1) as f32;
    let (main_avail, main_used) = match style.direction {
        Direction::Column => (content.h, flow.iter().map(|f| f.2).sum::<f32>() + gaps),
        Direction::Row => (content.w, flow.iter().map(|f| f.1).sum::<f32>() + gaps),
    };
    let mut cursor = align_offset(style.justify, main_avail, main_used);

    let mut flow_rects = vec![None; node.children.len()];
    for (i, w, h) in flow {
        let r = match style.direction {
            Direction::Column => {
                let x = content.x + align_offset(style.align, content.w, w);
                let r = Rect {
                    x,
                    y: content.y + cursor,
                    w,
                    h,
                };
                cursor += h + style.gap;
                r
            }
            Direction::Row => {
                let y = content.y + align_offset(style.align, content.h, h);
                let r = Rect {
                    x: content.x + cursor,
                    y,
                    w,
                    h,
                };
                cursor += w + style.gap;
                r
            }
        };
        flow_rects[i] = Some(r);
    }

    let children = node
        .children
        .iter()
        .zip(flow_rects)
        .map(|(child, flow_rect)| {
            let child_rect = match (child.style.position, flow_rect) {
                (Position::Absolute(inset), _) => absolute_rect(child, &inset, rect, &text),
                (Position::Flow, Some(r)) => r,
                (Position::Flow, None) => content,
            };
            arrange(child, child_rect, &text)
        })
        .collect();

    LayoutBox {
        node,
        rect,
        text,
        lines,
        children,
    }
}
