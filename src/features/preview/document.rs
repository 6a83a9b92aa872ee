//! 声明式视觉文档：由容器/文本/图片三类节点组成的树，每个节点携带结构化样式。
//!
//! 文档只描述“画什么”，不包含任何坐标；布局由 [`super::layout`] 负责，
//! 栅格化由 [`super::renderer`] 负责。

/// RGBA 颜色（alpha 取值 0.0-1.0）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 1.0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 1.0);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0.0);

    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// SVG 颜色值（不含透明度）
    pub fn rgb(&self) -> String {
        format!("rgb({},{},{})", self.r, self.g, self.b)
    }

    pub fn alpha(&self) -> f32 {
        self.a.clamp(0.0, 1.0)
    }
}

/// 渐变色标，`offset` 取值 0.0-1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Rgba,
}

pub fn stop(offset: f32, color: Rgba) -> GradientStop {
    GradientStop { offset, color }
}

/// 背景填充
#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(Rgba),
    /// CSS 语义的线性渐变：0deg 指向上方，顺时针递增（180deg 为自上而下）
    Linear {
        angle_deg: f32,
        stops: Vec<GradientStop>,
    },
    /// 以盒子中心为圆心、半径延伸到最远角的圆形渐变
    Radial { stops: Vec<GradientStop> },
}

/// 阴影（box-shadow / text-shadow）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub dx: f32,
    pub dy: f32,
    pub blur: f32,
    pub color: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Border {
    pub width: f32,
    pub color: Rgba,
}

/// 四边数值（padding）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub const fn symmetric(vertical: f32, horizontal: f32) -> Self {
        Self {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }

    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

/// 绝对定位的偏移量，`None` 表示该边未约束
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Inset {
    pub top: Option<f32>,
    pub right: Option<f32>,
    pub bottom: Option<f32>,
    pub left: Option<f32>,
}

impl Inset {
    /// `inset: 0`，铺满父容器
    pub const fn fill() -> Self {
        Self {
            top: Some(0.0),
            right: Some(0.0),
            bottom: Some(0.0),
            left: Some(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Position {
    #[default]
    Flow,
    Absolute(Inset),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Start,
    Center,
    End,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// 四角圆角半径
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Radii {
    pub top_left: f32,
    pub top_right: f32,
    pub bottom_right: f32,
    pub bottom_left: f32,
}

impl Radii {
    pub const fn all(r: f32) -> Self {
        Self {
            top_left: r,
            top_right: r,
            bottom_right: r,
            bottom_left: r,
        }
    }

    pub const fn top(r: f32) -> Self {
        Self {
            top_left: r,
            top_right: r,
            bottom_right: 0.0,
            bottom_left: 0.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.top_left <= 0.0
            && self.top_right <= 0.0
            && self.bottom_right <= 0.0
            && self.bottom_left <= 0.0
    }

    pub fn is_uniform(&self) -> bool {
        self.top_left == self.top_right
            && self.top_right == self.bottom_right
            && self.bottom_right == self.bottom_left
    }
}

/// 可继承的文本样式：未设置的字段沿用父节点的计算值
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextStyle {
    pub color: Option<Rgba>,
    pub font_size: Option<f32>,
    pub font_weight: Option<u16>,
    pub font_family: Option<String>,
    pub line_height: Option<f32>,
    pub align: Option<TextAlign>,
    pub shadow: Option<Shadow>,
}

/// 节点样式
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub position: Position,
    pub padding: Edges,
    pub direction: Direction,
    /// 主轴对齐
    pub justify: Align,
    /// 交叉轴对齐
    pub align: Align,
    pub gap: f32,
    pub background: Option<Paint>,
    pub opacity: f32,
    pub border: Option<Border>,
    pub radius: Radii,
    pub box_shadow: Option<Shadow>,
    pub text: TextStyle,
    /// 同级节点的绘制顺序，数值越大越靠上；相同值保持文档顺序
    pub z_index: i32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            position: Position::Flow,
            padding: Edges::default(),
            direction: Direction::Row,
            justify: Align::Start,
            align: Align::Stretch,
            gap: 0.0,
            background: None,
            opacity: 1.0,
            border: None,
            radius: Radii::default(),
            box_shadow: None,
            text: TextStyle::default(),
            z_index: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container,
    Text(String),
    /// 等比缩放并裁剪以铺满盒子（object-fit: cover）
    Image { src: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub style: Style,
    pub children: Vec<Node>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            style: Style::default(),
            children: Vec::new(),
        }
    }

    /// 就地修改样式
    pub fn style(mut self, f: impl FnOnce(&mut Style)) -> Self {
        f(&mut self.style);
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// 深度优先遍历（先序）
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for c in &self.children {
            c.walk(f);
        }
    }
}

pub fn container() -> Node {
    Node::new(NodeKind::Container)
}

pub fn text(content: impl Into<String>) -> Node {
    Node::new(NodeKind::Text(content.into()))
}

pub fn image(src: impl Into<String>) -> Node {
    Node::new(NodeKind::Image { src: src.into() })
}

/// 完整的视觉文档：固定尺寸画布 + 根节点
#[derive(Debug, Clone, PartialEq)]
pub struct VisualDocument {
    pub width: u32,
    pub height: u32,
    pub root: Node,
}

impl VisualDocument {
    /// 文档中出现的全部文本（先序）
    pub fn texts(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.root.walk(&mut |n| {
            if let NodeKind::Text(s) = &n.kind {
                out.push(s.as_str());
            }
        });
        out
    }

    /// 文档中引用的全部图片地址（去重，保持首次出现顺序）
    pub fn image_sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.root.walk(&mut |n| {
            if let NodeKind::Image { src, .. } = &n.kind
                && !out.contains(&src.as_str())
            {
                out.push(src.as_str());
            }
        });
        out
    }
}
