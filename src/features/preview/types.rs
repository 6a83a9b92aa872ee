use axum::body::Bytes;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// 列表标题缺失时的默认值
pub const DEFAULT_TITLE: &str = "Liste de cadeaux";
/// 创建者昵称缺失时的默认值
pub const DEFAULT_OWNER_NAME: &str = "Un utilisateur Giftzly";

/// 输出画布宽度（像素）
pub const CANVAS_WIDTH: u32 = 1200;
/// 输出画布高度（像素）
pub const CANVAS_HEIGHT: u32 = 630;

/// og-image / og-head 的查询参数
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PreviewQuery {
    /// 列表的公开分享 token
    #[serde(default)]
    pub token: Option<String>,
}

impl PreviewQuery {
    /// 取出非空 token（空白字符串视为缺失）
    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// 元数据服务响应：`{ list: { ... } }`
#[derive(Debug, Deserialize)]
pub(crate) struct PublicListResponse {
    #[serde(default)]
    pub list: Option<PublicList>,
}

/// 元数据服务中的列表字段（全部可选，兼容 snake_case 与 camelCase）
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PublicList {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "ownerName")]
    pub owner_name: Option<String>,
    #[serde(default, alias = "coverImageUrl")]
    pub cover_url: Option<String>,
}

/// 渲染所需的列表展示信息（默认值已填充）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListMetadata {
    pub title: String,
    pub owner_name: String,
    /// 原始封面地址，尚未经过可用性校验
    pub cover_url: String,
}

impl ListMetadata {
    pub(crate) fn from_public_list(list: PublicList, default_cover_url: &str) -> Self {
        fn non_blank(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.trim().is_empty())
        }

        Self {
            title: non_blank(list.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            owner_name: non_blank(list.owner_name)
                .unwrap_or_else(|| DEFAULT_OWNER_NAME.to_string()),
            cover_url: non_blank(list.cover_url)
                .unwrap_or_else(|| default_cover_url.to_string()),
        }
    }
}

/// 经过校验的背景图地址：要么是原封面，要么是默认图。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset(pub Url);

impl ResolvedAsset {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// 进程级共享的字体资源
#[derive(Debug, Clone)]
pub struct FontResource {
    pub family: String,
    pub weight: u16,
    pub style: String,
    pub data: Bytes,
}

/// 组装视觉文档所需的全部文本/图片输入
#[derive(Debug, Clone)]
pub struct PreviewContent {
    pub title: String,
    pub owner_name: String,
    pub background: ResolvedAsset,
    /// 右下角品牌文字（空字符串表示不显示）
    pub brand_text: String,
}

/// 最终输出的 PNG 图片
#[derive(Debug, Clone)]
pub struct OutputImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_COVER: &str = "https://cdn.example/default.png";

    #[test]
    fn missing_fields_take_defaults() {
        let meta = ListMetadata::from_public_list(PublicList::default(), DEFAULT_COVER);
        assert_eq!(meta.title, DEFAULT_TITLE);
        assert_eq!(meta.owner_name, DEFAULT_OWNER_NAME);
        assert_eq!(meta.cover_url, DEFAULT_COVER);
    }

    #[test]
    fn blank_fields_are_treated_as_missing() {
        let list = PublicList {
            title: Some("   ".into()),
            owner_name: Some(String::new()),
            cover_url: Some(String::new()),
        };
        let meta = ListMetadata::from_public_list(list, DEFAULT_COVER);
        assert_eq!(meta.title, DEFAULT_TITLE);
        assert_eq!(meta.owner_name, DEFAULT_OWNER_NAME);
        assert_eq!(meta.cover_url, DEFAULT_COVER);
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let body = r#"{"list":{"title":"Noël","ownerName":"Léa","coverImageUrl":"https://x.example/c.jpg"}}"#;
        let parsed: PublicListResponse = serde_json::from_str(body).expect("parse");
        let meta = ListMetadata::from_public_list(parsed.list.unwrap_or_default(), DEFAULT_COVER);
        assert_eq!(meta.owner_name, "Léa");
        assert_eq!(meta.cover_url, "https://x.example/c.jpg");
    }

    #[test]
    fn token_trims_and_rejects_blank() {
        let q = PreviewQuery {
            token: Some("  ".into()),
        };
        assert_eq!(q.token(), None);
        let q = PreviewQuery {
            token: Some(" abc123 ".into()),
        };
        assert_eq!(q.token(), Some("abc123"));
    }
}
