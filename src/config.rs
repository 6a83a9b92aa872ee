use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 默认日志过滤器（`RUST_LOG` 优先）
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "giftzly_og=info,tower_http=info".to_string(),
        }
    }
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API 路由前缀
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api".to_string(),
        }
    }
}

/// CORS 配置
///
/// 预览图通常被第三方站点直接引用，默认对任意来源开放只读方法。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// 是否启用 CORS
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（为空时使用 GET/HEAD）
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（支持 "*" 表示任意）
    pub allowed_headers: Vec<String>,
    /// 暴露的响应头列表
    pub expose_headers: Vec<String>,
    /// 是否允许携带凭证
    pub allow_credentials: bool,
    /// 预检缓存时间（秒）
    pub max_age_secs: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
            expose_headers: vec!["x-request-id".to_string()],
            allow_credentials: false,
            max_age_secs: Some(86_400),
        }
    }
}

/// 元数据服务（Supabase Edge Function）配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// 服务基地址，例如 `https://xxx.supabase.co`
    #[serde(default)]
    pub base_url: String,
    /// 匿名访问密钥（作为 Bearer 凭证发送）
    #[serde(default)]
    pub anon_key: String,
}

/// 字体资源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontConfig {
    /// 字体下载地址（TTF/OTF）
    #[serde(default = "FontConfig::default_url")]
    pub url: String,
    /// 字体族名，文档中的所有文本都使用该字体
    #[serde(default = "FontConfig::default_family")]
    pub family: String,
    #[serde(default = "FontConfig::default_weight")]
    pub weight: u16,
    #[serde(default = "FontConfig::default_style")]
    pub style: String,
    /// 启动时预取字体，降低首个请求的延迟
    #[serde(default)]
    pub prewarm: bool,
}

impl FontConfig {
    fn default_url() -> String {
        "https://raw.githubusercontent.com/google/fonts/main/ofl/inter/Inter-Regular.ttf"
            .to_string()
    }
    fn default_family() -> String {
        "Inter".to_string()
    }
    fn default_weight() -> u16 {
        400
    }
    fn default_style() -> String {
        "normal".to_string()
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            family: Self::default_family(),
            weight: Self::default_weight(),
            style: Self::default_style(),
            prewarm: false,
        }
    }
}

/// 预览图配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// 封面缺失或不可用时使用的默认背景
    #[serde(default = "PreviewConfig::default_cover_url")]
    pub default_cover_url: String,
    /// 成功响应的 `Cache-Control: max-age`（秒）
    #[serde(default = "PreviewConfig::default_cache_max_age")]
    pub cache_max_age_secs: u64,
    /// 对外访问的站点地址，用于 og-head 生成绝对 URL
    #[serde(default = "PreviewConfig::default_public_base_url")]
    pub public_base_url: String,
    /// 内嵌图片的最大字节数，超出视为不可用
    #[serde(default = "PreviewConfig::default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl PreviewConfig {
    fn default_cover_url() -> String {
        "https://giftzly-web.vercel.app/assets/og-default.png".to_string()
    }
    fn default_cache_max_age() -> u64 {
        3600
    }
    fn default_public_base_url() -> String {
        "https://giftzly-web.vercel.app".to_string()
    }
    fn default_max_image_bytes() -> usize {
        8 * 1024 * 1024
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            default_cover_url: Self::default_cover_url(),
            cache_max_age_secs: Self::default_cache_max_age(),
            public_base_url: Self::default_public_base_url(),
            max_image_bytes: Self::default_max_image_bytes(),
        }
    }
}

/// 品牌/展示配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandingConfig {
    /// 右下角品牌文字（留空则不显示）
    #[serde(default = "BrandingConfig::default_footer_text")]
    pub footer_text: String,
}

impl BrandingConfig {
    fn default_footer_text() -> String {
        "giftzly".to_string()
    }
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            footer_text: Self::default_footer_text(),
        }
    }
}

/// 图片渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRenderConfig {
    /// 是否优先速度渲染（OptimizeSpeed），提升栅格化性能，可能略降画质
    #[serde(default)]
    pub optimize_speed: bool,
    /// 并发渲染许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 是否额外加载系统字体作为缺字回退
    #[serde(default = "ImageRenderConfig::default_load_system_fonts")]
    pub load_system_fonts: bool,
}

impl ImageRenderConfig {
    fn default_load_system_fonts() -> bool {
        true
    }

    /// 实际生效的并发渲染许可数
    pub fn effective_parallelism(&self) -> usize {
        if self.max_parallel == 0 {
            num_cpus::get()
        } else {
            self.max_parallel as usize
        }
    }
}

impl Default for ImageRenderConfig {
    fn default() -> Self {
        Self {
            optimize_speed: false,
            max_parallel: 0,
            load_system_fonts: Self::default_load_system_fonts(),
        }
    }
}

/// 出站 HTTP 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_user_agent")]
    pub user_agent: String,
    /// 出站请求超时（秒）。未设置时沿用平台默认行为，不额外限制。
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl HttpConfig {
    fn default_user_agent() -> String {
        concat!("giftzly-og/", env!("CARGO_PKG_VERSION")).to_string()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: Self::default_user_agent(),
            timeout_secs: None,
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// CORS 配置
    #[serde(default)]
    pub cors: CorsConfig,
    /// 元数据服务配置
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// 字体配置
    #[serde(default)]
    pub font: FontConfig,
    /// 预览图配置
    #[serde(default)]
    pub preview: PreviewConfig,
    /// 品牌/展示配置
    #[serde(default)]
    pub branding: BrandingConfig,
    /// 图片渲染配置
    #[serde(default)]
    pub image: ImageRenderConfig,
    /// 出站 HTTP 配置
    #[serde(default)]
    pub http: HttpConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            // 配置文件可选：无服务器部署通常只提供环境变量
            .add_source(File::from(config_path).required(false))
            // 支持环境变量覆盖，例如：APP_METADATA__ANON_KEY
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = builder.try_deserialize()?;
        config.apply_platform_env(|key| std::env::var(key).ok());

        tracing::debug!(
            "配置加载完成: metadata.base_url = {:?}, anon_key = {}",
            config.metadata.base_url,
            if config.metadata.anon_key.is_empty() {
                "<empty>"
            } else {
                "<set>"
            }
        );

        Ok(config)
    }

    /// 兼容原部署平台的环境变量（`SUPABASE_URL` / `SUPABASE_ANON_KEY`），仅在对应配置为空时生效。
    fn apply_platform_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.metadata.base_url.trim().is_empty()
            && let Some(v) = lookup("SUPABASE_URL")
        {
            self.metadata.base_url = v;
        }
        if self.metadata.anon_key.trim().is_empty()
            && let Some(v) = lookup("SUPABASE_ANON_KEY")
        {
            self.metadata.anon_key = v;
        }
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    #[test]
    fn platform_env_fills_empty_metadata_fields() {
        let mut cfg = AppConfig::default();
        cfg.apply_platform_env(|key| match key {
            "SUPABASE_URL" => Some("https://demo.supabase.co".to_string()),
            "SUPABASE_ANON_KEY" => Some("anon".to_string()),
            _ => None,
        });
        assert_eq!(cfg.metadata.base_url, "https://demo.supabase.co");
        assert_eq!(cfg.metadata.anon_key, "anon");
    }

    #[test]
    fn platform_env_does_not_override_explicit_config() {
        let mut cfg = AppConfig::default();
        cfg.metadata.base_url = "https://configured.example".to_string();
        cfg.apply_platform_env(|_| Some("https://env.example".to_string()));
        assert_eq!(cfg.metadata.base_url, "https://configured.example");
        assert_eq!(cfg.metadata.anon_key, "https://env.example");
    }

    #[test]
    fn defaults_match_public_deployment() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.api.prefix, "/api");
        assert_eq!(cfg.preview.cache_max_age_secs, 3600);
        assert_eq!(cfg.font.family, "Inter");
        assert!(cfg.http.timeout_secs.is_none());
    }
}
