use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    /// 覆盖请求路径（含 query）的请求头，便于测试与反向代理
    #[serde(default = "ServerConfig::default_path_override_header")]
    pub path_override_header: String,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        3000
    }
    fn default_path_override_header() -> String {
        "x-mockimageserver-path".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            path_override_header: Self::default_path_override_header(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// 日志格式：full | compact | json
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
    fn default_format() -> String {
        "full".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

/// 调色板配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaletteConfig {
    /// 外部调色板 YAML 文件（不存在时只使用内置调色板）
    #[serde(default = "PaletteConfig::default_file")]
    pub file: String,
}

impl PaletteConfig {
    fn default_file() -> String {
        "./palette.yml".to_string()
    }
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            file: Self::default_file(),
        }
    }
}

/// 图片缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 是否启用缓存
    #[serde(default = "CacheConfig::default_enabled")]
    pub enabled: bool,
    /// 最大条目数
    #[serde(default = "CacheConfig::default_max_entries")]
    pub max_entries: u64,
    /// 条目 TTL（秒）
    #[serde(default = "CacheConfig::default_ttl")]
    pub ttl_secs: u64,
    /// 单条记录的字节上限，超出时写入失败
    #[serde(default = "CacheConfig::default_max_entry_bytes")]
    pub max_entry_bytes: usize,
}

impl CacheConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_max_entries() -> u64 {
        1000
    }
    fn default_ttl() -> u64 {
        60
    }
    fn default_max_entry_bytes() -> usize {
        8 * 1024 * 1024
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            max_entries: Self::default_max_entries(),
            ttl_secs: Self::default_ttl(),
            max_entry_bytes: Self::default_max_entry_bytes(),
        }
    }
}

/// 图片渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRenderConfig {
    /// 文字字体族（交给 usvg 解析）
    #[serde(default = "ImageRenderConfig::default_font_family")]
    pub font_family: String,
    /// 额外字体目录（.ttf / .otf / .ttc）
    #[serde(default = "ImageRenderConfig::default_fonts_dir")]
    pub fonts_dir: String,
    /// 浅色文字候选
    #[serde(default = "ImageRenderConfig::default_text_light")]
    pub text_light: String,
    /// 深色文字候选
    #[serde(default = "ImageRenderConfig::default_text_dark")]
    pub text_dark: String,
    /// 并发渲染许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// JPEG 质量 1-100
    #[serde(default = "ImageRenderConfig::default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// WebP 质量：0=无损，1-100=有损
    #[serde(default)]
    pub webp_quality: u8,
    /// 是否优先速度（缩放滤波与栅格化质量更低）
    #[serde(default)]
    pub optimize_speed: bool,
    /// 响应的 Cache-Control max-age（秒）
    #[serde(default = "ImageRenderConfig::default_max_age")]
    pub cache_control_max_age_secs: u64,
}

impl ImageRenderConfig {
    fn default_font_family() -> String {
        "sans-serif".to_string()
    }
    fn default_fonts_dir() -> String {
        "resources/fonts".to_string()
    }
    fn default_text_light() -> String {
        "#ffffff".to_string()
    }
    fn default_text_dark() -> String {
        "#000000".to_string()
    }
    fn default_jpeg_quality() -> u8 {
        90
    }
    fn default_max_age() -> u64 {
        60
    }

    /// 实际并发许可数
    pub fn parallelism(&self) -> usize {
        match self.max_parallel {
            0 => num_cpus::get().max(1),
            n => n as usize,
        }
    }
}

impl Default for ImageRenderConfig {
    fn default() -> Self {
        Self {
            font_family: Self::default_font_family(),
            fonts_dir: Self::default_fonts_dir(),
            text_light: Self::default_text_light(),
            text_dark: Self::default_text_dark(),
            max_parallel: 0,
            jpeg_quality: Self::default_jpeg_quality(),
            webp_quality: 0,
            optimize_speed: false,
            cache_control_max_age_secs: Self::default_max_age(),
        }
    }
}

/// 来源图片目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// `from=` 目录的解析根
    #[serde(default = "SourcesConfig::default_root")]
    pub root: String,
}

impl SourcesConfig {
    fn default_root() -> String {
        ".".to_string()
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
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
        10
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
    /// 调色板配置
    #[serde(default)]
    pub palette: PaletteConfig,
    /// 图片缓存配置
    #[serde(default)]
    pub cache: CacheConfig,
    /// 图片渲染配置
    #[serde(default)]
    pub image: ImageRenderConfig,
    /// 来源图片目录配置
    #[serde(default)]
    pub sources: SourcesConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置（文件可选），支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            // 加载配置文件（可选）
            .add_source(File::from(config_path).required(false))
            // 支持环境变量覆盖，例如：APP_SERVER__PORT=8080
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<&'static AppConfig, ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(Self::global())
    }

    /// 获取配置文件路径（可通过 APP_CONFIG 指定）
    fn get_config_path() -> PathBuf {
        std::env::var("APP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 调色板文件路径
    pub fn palette_path(&self) -> PathBuf {
        PathBuf::from(&self.palette.file)
    }

    /// 来源目录根路径
    pub fn sources_root(&self) -> PathBuf {
        PathBuf::from(&self.sources.root)
    }

    /// 字体目录
    pub fn fonts_path(&self) -> PathBuf {
        PathBuf::from(&self.image.fonts_dir)
    }
}
