use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 输出图片格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG（默认，无损）
    #[default]
    Png,
    /// JPEG（`.jpg` 与 `.jpeg` 共用）
    Jpeg,
    /// WebP
    Webp,
    /// AVIF
    Avif,
    /// SVG（矢量，直接返回文档）
    Svg,
}

impl ImageFormat {
    /// 允许出现在文件名中的扩展名
    pub const EXTENSIONS: [&'static str; 6] = ["png", "jpg", "jpeg", "webp", "avif", "svg"];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "avif" => Some(Self::Avif),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
            Self::Svg => "image/svg+xml",
        }
    }

    pub fn is_vector(self) -> bool {
        matches!(self, Self::Svg)
    }

    /// 能否作为“已有图片”模式的来源文件解码
    pub fn is_decodable_source(self) -> bool {
        !matches!(self, Self::Avif)
    }
}

/// 渲染模式：在参数解析阶段一次性确定，下游不再重复检查目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    /// 生成纯色底 + 居中文字
    Generate,
    /// 从目录中确定性挑选一张图片并转码
    FromDirectory {
        /// `from=` 的原始值
        name: String,
        /// 解析后的目录路径
        path: PathBuf,
    },
}

/// 规范化后的请求参数（每个请求一份，不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// 小写文件名（如 `100x50.png`）
    pub filename: String,
    /// 路径中显式指定的背景色（小写 6 位十六进制，不带 `#`）
    pub explicit_color: Option<String>,
    pub text: String,
    /// 文本的 md5 十六进制摘要
    pub text_hash: String,
    pub palette: Option<String>,
    pub mode: RenderMode,
    pub selection_key: u32,
    pub cache_key: String,
}

/// 渲染结果
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl RenderedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
