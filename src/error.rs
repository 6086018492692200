use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// 应用统一错误类型
///
/// 请求路径上的所有错误都会被转换为 404 + 纯文本 `Not found: {message}`；
/// `CacheWriteFailure` 只在日志中出现，不会返回给调用方。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// 文件名不符合 `{width}x{height}.{ext}`
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// 宽高超出 1..=2000
    #[error("Size must be not more than 2000. width = {width}, height = {height}")]
    InvalidSize { width: u64, height: u64 },

    /// 调色板不存在
    #[error("Invalid palette: {0}")]
    UnknownPalette(String),

    /// 颜色字符串不是 6 位十六进制
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// 来源目录中没有可用图片
    #[error("No source images in directory: {0}")]
    NoSourceFiles(String),

    /// 渲染 / 解码 / 编码失败
    #[error("Render failed: {0}")]
    RenderFailure(String),

    /// 缓存写入失败（非致命，仅记录日志）
    #[error("Cache write failed: {0}")]
    CacheWriteFailure(String),

    /// 配置或启动期错误
    #[error("Config error: {0}")]
    Config(String),

    /// 内部错误（阻塞任务、信号量等）
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::NOT_FOUND
    }

    /// 稳定的错误码，用于日志检索
    pub fn stable_code(&self) -> &'static str {
        match self {
            AppError::InvalidFilename(_) => "INVALID_FILENAME",
            AppError::InvalidSize { .. } => "INVALID_SIZE",
            AppError::UnknownPalette(_) => "UNKNOWN_PALETTE",
            AppError::InvalidColor(_) => "INVALID_COLOR",
            AppError::NoSourceFiles(_) => "NO_SOURCE_FILES",
            AppError::RenderFailure(_) => "RENDER_FAILURE",
            AppError::CacheWriteFailure(_) => "CACHE_WRITE_FAILURE",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::debug!(code = self.stable_code(), "请求失败: {}", self);

        let mut res = format!("Not found: {self}").into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::RenderFailure(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::RenderFailure(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
