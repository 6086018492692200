use std::path::PathBuf;
use std::sync::Arc;

use axum::http::HeaderName;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::image::{CacheStore, Renderer, build_cache_store};
use crate::features::palette::PaletteRegistry;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 渲染结果缓存
    pub image_cache: Arc<dyn CacheStore>,
    pub renderer: Arc<Renderer>,
    /// 控制并发渲染的信号量（限制 CPU 密集型任务数量）
    pub render_semaphore: Arc<Semaphore>,
    /// `from=` 目录的解析根
    pub sources_root: Arc<PathBuf>,
    /// 覆盖请求路径的请求头
    pub path_override_header: HeaderName,
    /// 响应 Cache-Control 的 max-age（秒）
    pub cache_max_age_secs: u64,
}

impl AppState {
    /// 按配置组装状态；字体库在这里加载
    pub fn from_config(config: &AppConfig, palettes: PaletteRegistry) -> Result<Self, AppError> {
        let renderer =
            Renderer::from_config(&config.image, &config.fonts_path(), Arc::new(palettes))?;
        let path_override_header = HeaderName::from_bytes(
            config.server.path_override_header.to_ascii_lowercase().as_bytes(),
        )
        .map_err(|e| AppError::Config(format!("server.path_override_header: {e}")))?;

        Ok(Self {
            image_cache: build_cache_store(&config.cache),
            renderer: Arc::new(renderer),
            render_semaphore: Arc::new(Semaphore::new(config.image.parallelism())),
            sources_root: Arc::new(config.sources_root()),
            path_override_header,
            cache_max_age_secs: config.image.cache_control_max_age_secs,
        })
    }
}
