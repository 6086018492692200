mod cache;
mod encode;
pub mod handler;
pub mod options;
mod renderer;
pub mod source;
mod types;

pub use cache::{
    CacheStore, DisabledStore, MokaImageStore, build_cache_store, store_with_flush_retry,
};
pub use encode::EncodeSettings;
pub use handler::create_image_router;
pub use options::{MAX_DIMENSION, resolve_options};
pub use renderer::{ImageBackend, Renderer, ResvgBackend, TileSpec, build_font_db};
pub use types::{ImageFormat, RenderMode, RenderedImage, ResolvedOptions};
