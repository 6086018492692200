//! 图片渲染：生成模式（纯色底 + 居中文字）与已有图片模式（挑选、缩放、转码）。
//!
//! 具体像素绘制通过 [`ImageBackend`] 完成，默认实现 [`ResvgBackend`] 基于 resvg。

use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::DynamicImage;
use image::imageops::FilterType;
use resvg::usvg::{self, Options as UsvgOptions, fontdb};
use resvg::{
    render,
    tiny_skia::{Pixmap, Transform},
};

use super::encode::{EncodeSettings, encode_png, encode_raster, pixmap_to_rgba};
use super::source::select_source;
use super::types::{ImageFormat, RenderMode, RenderedImage, ResolvedOptions};
use crate::config::ImageRenderConfig;
use crate::error::AppError;
use crate::features::color::{Rgb, hex_to_rgb, high_contrast_text_color};
use crate::features::palette::PaletteRegistry;

/// 文字左右各留 5% 宽度
const TEXT_WIDTH_RATIO: f32 = 0.9;

/// 一张待绘制的纯色图块
#[derive(Debug, Clone, PartialEq)]
pub struct TileSpec<'a> {
    pub width: u32,
    pub height: u32,
    pub background: Rgb,
    pub text: &'a str,
    pub text_color: Rgb,
    pub format: ImageFormat,
}

/// 绘制后端
pub trait ImageBackend: Send + Sync {
    /// 绘制纯色底 + 居中文字，并编码为 `spec.format`
    fn draw_tile(&self, spec: &TileSpec<'_>) -> Result<Vec<u8>, AppError>;

    /// 解码来源图片，裁剪缩放到 `width x height` 后编码为 `format`
    fn resize_and_encode(
        &self,
        source: &[u8],
        source_format: ImageFormat,
        width: u32,
        height: u32,
        format: ImageFormat,
    ) -> Result<Vec<u8>, AppError>;
}

/// 构建字体库：系统字体 + 字体目录。
///
/// 系统中没有 `sans-serif` 对应字体时，用第一个已加载的字体族兜底。
pub fn build_font_db(fonts_dir: &Path) -> Arc<fontdb::Database> {
    let mut font_db = fontdb::Database::new();
    font_db.load_system_fonts();

    if fonts_dir.is_dir() {
        if let Ok(entries) = fs::read_dir(fonts_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_font = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc"))
                    .unwrap_or(false);
                if path.is_file() && is_font {
                    if let Err(e) = font_db.load_font_file(&path) {
                        tracing::error!("加载字体文件失败 '{}': {}", path.display(), e);
                    }
                }
            }
        }
    } else {
        tracing::debug!("字体目录不存在: {}", fonts_dir.display());
    }

    let sans_query = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    };
    if font_db.query(&sans_query).is_none() {
        let fallback = font_db
            .faces()
            .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
        match fallback {
            Some(name) => {
                tracing::info!("未找到 sans-serif 字体，使用 '{}' 兜底", name);
                font_db.set_sans_serif_family(name);
            }
            None => tracing::warn!("没有可用字体，生成的图片将不含文字"),
        }
    }

    tracing::info!("字体库加载完成，共 {} 个字体", font_db.len());
    Arc::new(font_db)
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// 自然字号：高度的 1/10，至少 1px
pub fn natural_font_size(height: u32) -> f32 {
    (height as f32 / 10.0).max(1.0)
}

/// 文字超出可用宽度时按比例缩小字号
pub fn fit_font_size(natural: f32, measured_width: Option<f32>, width: u32) -> f32 {
    let available = width as f32 * TEXT_WIDTH_RATIO;
    match measured_width {
        Some(measured) if measured > available && measured > 0.0 => {
            natural * available / measured
        }
        _ => natural,
    }
}

/// 递归查找文字节点的包围盒宽度
fn text_width(group: &usvg::Group) -> Option<f32> {
    group.children().iter().find_map(|node| match node {
        usvg::Node::Text(text) => Some(text.bounding_box().width()),
        usvg::Node::Group(g) => text_width(g),
        _ => None,
    })
}

/// resvg 后端
pub struct ResvgBackend {
    font_db: Arc<fontdb::Database>,
    font_family: String,
    settings: EncodeSettings,
}

impl ResvgBackend {
    pub fn new(
        font_db: Arc<fontdb::Database>,
        font_family: impl Into<String>,
        settings: EncodeSettings,
    ) -> Self {
        Self {
            font_db,
            font_family: font_family.into(),
            settings,
        }
    }

    pub fn from_config(cfg: &ImageRenderConfig, fonts_dir: &Path) -> Self {
        Self::new(
            build_font_db(fonts_dir),
            cfg.font_family.clone(),
            EncodeSettings {
                jpeg_quality: cfg.jpeg_quality,
                webp_quality: cfg.webp_quality,
                optimize_speed: cfg.optimize_speed,
            },
        )
    }

    fn usvg_options(&self) -> UsvgOptions<'_> {
        let speed = self.settings.optimize_speed;
        UsvgOptions {
            fontdb: self.font_db.clone(),
            font_family: self.font_family.clone(),
            font_size: 16.0,
            languages: vec!["en".to_string()],
            shape_rendering: if speed {
                usvg::ShapeRendering::OptimizeSpeed
            } else {
                usvg::ShapeRendering::GeometricPrecision
            },
            text_rendering: if speed {
                usvg::TextRendering::OptimizeSpeed
            } else {
                usvg::TextRendering::OptimizeLegibility
            },
            image_rendering: if speed {
                usvg::ImageRendering::OptimizeSpeed
            } else {
                usvg::ImageRendering::OptimizeQuality
            },
            ..Default::default()
        }
    }

    fn parse_svg(&self, svg: &[u8]) -> Result<usvg::Tree, AppError> {
        usvg::Tree::from_data(svg, &self.usvg_options())
            .map_err(|e| AppError::RenderFailure(format!("Failed to parse SVG: {e}")))
    }

    fn text_element(&self, spec: &TileSpec<'_>, font_size: f32) -> String {
        format!(
            r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size:.2}" fill="{fill}" text-anchor="middle" dominant-baseline="central">{text}</text>"#,
            x = spec.width as f32 / 2.0,
            y = spec.height as f32 / 2.0,
            family = escape_xml(&self.font_family),
            size = font_size,
            fill = spec.text_color,
            text = escape_xml(spec.text),
        )
    }

    /// 以自然字号排版文字并返回其宽度；没有可用字体时为 None
    fn measure_text(&self, spec: &TileSpec<'_>, font_size: f32) -> Option<f32> {
        let doc = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}">{text}</svg>"#,
            w = spec.width,
            h = spec.height,
            text = self.text_element(spec, font_size),
        );
        let tree = self.parse_svg(doc.as_bytes()).ok()?;
        text_width(tree.root()).filter(|w| *w > 0.0)
    }

    /// 生成图块的 SVG 文档
    pub fn tile_svg(&self, spec: &TileSpec<'_>) -> String {
        let natural = natural_font_size(spec.height);
        let font_size = fit_font_size(natural, self.measure_text(spec, natural), spec.width);
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="100%" height="100%" fill="{bg}"/>{text}</svg>"#,
            w = spec.width,
            h = spec.height,
            bg = spec.background,
            text = self.text_element(spec, font_size),
        )
    }

    fn rasterize(&self, svg: &[u8], width: u32, height: u32) -> Result<Pixmap, AppError> {
        let tree = self.parse_svg(svg)?;
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| AppError::RenderFailure("Failed to create pixmap".to_string()))?;
        let size = tree.size();
        let transform =
            Transform::from_scale(width as f32 / size.width(), height as f32 / size.height());
        render(&tree, transform, &mut pixmap.as_mut());
        Ok(pixmap)
    }

    fn decode_source(
        &self,
        source: &[u8],
        source_format: ImageFormat,
    ) -> Result<DynamicImage, AppError> {
        if source_format.is_vector() {
            let size = self.parse_svg(source)?.size().to_int_size();
            let pixmap = self.rasterize(source, size.width(), size.height())?;
            return Ok(DynamicImage::ImageRgba8(pixmap_to_rgba(&pixmap)?));
        }
        Ok(image::load_from_memory(source)?)
    }
}

impl ImageBackend for ResvgBackend {
    fn draw_tile(&self, spec: &TileSpec<'_>) -> Result<Vec<u8>, AppError> {
        let svg = self.tile_svg(spec);
        if spec.format.is_vector() {
            return Ok(svg.into_bytes());
        }
        let pixmap = self.rasterize(svg.as_bytes(), spec.width, spec.height)?;
        encode_raster(&pixmap_to_rgba(&pixmap)?, spec.format, self.settings)
    }

    fn resize_and_encode(
        &self,
        source: &[u8],
        source_format: ImageFormat,
        width: u32,
        height: u32,
        format: ImageFormat,
    ) -> Result<Vec<u8>, AppError> {
        let filter = if self.settings.optimize_speed {
            FilterType::Triangle
        } else {
            FilterType::Lanczos3
        };
        let resized = self
            .decode_source(source, source_format)?
            .resize_to_fill(width, height, filter)
            .to_rgba8();

        if format.is_vector() {
            let png = encode_png(&resized, self.settings)?;
            let svg = format!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><image width="{width}" height="{height}" href="data:image/png;base64,{data}"/></svg>"#,
                data = BASE64.encode(png),
            );
            return Ok(svg.into_bytes());
        }
        encode_raster(&resized, format, self.settings)
    }
}

/// 渲染入口：根据模式选择背景色与文字色，再交给后端
pub struct Renderer {
    backend: Arc<dyn ImageBackend>,
    palettes: Arc<PaletteRegistry>,
    text_light: Rgb,
    text_dark: Rgb,
}

impl Renderer {
    pub fn new(backend: Arc<dyn ImageBackend>, palettes: Arc<PaletteRegistry>) -> Self {
        Self {
            backend,
            palettes,
            text_light: Rgb::WHITE,
            text_dark: Rgb::BLACK,
        }
    }

    /// 覆盖高对比度文字的候选色
    pub fn with_text_colors(mut self, light: Rgb, dark: Rgb) -> Self {
        self.text_light = light;
        self.text_dark = dark;
        self
    }

    pub fn from_config(
        cfg: &ImageRenderConfig,
        fonts_dir: &Path,
        palettes: Arc<PaletteRegistry>,
    ) -> Result<Self, AppError> {
        let light = hex_to_rgb(&cfg.text_light)
            .map_err(|e| AppError::Config(format!("image.text_light: {e}")))?;
        let dark = hex_to_rgb(&cfg.text_dark)
            .map_err(|e| AppError::Config(format!("image.text_dark: {e}")))?;
        let backend = Arc::new(ResvgBackend::from_config(cfg, fonts_dir));
        Ok(Self::new(backend, palettes).with_text_colors(light, dark))
    }

    /// 背景色：显式颜色优先；颜色无法解析时静默回退到调色板
    pub fn background_for(&self, opts: &ResolvedOptions) -> Result<Rgb, AppError> {
        if let Some(rgb) = opts
            .explicit_color
            .as_deref()
            .and_then(|hex| hex_to_rgb(hex).ok())
        {
            return Ok(rgb);
        }
        self.palettes
            .color_for_key(opts.selection_key, opts.palette.as_deref())
    }

    /// 同步渲染，调用方负责放到阻塞线程池
    pub fn render(&self, opts: &ResolvedOptions) -> Result<RenderedImage, AppError> {
        let bytes = match &opts.mode {
            RenderMode::Generate => {
                let background = self.background_for(opts)?;
                let spec = TileSpec {
                    width: opts.width,
                    height: opts.height,
                    background,
                    text: &opts.text,
                    text_color: high_contrast_text_color(
                        background,
                        self.text_light,
                        self.text_dark,
                    ),
                    format: opts.format,
                };
                self.backend.draw_tile(&spec)?
            }
            RenderMode::FromDirectory { path, .. } => {
                let (file, source_format) = select_source(path, opts.selection_key)?;
                tracing::debug!("已选择来源图片: {}", file.display());
                let source = fs::read(&file)?;
                self.backend.resize_and_encode(
                    &source,
                    source_format,
                    opts.width,
                    opts.height,
                    opts.format,
                )?
            }
        };

        Ok(RenderedImage {
            bytes,
            format: opts.format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::image::options::resolve_options;
    use image::{Rgba, RgbaImage};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 记录最后一次调用参数的后端
    #[derive(Default)]
    struct RecordingBackend {
        tiles: Mutex<Vec<(Rgb, Rgb, String)>>,
    }

    impl ImageBackend for RecordingBackend {
        fn draw_tile(&self, spec: &TileSpec<'_>) -> Result<Vec<u8>, AppError> {
            self.tiles
                .lock()
                .unwrap()
                .push((spec.background, spec.text_color, spec.text.to_string()));
            Ok(b"tile".to_vec())
        }

        fn resize_and_encode(
            &self,
            source: &[u8],
            _source_format: ImageFormat,
            _width: u32,
            _height: u32,
            _format: ImageFormat,
        ) -> Result<Vec<u8>, AppError> {
            Ok(source.to_vec())
        }
    }

    fn resolve(path: &str, pairs: &[(&str, &str)], root: &Path) -> ResolvedOptions {
        let query: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        resolve_options(path, &query, root).unwrap()
    }

    fn backend() -> ResvgBackend {
        ResvgBackend::new(
            Arc::new(fontdb::Database::new()),
            "sans-serif",
            EncodeSettings::default(),
        )
    }

    #[test]
    fn explicit_color_wins_and_text_contrasts() {
        let rec = Arc::new(RecordingBackend::default());
        let renderer = Renderer::new(rec.clone(), Arc::new(PaletteRegistry::builtin()));
        let opts = resolve("/ffff00/10x10.png", &[("palette", "missing")], Path::new("."));
        renderer.render(&opts).unwrap();

        let tiles = rec.tiles.lock().unwrap();
        assert_eq!(tiles[0].0, Rgb::new(0xff, 0xff, 0x00));
        assert_eq!(tiles[0].1, Rgb::BLACK);
        assert_eq!(tiles[0].2, "10x10");
    }

    #[test]
    fn unknown_palette_without_color_fails() {
        let renderer = Renderer::new(
            Arc::new(RecordingBackend::default()),
            Arc::new(PaletteRegistry::builtin()),
        );
        let opts = resolve("/10x10.png", &[("palette", "missing")], Path::new("."));
        assert_eq!(
            renderer.render(&opts).unwrap_err(),
            AppError::UnknownPalette("missing".into())
        );
    }

    #[test]
    fn dark_palette_entry_gets_light_text() {
        let mut custom = HashMap::new();
        custom.insert("night".to_string(), vec!["#101010".to_string()]);
        let palettes = PaletteRegistry::builtin().merged_with(custom).unwrap();
        let rec = Arc::new(RecordingBackend::default());
        let renderer = Renderer::new(rec.clone(), Arc::new(palettes));
        let opts = resolve("/10x10.png", &[("palette", "night")], Path::new("."));
        renderer.render(&opts).unwrap();
        assert_eq!(rec.tiles.lock().unwrap()[0].1, Rgb::WHITE);
    }

    #[test]
    fn font_shrinks_only_when_text_overflows() {
        assert_eq!(natural_font_size(50), 5.0);
        assert_eq!(natural_font_size(3), 1.0);
        assert_eq!(fit_font_size(5.0, Some(40.0), 100), 5.0);
        assert_eq!(fit_font_size(5.0, None, 100), 5.0);
        let shrunk = fit_font_size(10.0, Some(180.0), 100);
        assert!((shrunk - 5.0).abs() < 1e-4);
    }

    #[test]
    fn svg_tile_escapes_text() {
        let svg = backend().tile_svg(&TileSpec {
            width: 200,
            height: 100,
            background: Rgb::new(0x12, 0x34, 0x56),
            text: "<a&b>",
            text_color: Rgb::WHITE,
            format: ImageFormat::Svg,
        });
        assert!(svg.contains(r##"fill="#123456""##));
        assert!(svg.contains("&lt;a&amp;b&gt;"));
        assert!(svg.contains(r#"font-size="10.00""#));
    }

    #[test]
    fn raster_tile_is_filled_with_background() {
        let bytes = backend()
            .draw_tile(&TileSpec {
                width: 20,
                height: 10,
                background: Rgb::new(0xff, 0, 0),
                text: "Hi",
                text_color: Rgb::WHITE,
                format: ImageFormat::Png,
            })
            .unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (20, 10));
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn existing_image_is_resized_to_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let samples = dir.path().join("samples");
        fs::create_dir(&samples).unwrap();
        RgbaImage::from_pixel(40, 20, Rgba([0, 0, 255, 255]))
            .save(samples.join("blue.png"))
            .unwrap();

        let renderer = Renderer::new(Arc::new(backend()), Arc::new(PaletteRegistry::builtin()));
        let opts = resolve("/8x8.jpg", &[("from", "samples")], dir.path());
        let out = renderer.render(&opts).unwrap();
        assert_eq!(out.format, ImageFormat::Jpeg);
        let img = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (8, 8));

        let opts = resolve("/8x4.svg", &[("from", "samples")], dir.path());
        let svg = String::from_utf8(renderer.render(&opts).unwrap().bytes).unwrap();
        assert!(svg.contains("data:image/png;base64,"));
    }

    #[test]
    fn empty_source_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let renderer = Renderer::new(Arc::new(backend()), Arc::new(PaletteRegistry::builtin()));
        let opts = resolve("/8x8.png", &[("from", "empty")], dir.path());
        assert!(matches!(
            renderer.render(&opts),
            Err(AppError::NoSourceFiles(_))
        ));
    }
}
