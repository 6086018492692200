//! 栅格编码：RGBA 像素 -> PNG / JPEG / WebP / AVIF 字节。

use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};
use resvg::tiny_skia::Pixmap;

use super::types::ImageFormat;
use crate::error::AppError;

/// 编码参数
#[derive(Debug, Clone, Copy)]
pub struct EncodeSettings {
    pub jpeg_quality: u8,
    /// 0=无损
    pub webp_quality: u8,
    pub optimize_speed: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            webp_quality: 0,
            optimize_speed: false,
        }
    }
}

/// 预乘 alpha 的 pixmap 转为普通 RGBA 图像
pub fn pixmap_to_rgba(pixmap: &Pixmap) -> Result<RgbaImage, AppError> {
    let mut raw = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        raw.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), raw)
        .ok_or_else(|| AppError::RenderFailure("pixmap buffer size mismatch".to_string()))
}

/// 按目标格式编码；SVG 不在此处理
pub fn encode_raster(
    img: &RgbaImage,
    format: ImageFormat,
    settings: EncodeSettings,
) -> Result<Vec<u8>, AppError> {
    let (w, h) = img.dimensions();
    match format {
        ImageFormat::Png => encode_png(img, settings),
        ImageFormat::Jpeg => {
            // JPEG 无透明通道
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let mut out = Vec::new();
            let mut enc = JpegEncoder::new_with_quality(&mut out, settings.jpeg_quality.clamp(1, 100));
            enc.encode(&rgb, w, h, ColorType::Rgb8.into())
                .map_err(|e| AppError::RenderFailure(format!("JPEG encode error: {e}")))?;
            Ok(out)
        }
        ImageFormat::Webp => {
            if settings.webp_quality == 0 {
                let mut out = Vec::new();
                WebPEncoder::new_lossless(&mut out)
                    .encode(img.as_raw(), w, h, ColorType::Rgba8.into())
                    .map_err(|e| AppError::RenderFailure(format!("WebP encode error: {e}")))?;
                Ok(out)
            } else {
                let quality = f32::from(settings.webp_quality.clamp(1, 100));
                let mem = webp::Encoder::from_rgba(img.as_raw(), w, h).encode(quality);
                Ok(mem.to_vec())
            }
        }
        ImageFormat::Avif => {
            let speed = if settings.optimize_speed { 10 } else { 6 };
            let mut out = Vec::new();
            AvifEncoder::new_with_speed_quality(&mut out, speed, 80)
                .write_image(img.as_raw(), w, h, ColorType::Rgba8.into())
                .map_err(|e| AppError::RenderFailure(format!("AVIF encode error: {e}")))?;
            Ok(out)
        }
        ImageFormat::Svg => Err(AppError::RenderFailure(
            "svg is not a raster format".to_string(),
        )),
    }
}

/// 使用 png crate 进行快速编码
pub fn encode_png(img: &RgbaImage, settings: EncodeSettings) -> Result<Vec<u8>, AppError> {
    let (w, h) = img.dimensions();
    let mut out = Vec::with_capacity((w * h) as usize);
    {
        let mut encoder = png::Encoder::new(&mut out, w, h);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if settings.optimize_speed {
            encoder.set_compression(png::Compression::Fast);
            encoder.set_filter(png::FilterType::NoFilter);
        } else {
            encoder.set_compression(png::Compression::Default);
            encoder.set_filter(png::FilterType::Paeth);
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::RenderFailure(format!("PNG write_header error: {e}")))?;
        writer
            .write_image_data(img.as_raw())
            .map_err(|e| AppError::RenderFailure(format!("PNG write_image_data error: {e}")))?;
        writer
            .finish()
            .map_err(|e| AppError::RenderFailure(format!("PNG finish error: {e}")))?;
    }
    Ok(out)
}
