//! 颜色计算：十六进制与 RGB 互转、WCAG 相对亮度、对比度与高对比度文字色选择。

use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// 24 位 RGB 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(0xff, 0xff, 0xff);
    pub const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// 小写、补零、带 `#` 的十六进制表示
    pub fn to_hex(self) -> String {
        rgb_to_hex(self.r, self.g, self.b)
    }

    pub fn relative_luminance(self) -> f64 {
        relative_luminance(self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex_to_rgb(s)
    }
}

/// 解析 `#rrggbb` / `rrggbb`（大小写不敏感），其余输入一律视为非法颜色。
pub fn hex_to_rgb(hex: &str) -> Result<Rgb, AppError> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AppError::InvalidColor(hex.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| AppError::InvalidColor(hex.to_string()))
    };
    Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
}

pub fn rgb_to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.03928 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB 相对亮度（BT.709 权重）
pub fn relative_luminance(r: u8, g: u8, b: u8) -> f64 {
    let r = srgb_to_linear(f64::from(r) / 255.0);
    let g = srgb_to_linear(f64::from(g) / 255.0);
    let b = srgb_to_linear(f64::from(b) / 255.0);
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

pub fn contrast_ratio(l1: f64, l2: f64) -> f64 {
    let lighter = l1.max(l2);
    let darker = l1.min(l2);
    (lighter + 0.05) / (darker + 0.05)
}

/// 在 `light` 与 `dark` 中选出与背景对比度更高者。
///
/// 仅当浅色对比度严格更高时才返回浅色，相等时返回深色。
pub fn high_contrast_text_color(background: Rgb, light: Rgb, dark: Rgb) -> Rgb {
    let bg = background.relative_luminance();
    let contrast_light = contrast_ratio(bg, light.relative_luminance());
    let contrast_dark = contrast_ratio(bg, dark.relative_luminance());
    pick_by_contrast(contrast_light, contrast_dark, light, dark)
}

/// 浅色仅在对比度严格更高时胜出
pub fn pick_by_contrast(contrast_light: f64, contrast_dark: f64, light: Rgb, dark: Rgb) -> Rgb {
    if contrast_light > contrast_dark {
        light
    } else {
        dark
    }
}

/// 使用默认的白/黑候选色
pub fn default_text_color(background: Rgb) -> Rgb {
    high_contrast_text_color(background, Rgb::WHITE, Rgb::BLACK)
}
