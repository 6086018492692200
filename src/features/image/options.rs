//! 请求参数解析：路径 + query -> [`ResolvedOptions`]。

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{ImageFormat, RenderMode, ResolvedOptions};
use crate::error::AppError;

/// 宽高上限（含）
pub const MAX_DIMENSION: u64 = 2000;

/// 缓存键分隔符。除调色板名外，其余字段均不可能包含该字符。
const KEY_SEPARATOR: char = ':';

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    let exts = ImageFormat::EXTENSIONS.join("|");
    Regex::new(&format!(r"^(\d+)x(\d+)\.({exts})$")).expect("filename regex")
});

static COLOR_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{6}$").expect("color regex"));

static SOURCE_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("source dir regex"));

/// md5 十六进制摘要
pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// 取 md5 前 8 位十六进制作为选择键
pub fn selection_key_for(input: &str) -> u32 {
    let digest = md5::compute(input.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn non_empty<'a>(query: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    query.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

/// 解析请求路径与 query，得到规范化参数。
///
/// `sources_root` 为 `from=` 目录的解析根；目录不存在或名称不合法时静默回退到生成模式。
pub fn resolve_options(
    path: &str,
    query: &HashMap<String, String>,
    sources_root: &Path,
) -> Result<ResolvedOptions, AppError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let filename = segments.last().copied().unwrap_or_default().to_lowercase();

    let caps = FILENAME_RE
        .captures(&filename)
        .ok_or_else(|| AppError::InvalidFilename(filename.clone()))?;
    // 超长数字按溢出处理，交给尺寸校验报错
    let width: u64 = caps[1].parse().unwrap_or(u64::MAX);
    let height: u64 = caps[2].parse().unwrap_or(u64::MAX);
    let format = ImageFormat::from_extension(&caps[3])
        .ok_or_else(|| AppError::InvalidFilename(filename.clone()))?;

    if !(1..=MAX_DIMENSION).contains(&width) || !(1..=MAX_DIMENSION).contains(&height) {
        return Err(AppError::InvalidSize { width, height });
    }

    let explicit_color = segments
        .len()
        .checked_sub(2)
        .map(|i| segments[i])
        .filter(|seg| COLOR_SEGMENT_RE.is_match(seg))
        .map(str::to_ascii_lowercase);

    let text = non_empty(query, "text")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{width}x{height}"));
    let text_hash = md5_hex(&text);
    let selection_key = selection_key_for(non_empty(query, "key").unwrap_or(&text));

    let palette = non_empty(query, "palette").map(str::to_string);

    let mode = match non_empty(query, "from") {
        Some(name) if SOURCE_DIR_RE.is_match(name) => {
            let dir = sources_root.join(name);
            if dir.is_dir() {
                RenderMode::FromDirectory {
                    name: name.to_string(),
                    path: dir,
                }
            } else {
                tracing::debug!("来源目录不存在，回退到生成模式: {:?}", dir);
                RenderMode::Generate
            }
        }
        _ => RenderMode::Generate,
    };

    let source_name = match &mode {
        RenderMode::FromDirectory { name, .. } => name.as_str(),
        RenderMode::Generate => "",
    };
    let cache_key = [
        source_name,
        palette.as_deref().unwrap_or_default(),
        explicit_color.as_deref().unwrap_or_default(),
        &text_hash,
        &selection_key.to_string(),
        &filename,
    ]
    .join(&KEY_SEPARATOR.to_string());

    Ok(ResolvedOptions {
        width: width as u32,
        height: height as u32,
        format,
        filename,
        explicit_color,
        text,
        text_hash,
        palette,
        mode,
        selection_key,
        cache_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn resolve(path: &str, pairs: &[(&str, &str)]) -> Result<ResolvedOptions, AppError> {
        resolve_options(path, &query(pairs), Path::new("."))
    }

    #[test]
    fn parses_size_format_and_default_text() {
        let opts = resolve("/100x50.PNG", &[]).unwrap();
        assert_eq!((opts.width, opts.height), (100, 50));
        assert_eq!(opts.format, ImageFormat::Png);
        assert_eq!(opts.filename, "100x50.png");
        assert_eq!(opts.text, "100x50");
        assert_eq!(opts.explicit_color, None);
        assert_eq!(opts.mode, RenderMode::Generate);
    }

    #[test]
    fn all_valid_sizes_and_formats_resolve() {
        for ext in ImageFormat::EXTENSIONS {
            for (w, h) in [(1, 1), (2000, 2000), (1, 2000), (640, 480)] {
                let path = format!("/{w}x{h}.{ext}");
                let opts = resolve(&path, &[]).unwrap();
                let filename = format!("{w}x{h}.{ext}");
                assert!(opts.cache_key.ends_with(&filename));
                assert!(opts.cache_key.contains(&opts.selection_key.to_string()));
            }
        }
    }

    #[test]
    fn rejects_out_of_range_sizes() {
        for path in ["/0x10.png", "/2001x10.png", "/10x0.png", "/10x2001.jpg"] {
            assert!(
                matches!(resolve(path, &[]), Err(AppError::InvalidSize { .. })),
                "{path}"
            );
        }
        assert!(matches!(
            resolve("/99999999999999999999999x1.png", &[]),
            Err(AppError::InvalidSize { .. })
        ));
    }

    #[test]
    fn rejects_malformed_filenames() {
        for path in ["/abcxdef.png", "/100x100.gif", "/100x100.pdf", "/100.png", "/", ""] {
            assert!(
                matches!(resolve(path, &[]), Err(AppError::InvalidFilename(_))),
                "{path}"
            );
        }
    }

    #[test]
    fn color_segment_is_optional_and_lowercased() {
        let opts = resolve("/FF00aa/10x10.png", &[]).unwrap();
        assert_eq!(opts.explicit_color.as_deref(), Some("ff00aa"));

        let opts = resolve("/ff00a/10x10.png", &[]).unwrap();
        assert_eq!(opts.explicit_color, None);

        let opts = resolve("/images/ff0000/10x10.png", &[]).unwrap();
        assert_eq!(opts.explicit_color.as_deref(), Some("ff0000"));
    }

    #[test]
    fn selection_key_uses_first_eight_hex_digits_of_md5() {
        let expected = u32::from_str_radix(&md5_hex("100x50")[..8], 16).unwrap();
        assert_eq!(selection_key_for("100x50"), expected);

        let opts = resolve("/100x50.png", &[]).unwrap();
        assert_eq!(opts.selection_key, expected);

        let keyed = resolve("/100x50.png", &[("key", "abc"), ("text", "Hi")]).unwrap();
        assert_eq!(keyed.selection_key, selection_key_for("abc"));
        assert_eq!(keyed.text, "Hi");
    }

    #[test]
    fn cache_key_distinguishes_text_palette_and_color() {
        let base = resolve("/100x50.png", &[("text", "a")]).unwrap();
        let same = resolve("/100x50.png", &[("text", "a")]).unwrap();
        assert_eq!(base.cache_key, same.cache_key);

        let other_text = resolve("/100x50.png", &[("text", "b"), ("key", "a")]).unwrap();
        assert_eq!(other_text.selection_key, base.selection_key);
        assert_ne!(other_text.cache_key, base.cache_key);

        let palette = resolve("/100x50.png", &[("text", "a"), ("palette", "warm")]).unwrap();
        assert_ne!(palette.cache_key, base.cache_key);

        let color = resolve("/ff0000/100x50.png", &[("text", "a")]).unwrap();
        assert_ne!(color.cache_key, base.cache_key);

        let jpeg = resolve("/100x50.jpeg", &[("text", "a")]).unwrap();
        let jpg = resolve("/100x50.jpg", &[("text", "a")]).unwrap();
        assert_ne!(jpeg.cache_key, jpg.cache_key);
    }

    #[test]
    fn empty_query_values_behave_as_absent() {
        let opts = resolve("/20x30.png", &[("text", ""), ("palette", ""), ("key", "")]).unwrap();
        assert_eq!(opts.text, "20x30");
        assert_eq!(opts.palette, None);
        assert_eq!(opts.selection_key, selection_key_for("20x30"));
    }

    #[test]
    fn missing_or_unsafe_source_directory_falls_back_to_generation() {
        let opts = resolve("/20x30.png", &[("from", "does-not-exist-anywhere")]).unwrap();
        assert_eq!(opts.mode, RenderMode::Generate);
        assert!(opts.cache_key.starts_with(':'));

        let opts = resolve("/20x30.png", &[("from", "../etc")]).unwrap();
        assert_eq!(opts.mode, RenderMode::Generate);
    }

    #[test]
    fn existing_source_directory_switches_mode() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("samples")).expect("mkdir");
        let opts = resolve_options(
            "/20x30.png",
            &query(&[("from", "samples")]),
            root.path(),
        )
        .unwrap();
        assert_eq!(
            opts.mode,
            RenderMode::FromDirectory {
                name: "samples".into(),
                path: root.path().join("samples"),
            }
        );
        assert!(opts.cache_key.starts_with("samples:"));
    }
}
