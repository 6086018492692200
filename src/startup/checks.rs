use std::fs;
use std::path::Path;

use crate::config::AppConfig;
use crate::error::AppError;

/// 执行启动检查
///
/// 1. 检查来源图片根目录（仅告警）
/// 2. 检查字体目录（仅告警）
pub fn run_startup_checks(config: &AppConfig) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    check_sources_root(&config.sources_root());
    check_font_resources(&config.fonts_path());

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

/// `from=` 目录的根不存在时，所有请求都会回退到生成模式
fn check_sources_root(root: &Path) {
    if root.is_dir() {
        tracing::info!("✅ 来源图片根目录: {:?}", root);
    } else {
        tracing::warn!("⚠️ 来源图片根目录不存在: {:?}，from= 参数将被忽略", root);
    }
}

/// 字体目录中没有字体时只告警；系统字体仍可使用
fn check_font_resources(font_dir: &Path) {
    let count = fs::read_dir(font_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| {
                    e.path()
                        .extension()
                        .and_then(|x| x.to_str())
                        .map(|x| matches!(x.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc"))
                        .unwrap_or(false)
                })
                .count()
        })
        .unwrap_or(0);

    if count == 0 {
        tracing::warn!("未在 {:?} 找到字体文件，将只使用系统字体", font_dir);
    } else {
        tracing::info!("字体目录 {:?} 中有 {} 个字体文件", font_dir, count);
    }
}
