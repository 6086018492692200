//! “已有图片”模式：在目录中确定性地挑选来源文件。

use std::fs;
use std::path::{Path, PathBuf};

use super::types::ImageFormat;
use crate::error::AppError;

/// 目录中可作为来源的文件（普通文件 + 可解码扩展名），按文件名排序
pub fn list_candidates(dir: &Path) -> Result<Vec<(PathBuf, ImageFormat)>, AppError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(format) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
        else {
            continue;
        };
        if format.is_decodable_source() {
            files.push((path, format));
        }
    }
    // 目录遍历顺序依赖文件系统，排序后选择才是确定的
    files.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(files)
}

/// 按 `selection_key % 文件数` 选出来源文件
pub fn select_source(dir: &Path, selection_key: u32) -> Result<(PathBuf, ImageFormat), AppError> {
    let mut files = list_candidates(dir)?;
    if files.is_empty() {
        return Err(AppError::NoSourceFiles(
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.display().to_string()),
        ));
    }
    let index = selection_key as usize % files.len();
    Ok(files.swap_remove(index))
}
