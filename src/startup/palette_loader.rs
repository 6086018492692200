use std::{collections::HashMap, fs::File, io::Read, path::Path};

use crate::{error::AppError, features::palette::PaletteRegistry};

/// 解析调色板 YAML：`name -> [hex, ...]`，并与内置调色板合并
pub fn parse_palettes<R: Read>(reader: R) -> Result<PaletteRegistry, AppError> {
    let external: Option<HashMap<String, Vec<String>>> = serde_yaml::from_reader(reader)
        .map_err(|e| AppError::Config(format!("解析调色板文件失败: {e}")))?;
    // 空文档视为没有外部定义
    PaletteRegistry::builtin().merged_with(external.unwrap_or_default())
}

/// 加载调色板文件；文件不存在时只使用内置调色板
pub fn load_palettes(path: &Path) -> Result<PaletteRegistry, AppError> {
    if !path.exists() {
        tracing::info!("未找到调色板文件 {:?}，只使用内置调色板", path);
        return Ok(PaletteRegistry::builtin());
    }

    let file = File::open(path)
        .map_err(|e| AppError::Config(format!("打开调色板文件 {path:?} 失败: {e}")))?;
    let registry = parse_palettes(file)?;

    let mut names: Vec<&str> = registry.names().collect();
    names.sort_unstable();
    tracing::info!("已加载 {} 个调色板: {}", registry.len(), names.join(", "));
    Ok(registry)
}
