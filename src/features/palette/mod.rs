//! 调色板注册表：启动期构建，运行期只读。

use std::collections::HashMap;

use crate::error::AppError;
use crate::features::color::{Rgb, hex_to_rgb};

/// 默认调色板名
pub const DEFAULT_PALETTE: &str = "neutral";

/// 内置灰阶调色板
const NEUTRAL: [&str; 8] = [
    "#f2f2f2", "#d9d9d9", "#595959", "#bfbfbf", "#808080", "#666666", "#4d4d4d", "#333333",
];

/// 命名调色板表
#[derive(Debug, Clone)]
pub struct PaletteRegistry {
    palettes: HashMap<String, Vec<Rgb>>,
}

impl Default for PaletteRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PaletteRegistry {
    /// 仅包含内置 `neutral` 调色板
    pub fn builtin() -> Self {
        let neutral = NEUTRAL
            .iter()
            .map(|hex| hex_to_rgb(hex))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_default();
        let mut palettes = HashMap::new();
        palettes.insert(DEFAULT_PALETTE.to_string(), neutral);
        Self { palettes }
    }

    /// 合并外部定义：同名覆盖，其余追加。
    ///
    /// 任一颜色非法或列表为空时整体失败，不产生部分合并。
    pub fn merged_with(
        mut self,
        external: HashMap<String, Vec<String>>,
    ) -> Result<Self, AppError> {
        let mut parsed = HashMap::with_capacity(external.len());
        for (name, colors) in external {
            if colors.is_empty() {
                return Err(AppError::Config(format!("调色板 '{name}' 不能为空")));
            }
            let rgb = colors
                .iter()
                .map(|c| hex_to_rgb(c.trim()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Config(format!("调色板 '{name}' 含非法颜色: {e}")))?;
            parsed.insert(name, rgb);
        }
        self.palettes.extend(parsed);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&[Rgb]> {
        self.palettes.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.palettes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.palettes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palettes.is_empty()
    }

    /// 按选择键从调色板中取色：`colors[key % len]`
    pub fn color_for_key(&self, selection_key: u32, palette: Option<&str>) -> Result<Rgb, AppError> {
        let name = palette.unwrap_or(DEFAULT_PALETTE);
        let colors = self
            .get(name)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::UnknownPalette(name.to_string()))?;
        let index = selection_key as usize % colors.len();
        Ok(colors[index])
    }
}
