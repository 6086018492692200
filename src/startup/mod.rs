/// 启动检查（来源目录 / 字体目录）
pub mod checks;
/// 调色板加载器（palette.yml）
pub mod palette_loader;

pub use checks::run_startup_checks;
pub use palette_loader::load_palettes;
