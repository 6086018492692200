/// 颜色计算
pub mod color;
/// 健康检查
pub mod health;
/// 占位图渲染与 HTTP 入口
pub mod image;
/// 调色板注册表
pub mod palette;
