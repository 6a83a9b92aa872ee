/// 健康检查
pub mod health;
/// 列表分享预览图（og-image / og-head）
pub mod preview;
