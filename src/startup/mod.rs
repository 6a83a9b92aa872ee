/// 启动检查（配置校验 + 可选的字体预热）
pub mod checks;

pub use checks::run_startup_checks;
