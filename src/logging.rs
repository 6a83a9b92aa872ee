use tracing_subscriber::EnvFilter;

/// 初始化全局 tracing 订阅器。
///
/// `RUST_LOG` 优先；未设置或无法解析时使用配置中的 `logging.level`。
/// 重复初始化（例如测试中）会被忽略。
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(default_filter).unwrap_or_else(|e| {
            eprintln!("logging.level 无效（{e}），回退为 info");
            EnvFilter::new("info")
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
