use giftzly_og::startup::run_startup_checks;
use giftzly_og::{AppState, ShutdownManager, build_router, config::AppConfig, http, logging};

#[tokio::main]
async fn main() {
    // 配置先于日志加载：日志过滤器本身来自配置
    if let Err(e) = AppConfig::init_global() {
        logging::init_tracing(&giftzly_og::config::LoggingConfig::default().level);
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();
    logging::init_tracing(&config.logging.level);

    let shutdown_manager = ShutdownManager::new();
    if let Err(e) = shutdown_manager.start_signal_handler() {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    let client = match http::build_client(&config.http) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("HTTP client init failed: {}", e);
            std::process::exit(1);
        }
    };

    let app_state = match AppState::new(client, config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Preview service init failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_startup_checks(config, &app_state.preview).await {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    let app = build_router(app_state, config);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("OG image: http://{}{}/og-image?token=...", addr, config.api.prefix);

    let graceful = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_manager.graceful_signal(config.shutdown.timeout_duration()));

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}
