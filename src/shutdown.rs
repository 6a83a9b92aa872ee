//! 优雅退出
//!
//! 监听 SIGINT / SIGTERM（Windows 下为 Ctrl+C），通知 HTTP 服务器停止接收新连接，
//! 并在超时后放弃等待仍在渲染中的请求。

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C / SIGINT
    Interrupt,
    /// SIGTERM（容器/平台停止实例）
    Terminate,
    /// 应用内部主动触发
    Application,
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("信号设置失败: {0}")]
    SignalSetup(String),

    #[error("优雅退出超时")]
    Timeout,
}

/// 退出协调器：首次触发的原因生效，之后的触发被忽略。
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    tx: watch::Sender<Option<ShutdownReason>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        let first = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            true
        });
        if first {
            info!("触发优雅退出: {:?}", reason);
        } else {
            debug!("重复的退出信号被忽略: {:?}", reason);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// 等待退出信号（已触发时立即返回）
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(slot) => *slot,
            // 发送端与 self 同生命周期，不会关闭
            Err(_) => None,
        };
        reason.unwrap_or(ShutdownReason::Application)
    }

    pub async fn wait_for_shutdown_with_timeout(
        &self,
        duration: Duration,
    ) -> Result<ShutdownReason, ShutdownError> {
        tokio::time::timeout(duration, self.wait_for_shutdown())
            .await
            .map_err(|_| ShutdownError::Timeout)
    }

    /// 启动后台信号监听任务
    pub fn start_signal_handler(&self) -> Result<(), ShutdownError> {
        let manager = self.clone();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = signal(SignalKind::interrupt())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;
            let mut sigterm = signal(SignalKind::terminate())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigint.recv() => manager.trigger_shutdown(ShutdownReason::Interrupt),
                    _ = sigterm.recv() => manager.trigger_shutdown(ShutdownReason::Terminate),
                }
            });
        }

        #[cfg(not(unix))]
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => manager.trigger_shutdown(ShutdownReason::Interrupt),
                Err(e) => warn!("监听 Ctrl+C 失败: {}", e),
            }
        });

        Ok(())
    }

    /// 供 `axum::serve(..).with_graceful_shutdown` 使用的退出 future。
    ///
    /// 收到信号后立即返回，让服务器停止 accept；同时启动一个看守任务，
    /// 超过 `drain_timeout` 仍未退出则强制结束进程。
    pub async fn graceful_signal(self, drain_timeout: Duration) {
        let reason = self.wait_for_shutdown().await;
        info!(
            "接收到退出信号: {:?}，等待进行中的请求完成（最长 {:?}）",
            reason, drain_timeout
        );
        tokio::spawn(async move {
            tokio::time::sleep(drain_timeout).await;
            warn!("优雅退出超时，强制退出");
            std::process::exit(1);
        });
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_then_wait_returns_immediately() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutting_down());

        manager.trigger_shutdown(ShutdownReason::Application);
        assert!(manager.is_shutting_down());
        assert_eq!(manager.wait_for_shutdown().await, ShutdownReason::Application);
    }

    #[tokio::test]
    async fn first_reason_wins() {
        let manager = ShutdownManager::new();
        manager.trigger_shutdown(ShutdownReason::Interrupt);
        manager.trigger_shutdown(ShutdownReason::Terminate);
        assert_eq!(manager.wait_for_shutdown().await, ShutdownReason::Interrupt);
    }

    #[tokio::test]
    async fn waiter_is_woken_by_later_trigger() {
        let manager = ShutdownManager::new();
        let waiter = {
            let m = manager.clone();
            tokio::spawn(async move { m.wait_for_shutdown().await })
        };
        tokio::task::yield_now().await;
        manager.trigger_shutdown(ShutdownReason::Terminate);
        assert_eq!(waiter.await.expect("join"), ShutdownReason::Terminate);
    }

    #[tokio::test]
    async fn wait_times_out_without_signal() {
        let manager = ShutdownManager::new();
        let result = manager
            .wait_for_shutdown_with_timeout(Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ShutdownError::Timeout)));
    }
}
