//! 指数退避重试
//!
//! 只对临时错误（网络失败、5xx、频率限制）重试，其它错误立即返回。
//! 频率限制带有 `Retry-After` 时至少等待该时长（不超过 `max_retry_after`）。

use crate::error::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// 服务端 `Retry-After` 的上限
    pub max_retry_after: Duration,
}

/// 默认 `Retry-After` 上限
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
        }
    }

    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    /// 不重试
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    /// 第 `attempt` 次以 `err` 失败后的等待时间：退避时间与服务端建议取较大者
    pub fn wait_for(&self, attempt: usize, err: &AppError) -> Duration {
        let backoff = self.backoff_for(attempt);
        match err.retry_after() {
            Some(hint) => backoff.max(hint.min(self.max_retry_after)),
            None => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(2))
    }
}

/// 带指数退避的重试
///
/// # 参数
/// - `operation_name`: 日志中的操作名称
/// - `policy`: 重试策略
/// - `operation`: 每次调用产生一个新的 future
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "重试后成功");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.wait_for(attempt, &err);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "⚠️ 临时错误，等待后重试: {}",
                    err
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
