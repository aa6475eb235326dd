//! 签名链接缓存
//!
//! 把存储引用解析为有时效的访问链接：
//! - 新鲜的缓存条目直接返回，过期条目从不返回
//! - 同一引用的并发请求共享一次解析（请求合并）
//! - 解析失败不缓存，调用方得到 `None`，下次调用重新解析
//!
//! 查缓存、查进行中、登记进行中在同一临界区完成，临界区内没有 `.await`。

use crate::clients::UrlSigner;
use crate::models::{AccessUrl, StorageReference};
use crate::utils::{retry_with_backoff, RetryPolicy};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 默认安全余量：60 分钟的链接只缓存 50 分钟
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(10 * 60);

type PendingResolution = Shared<BoxFuture<'static, Option<AccessUrl>>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    url: AccessUrl,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<StorageReference, CacheEntry>,
    pending: HashMap<StorageReference, PendingResolution>,
}

struct CacheInner {
    signer: Arc<dyn UrlSigner>,
    policy: RetryPolicy,
    safety_margin: Duration,
    state: Mutex<CacheState>,
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 签名链接缓存（克隆后共享同一份状态，不同实例之间互不影响）
#[derive(Clone)]
pub struct ResolverCache {
    inner: Arc<CacheInner>,
}

impl ResolverCache {
    pub fn new(signer: Arc<dyn UrlSigner>) -> Self {
        Self::with_options(signer, DEFAULT_SAFETY_MARGIN, RetryPolicy::default())
    }

    /// 指定安全余量和重试策略
    pub fn with_options(
        signer: Arc<dyn UrlSigner>,
        safety_margin: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                signer,
                policy,
                safety_margin,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// 解析一个存储引用
    ///
    /// 空输入返回 `None`；不需要签名的输入（如 http(s) 链接）原样返回。
    pub async fn resolve(&self, raw: &str) -> Option<AccessUrl> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let Some(reference) = StorageReference::needs_resolution(raw) else {
            return Some(AccessUrl::new(raw));
        };

        let resolution = {
            let mut state = self.inner.lock();

            if let Some(entry) = state.entries.get(&reference) {
                if entry.is_fresh(Instant::now()) {
                    return Some(entry.url.clone());
                }
            }
            state.entries.remove(&reference);

            match state.pending.get(&reference) {
                Some(pending) => {
                    debug!("合并进行中的解析: {}", reference);
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_resolution(reference.clone());
                    state.pending.insert(reference, pending.clone());
                    pending
                }
            }
        };

        resolution.await
    }

    /// 并发解析一批引用，结果顺序与输入一致
    pub async fn resolve_many<S: AsRef<str>>(&self, raws: &[S]) -> Vec<Option<AccessUrl>> {
        join_all(raws.iter().map(|raw| self.resolve(raw.as_ref()))).await
    }

    /// 移除某个引用的缓存条目
    pub fn invalidate(&self, reference: &StorageReference) -> bool {
        self.inner.lock().entries.remove(reference).is_some()
    }

    /// 当前缓存条目数（含尚未清理的过期条目）
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // 解析在独立任务中运行，不依赖任何调用方存活
    fn spawn_resolution(&self, reference: StorageReference) -> PendingResolution {
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            let result = retry_with_backoff("签名链接", &inner.policy, || {
                inner.signer.sign(&reference)
            })
            .await;

            let mut state = inner.lock();
            state.pending.remove(&reference);

            match result {
                Ok(signed) => {
                    let ttl = signed.expires_in.saturating_sub(inner.safety_margin);
                    if ttl.is_zero() {
                        debug!("链接有效期短于安全余量，不缓存: {}", reference);
                    } else {
                        state.entries.insert(
                            reference,
                            CacheEntry {
                                url: signed.url.clone(),
                                expires_at: Instant::now() + ttl,
                            },
                        );
                    }
                    Some(signed.url)
                }
                Err(err) => {
                    warn!("⚠️ 签名链接解析失败 {}: {}", reference, err);
                    None
                }
            }
        });

        async move { handle.await.ok().flatten() }.boxed().shared()
    }
}
