//! 可续传的对象存储上传
//!
//! 流程：发起上传会话 → 按块 `PUT`（`Content-Range`）→ `308` 表示继续；
//! 某块失败时查询已提交的偏移量并从该处续传，续传次数有上限。

use crate::clients::{require_token, AuthProvider, ObjectStore};
use crate::error::{AppError, AppResult, UploadError};
use crate::infrastructure::http_executor::check_status;
use crate::models::{AccessUrl, TransferProgress, TransferReceipt, UploadFile};
use crate::utils::RetryPolicy;
use async_trait::async_trait;
use reqwest::{header, Response, StatusCode};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

const INITIATE_ENDPOINT: &str = "storage/initiate";
const CHUNK_ENDPOINT: &str = "storage/chunk";

/// 续传等待时间上限
const MAX_RESUME_WAIT: Duration = Duration::from_secs(5);

/// 单块传输的结果
#[derive(Debug)]
enum ChunkOutcome {
    /// 服务端已提交的字节数
    Incomplete(usize),
    Complete(TransferReceipt),
}

/// 一个已建立的上传会话
#[async_trait]
trait ChunkTransport: Send + Sync {
    /// 发送从 `offset` 开始的一块
    async fn put_chunk(&self, offset: usize) -> AppResult<ChunkOutcome>;

    /// 查询服务端已提交的偏移量
    async fn query_offset(&self) -> AppResult<ChunkOutcome>;
}

/// 续传参数
#[derive(Debug, Clone, Copy)]
struct ResumeLimits {
    max_resumes: usize,
    backoff: RetryPolicy,
}

/// 基于 HTTP 的对象存储客户端
#[derive(Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    auth: Arc<dyn AuthProvider>,
    upload_url: String,
    public_url: String,
    bucket: String,
    chunk_size: usize,
    max_resumes: usize,
    resume_backoff: RetryPolicy,
}

impl HttpObjectStore {
    pub fn new(
        client: reqwest::Client,
        auth: Arc<dyn AuthProvider>,
        upload_url: impl Into<String>,
        public_url: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth,
            upload_url: upload_url.into().trim_end_matches('/').to_string(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            chunk_size: 256 * 1024,
            max_resumes: 3,
            resume_backoff: RetryPolicy::default(),
        }
    }

    /// 设置分块大小（至少 1 字节）
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// 设置最大续传次数
    pub fn with_max_resumes(mut self, max_resumes: usize) -> Self {
        self.max_resumes = max_resumes;
        self
    }

    /// 无法从响应中取得下载链接时使用的公开地址
    fn public_link(&self, path: &str) -> AccessUrl {
        AccessUrl::new(format!(
            "{}/{}/{}",
            self.public_url,
            self.bucket,
            path.trim_start_matches('/')
        ))
    }

    /// 发起上传会话，返回会话地址
    async fn initiate(&self, path: &str, file: &UploadFile) -> AppResult<String> {
        let token = require_token(self.auth.as_ref()).await?;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.upload_url, self.bucket);

        let response = self
            .client
            .post(url)
            .query(&[("uploadType", "resumable"), ("name", path)])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", file.content_type.as_str())
            .header("X-Upload-Content-Length", file.size())
            .header(header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(INITIATE_ENDPOINT, e))?;

        let response = check_status(INITIATE_ENDPOINT, response).await?;
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::bad_response(
                    INITIATE_ENDPOINT,
                    response.status().as_u16(),
                    Some("响应中缺少上传会话地址".to_string()),
                )
            })
    }

    /// 发送 `[offset, offset + chunk_size)` 这一块
    async fn put_chunk(
        &self,
        session: &str,
        path: &str,
        file: &UploadFile,
        offset: usize,
    ) -> AppResult<ChunkOutcome> {
        let total = file.bytes.len();
        let end = offset.saturating_add(self.chunk_size).min(total);
        let body = file.bytes[offset..end].to_vec();

        let response = self
            .client
            .put(session)
            .header(header::CONTENT_RANGE, content_range(offset, end, total))
            .header(header::CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(CHUNK_ENDPOINT, e))?;

        self.interpret(path, response).await
    }

    /// 查询服务端已提交的偏移量
    async fn query_offset(&self, session: &str, path: &str, total: usize) -> AppResult<ChunkOutcome> {
        let response = self
            .client
            .put(session)
            .header(header::CONTENT_RANGE, format!("bytes */{}", total))
            .header(header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(CHUNK_ENDPOINT, e))?;

        self.interpret(path, response).await
    }

    async fn interpret(&self, path: &str, response: Response) -> AppResult<ChunkOutcome> {
        if response.status() == StatusCode::PERMANENT_REDIRECT {
            let committed = response
                .headers()
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_committed_range)
                .unwrap_or(0);
            return Ok(ChunkOutcome::Incomplete(committed));
        }

        let response = check_status(CHUNK_ENDPOINT, response).await?;
        let body = response.text().await.unwrap_or_default();
        let access_url = access_url_from_body(&body).unwrap_or_else(|| self.public_link(path));
        Ok(ChunkOutcome::Complete(TransferReceipt { access_url }))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(
        &self,
        path: &str,
        file: &UploadFile,
        progress: UnboundedSender<TransferProgress>,
    ) -> AppResult<TransferReceipt> {
        let session = self.initiate(path, file).await?;
        debug!("[{}] 上传会话已建立", file.file_name);

        let transport = HttpSession {
            store: self,
            session,
            path,
            file,
        };
        let limits = ResumeLimits {
            max_resumes: self.max_resumes,
            backoff: self.resume_backoff,
        };
        drive_upload(&transport, &file.file_name, file.bytes.len(), limits, &progress).await
    }
}

/// HTTP 上传会话
struct HttpSession<'a> {
    store: &'a HttpObjectStore,
    session: String,
    path: &'a str,
    file: &'a UploadFile,
}

#[async_trait]
impl<'a> ChunkTransport for HttpSession<'a> {
    async fn put_chunk(&self, offset: usize) -> AppResult<ChunkOutcome> {
        self.store
            .put_chunk(&self.session, self.path, self.file, offset)
            .await
    }

    async fn query_offset(&self) -> AppResult<ChunkOutcome> {
        self.store
            .query_offset(&self.session, self.path, self.file.bytes.len())
            .await
    }
}

/// 按块推进直到完成
///
/// - `Incomplete(n)`：从服务端已提交的 `n` 字节处继续
/// - 临时错误：下一轮先查询已提交的偏移量
/// - 没有前进的一轮计为一次续传，超过 `max_resumes` 后放弃
/// - 进度只增不减
async fn drive_upload(
    transport: &dyn ChunkTransport,
    file_name: &str,
    total: usize,
    limits: ResumeLimits,
    progress: &UnboundedSender<TransferProgress>,
) -> AppResult<TransferReceipt> {
    let mut reported = 0usize;
    let mut report = |transferred: usize| {
        if transferred > reported || transferred == total {
            reported = reported.max(transferred);
            // 接收方可能已被丢弃
            let _ = progress.send(TransferProgress {
                bytes_transferred: reported as u64,
                total_bytes: total as u64,
            });
        }
    };

    let mut offset = 0usize;
    let mut resumes = 0usize;
    let mut probing = total == 0;

    loop {
        let attempt = if probing {
            transport.query_offset().await
        } else {
            transport.put_chunk(offset).await
        };

        let stalled = match attempt {
            Ok(ChunkOutcome::Complete(receipt)) => {
                report(total);
                return Ok(receipt);
            }
            Ok(ChunkOutcome::Incomplete(committed)) => {
                let committed = committed.min(total);
                let advanced = committed > offset || probing;
                if committed < offset {
                    warn!("[{}] ⚠️ 服务端已提交偏移量回退: {} → {}", file_name, offset, committed);
                }
                probing = false;
                offset = committed;
                report(offset);
                !advanced
            }
            Err(err) if err.is_transient() => {
                warn!("[{}] ⚠️ 分块传输失败: {}", file_name, err);
                probing = true;
                true
            }
            Err(err) => return Err(err),
        };

        if stalled {
            resumes += 1;
            if resumes > limits.max_resumes {
                return Err(UploadError::ResumeExhausted {
                    file_name: file_name.to_string(),
                    attempts: resumes - 1,
                }
                .into());
            }
            let wait = limits.backoff.backoff_for(resumes).min(MAX_RESUME_WAIT);
            debug!(
                "[{}] 第 {} 次续传，{:?} 后从 {} 字节处继续",
                file_name, resumes, wait, offset
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// `bytes start-(end-1)/total`
fn content_range(start: usize, end: usize, total: usize) -> String {
    if end <= start {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", start, end - 1, total)
    }
}

/// 解析 `Range: bytes=0-N`，返回已提交的字节数 `N + 1`
fn parse_committed_range(raw: &str) -> Option<usize> {
    let (_, last) = raw.trim().strip_prefix("bytes=")?.split_once('-')?;
    last.trim().parse::<usize>().ok().map(|n| n + 1)
}

/// 从完成响应中读取下载链接（`mediaLink` 或 `downloadUrl`）
fn access_url_from_body(body: &str) -> Option<AccessUrl> {
    let json: JsonValue = serde_json::from_str(body).ok()?;
    ["mediaLink", "downloadUrl"]
        .iter()
        .find_map(|key| json.get(*key).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(AccessUrl::new)
}
