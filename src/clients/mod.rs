//! 外部协作方接口
//!
//! 认证、对象存储、签名、计数、持久化、用户列表都以 trait 描述，
//! 业务层只依赖这些 trait，HTTP 实现位于子模块中。

pub mod auth;
pub mod backend_client;
pub mod object_store;

pub use auth::{require_token, StaticTokenProvider};
pub use backend_client::BackendClient;
pub use object_store::HttpObjectStore;

use crate::error::AppResult;
use crate::models::{
    CorrelationId, CountRequest, CountResponse, KnownUser, ReportBatch, ReportPayload,
    ReportQuery, SignedUrl, StorageReference, SubmissionResult, TransferProgress,
    TransferReceipt, UploadFile,
};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

/// 认证协作方：按需提供 bearer token
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn bearer_token(&self) -> AppResult<String>;
}

/// 对象存储：接收 `(path, bytes, contentType)`，上报进度并返回访问链接
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 新对象所在的存储桶
    fn bucket(&self) -> &str;

    /// 上传一个对象；`progress` 在传输结束时被丢弃
    async fn put_object(
        &self,
        path: &str,
        file: &UploadFile,
        progress: UnboundedSender<TransferProgress>,
    ) -> AppResult<TransferReceipt>;
}

/// 存储引用 → 签名链接
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn sign(&self, reference: &StorageReference) -> AppResult<SignedUrl>;
}

/// 远程计数服务
#[async_trait]
pub trait CountingService: Send + Sync {
    async fn count(&self, request: &CountRequest) -> AppResult<CountResponse>;
}

/// 报表持久化服务
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// 批量保存，返回逐条结果
    async fn save_reports(&self, payloads: &[ReportPayload]) -> AppResult<Vec<SubmissionResult>>;

    /// 读取一页记录（服务端按 `created_at` 降序）
    async fn fetch_reports(&self, query: &ReportQuery) -> AppResult<ReportBatch>;
}

/// 已知上传者列表
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> AppResult<Vec<KnownUser>>;
}

/// 上传完成通知（尽力而为）
#[async_trait]
pub trait UploadNotifier: Send + Sync {
    async fn notify_uploaded(&self, ids: &[CorrelationId]) -> AppResult<()>;
}
