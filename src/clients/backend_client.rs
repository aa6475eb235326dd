/// 后端 API 客户端
///
/// 封装签名、计数、报表、用户列表、上传通知等所有后端调用
use crate::clients::{CountingService, ReportStore, UploadNotifier, UrlSigner, UserDirectory};
use crate::error::{AppError, AppResult};
use crate::infrastructure::HttpExecutor;
use crate::models::user::UserListResponse;
use crate::models::{
    normalize_reports, AccessUrl, CorrelationId, CountRequest, CountResponse, KnownUser,
    ReportBatch, ReportPayload, ReportQuery, SignedUrl, StorageReference, SubmissionResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::debug;

const SIGNED_URL_ENDPOINT: &str = "storage/signed-url";
const PROCESS_ENDPOINT: &str = "process-ai";
const SAVE_REPORT_ENDPOINT: &str = "save-report";
const REPORTS_ENDPOINT: &str = "reports";
const USERS_ENDPOINT: &str = "users";
const NOTIFY_ENDPOINT: &str = "api/images";

/// 服务端未声明有效期时按一小时处理
const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Serialize)]
struct SignedUrlRequest<'a> {
    #[serde(rename = "gsUri")]
    gs_uri: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(default, rename = "signedUrl")]
    signed_url: Option<String>,
    /// 有效期（秒）
    #[serde(default, rename = "expiresIn")]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SaveReportResponse {
    #[serde(default)]
    results: Vec<SubmissionResult>,
}

/// 后端 API 客户端
#[derive(Clone)]
pub struct BackendClient {
    executor: HttpExecutor,
}

impl BackendClient {
    /// 创建新的后端客户端
    pub fn new(executor: HttpExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl UrlSigner for BackendClient {
    async fn sign(&self, reference: &StorageReference) -> AppResult<SignedUrl> {
        let response: SignedUrlResponse = self
            .executor
            .post_json(
                SIGNED_URL_ENDPOINT,
                &SignedUrlRequest {
                    gs_uri: reference.as_str(),
                },
            )
            .await?;

        let url = response
            .signed_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                AppError::bad_response(
                    SIGNED_URL_ENDPOINT,
                    200,
                    Some("响应中缺少 signedUrl".to_string()),
                )
            })?;

        Ok(SignedUrl {
            url: AccessUrl::new(url),
            expires_in: response
                .expires_in
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SIGNED_URL_TTL),
        })
    }
}

#[async_trait]
impl CountingService for BackendClient {
    async fn count(&self, request: &CountRequest) -> AppResult<CountResponse> {
        debug!("提交 {} 个文件到计数服务", request.file_uris.len());
        self.executor.post_json(PROCESS_ENDPOINT, request).await
    }
}

#[async_trait]
impl ReportStore for BackendClient {
    async fn save_reports(&self, payloads: &[ReportPayload]) -> AppResult<Vec<SubmissionResult>> {
        let response: SaveReportResponse =
            self.executor.post_json(SAVE_REPORT_ENDPOINT, payloads).await?;
        Ok(response.results)
    }

    async fn fetch_reports(&self, query: &ReportQuery) -> AppResult<ReportBatch> {
        let payload: JsonValue = self
            .executor
            .get_json(REPORTS_ENDPOINT, &query.query_pairs())
            .await?;
        Ok(normalize_reports(payload))
    }
}

#[async_trait]
impl UserDirectory for BackendClient {
    async fn list_users(&self) -> AppResult<Vec<KnownUser>> {
        let response: UserListResponse = self.executor.get_json(USERS_ENDPOINT, &[]).await?;
        Ok(response.users)
    }
}

#[async_trait]
impl UploadNotifier for BackendClient {
    async fn notify_uploaded(&self, ids: &[CorrelationId]) -> AppResult<()> {
        let body = json!({
            "imageIds": ids,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.executor.post_json_discard(NOTIFY_ENDPOINT, &body).await
    }
}
