//! HTTP 执行器 - 基础设施层
//!
//! 持有唯一的 `reqwest::Client`，只暴露"带认证地发请求"的能力

use crate::clients::{require_token, AuthProvider};
use crate::error::{ApiError, AppError, AppResult};
use reqwest::{header, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// HTTP 执行器
///
/// 职责：
/// - 持有 Client 和后端地址
/// - 每个请求附带 `Authorization: Bearer <token>`
/// - 把 HTTP 状态映射为类型化错误
/// - 不认识上传 / 计数 / 报表等业务概念
#[derive(Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpExecutor {
    /// 创建新的执行器
    pub fn new(
        base_url: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::api_request_failed("client-builder", e))?;
        Ok(Self::with_client(client, base_url, auth))
    }

    /// 使用已有的 Client 创建
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// 获取 Client 的引用（对象存储上传等直连场景）
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// 获取认证令牌
    pub async fn bearer_token(&self) -> AppResult<String> {
        require_token(self.auth.as_ref()).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET 请求并解析 JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let request = self.client.get(self.url(path)).query(query);
        self.send_json(path, request).await
    }

    /// POST JSON 请求并解析 JSON
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(path)).json(body);
        self.send_json(path, request).await
    }

    /// POST JSON 请求，忽略响应体
    pub async fn post_json_discard<B>(&self, path: &str, body: &B) -> AppResult<()>
    where
        B: Serialize + ?Sized,
    {
        let request = self.client.post(self.url(path)).json(body);
        self.send(path, request).await.map(|_| ())
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> AppResult<Response> {
        let token = self.bearer_token().await?;
        debug!("请求 {}", endpoint);

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        check_status(endpoint, response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> AppResult<T> {
        let response = self.send(endpoint, request).await?;
        let text = response
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        serde_json::from_str(&text).map_err(|e| {
            ApiError::JsonParseFailed {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

/// 检查响应状态：2xx 原样返回，其它状态转为错误
pub(crate) async fn check_status(endpoint: &str, response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized {
            endpoint: endpoint.to_string(),
        }
        .into()),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            Err(ApiError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after,
            }
            .into())
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(AppError::bad_response(
                endpoint,
                status.as_u16(),
                extract_error_message(&body),
            ))
        }
    }
}

/// 从错误响应体中提取信息：`error` / `message` / `results[0].message`，否则原文
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<JsonValue>(body) {
        let candidates = [
            json.get("error"),
            json.get("message"),
            json.get("results")
                .and_then(|r| r.get(0))
                .and_then(|r| r.get("message")),
        ];
        return candidates
            .into_iter()
            .flatten()
            .find_map(|v| v.as_str())
            .map(str::to_string);
    }

    Some(body.to_string())
}
