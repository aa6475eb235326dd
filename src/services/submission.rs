//! 报表提交
//!
//! 把复核后的条目批量提交给持久化服务，返回逐条结果。
//! 传输失败时整批失败；逐条错误由调用方决定如何展示，不自动重试。

use crate::clients::ReportStore;
use crate::error::{AppResult, ValidationError};
use crate::models::{ProcessedItem, ReportPayload, SubmissionResult};
use crate::utils::logging;
use std::sync::Arc;
use tracing::{info, warn};

/// 提交结果（与输入顺序一致）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    pub results: Vec<SubmissionResult>,
}

impl SubmissionReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(SubmissionResult::is_success)
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// 第一条错误的信息
    pub fn first_error_message(&self) -> Option<String> {
        self.results.iter().find(|r| !r.is_success()).map(|r| {
            r.message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "保存失败".to_string())
        })
    }
}

/// 条目 → 提交载荷，人工计数未设置时使用 AI 计数
pub fn to_payload(item: &ProcessedItem) -> ReportPayload {
    ReportPayload {
        image_url: item.reference.to_string(),
        ai_count: item.ai_count,
        manual_count: item.effective_manual_count(),
        ai_description: item.description.clone(),
        notes: item.notes.clone(),
    }
}

/// 报表提交网关
#[derive(Clone)]
pub struct ReportSubmissionGateway {
    store: Arc<dyn ReportStore>,
}

impl ReportSubmissionGateway {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    pub async fn submit(&self, items: &[ProcessedItem]) -> AppResult<SubmissionReport> {
        if items.is_empty() {
            return Err(ValidationError::EmptyBatch { what: "报表记录" }.into());
        }

        logging::log_batch_start("保存", items.len());

        let payloads: Vec<ReportPayload> = items.iter().map(to_payload).collect();
        let results = self.store.save_reports(&payloads).await?;

        if results.len() != payloads.len() {
            warn!(
                "⚠️ 保存结果数量 ({}) 与提交数量 ({}) 不一致",
                results.len(),
                payloads.len()
            );
        }

        let report = SubmissionReport { results };
        if let Some(message) = report.first_error_message() {
            warn!("⚠️ 部分记录保存失败: {}", message);
        } else {
            info!("✓ 全部记录已保存");
        }
        logging::log_batch_complete("保存", report.success_count(), items.len());

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{
        AccessUrl, CorrelationId, ReportBatch, ReportQuery, StorageReference, SubmissionStatus,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedStore {
        results: Vec<SubmissionResult>,
        fail_transport: bool,
        saved: Mutex<Vec<ReportPayload>>,
    }

    #[async_trait]
    impl ReportStore for ScriptedStore {
        async fn save_reports(
            &self,
            payloads: &[ReportPayload],
        ) -> AppResult<Vec<SubmissionResult>> {
            if self.fail_transport {
                return Err(AppError::bad_response("save-report", 502, None));
            }
            self.saved.lock().unwrap().extend_from_slice(payloads);
            Ok(self.results.clone())
        }

        async fn fetch_reports(&self, _query: &ReportQuery) -> AppResult<ReportBatch> {
            Ok(ReportBatch::default())
        }
    }

    fn item(ai: u32, manual: Option<u32>) -> ProcessedItem {
        ProcessedItem {
            id: CorrelationId::new(),
            reference: StorageReference::from_parts("captures", "a.jpg"),
            access_url: AccessUrl::new("https://dl/a.jpg"),
            ai_count: ai,
            description: "三枚戒指".to_string(),
            manual_count: manual,
            notes: "托盘 A".to_string(),
            service_item_id: None,
        }
    }

    fn ok() -> SubmissionResult {
        SubmissionResult {
            status: SubmissionStatus::Success,
            message: None,
        }
    }

    fn failed(message: &str) -> SubmissionResult {
        SubmissionResult {
            status: SubmissionStatus::Error,
            message: Some(message.to_string()),
        }
    }

    #[tokio::test]
    async fn test_manual_count_defaults_to_ai_count() {
        let store = Arc::new(ScriptedStore {
            results: vec![ok(), ok()],
            fail_transport: false,
            saved: Mutex::new(Vec::new()),
        });
        let gateway = ReportSubmissionGateway::new(store.clone());

        let report = gateway.submit(&[item(3, None), item(4, Some(5))]).await.unwrap();
        assert!(report.all_succeeded());

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved[0].manual_count, 3);
        assert_eq!(saved[1].manual_count, 5);
        assert_eq!(saved[0].image_url, "gs://captures/a.jpg");
        assert_eq!(saved[0].notes, "托盘 A");
    }

    #[tokio::test]
    async fn test_first_error_is_surfaced() {
        let store = Arc::new(ScriptedStore {
            results: vec![ok(), failed("重复记录"), failed("数量无效")],
            fail_transport: false,
            saved: Mutex::new(Vec::new()),
        });
        let gateway = ReportSubmissionGateway::new(store);

        let report = gateway
            .submit(&[item(1, None), item(2, None), item(3, None)])
            .await
            .unwrap();
        assert!(!report.all_succeeded());
        assert_eq!(report.success_count(), 1);
        assert_eq!(report.first_error_message().as_deref(), Some("重复记录"));
    }

    #[tokio::test]
    async fn test_transport_failure_rejects_batch() {
        let store = Arc::new(ScriptedStore {
            results: Vec::new(),
            fail_transport: true,
            saved: Mutex::new(Vec::new()),
        });
        let gateway = ReportSubmissionGateway::new(store);
        assert!(gateway.submit(&[item(1, None)]).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_submission_is_rejected() {
        let store = Arc::new(ScriptedStore {
            results: Vec::new(),
            fail_transport: false,
            saved: Mutex::new(Vec::new()),
        });
        let gateway = ReportSubmissionGateway::new(store.clone());
        let err = gateway.submit(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::EmptyBatch { .. })));
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_error_without_message_has_fallback() {
        let report = SubmissionReport {
            results: vec![SubmissionResult {
                status: SubmissionStatus::Error,
                message: None,
            }],
        };
        assert_eq!(report.first_error_message().as_deref(), Some("保存失败"));
    }
}
