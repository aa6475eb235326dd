//! 拍照计数流程 - 流程层
//!
//! 核心职责：定义"一批照片"从选择到保存的完整流程
//!
//! 阶段顺序：
//! 1. Idle → Selected：选择文件（逐个校验）
//! 2. Selected → Uploading → Processing → Complete：上传（全有或全无）并计数
//! 3. Complete：复核，修改人工计数和备注
//! 4. Complete → Saved：提交报表
//!
//! 上传或计数失败时回到 Selected，保留已选文件和错误信息。

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::{ProcessedItem, UploadEvent, UploadFile, UploadTask};
use crate::services::{
    ProcessingCoordinator, ReportSubmissionGateway, SubmissionReport, UploadOrchestrator,
};
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

/// 流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Idle,
    Selected,
    Uploading,
    Processing,
    Complete,
    Saved,
}

impl fmt::Display for CaptureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureStage::Idle => "空闲",
            CaptureStage::Selected => "已选择",
            CaptureStage::Uploading => "上传中",
            CaptureStage::Processing => "计数中",
            CaptureStage::Complete => "待复核",
            CaptureStage::Saved => "已保存",
        };
        f.write_str(name)
    }
}

/// 拍照计数流程
///
/// - 持有当前选择、上传任务和计数结果
/// - 只依赖业务能力（services）
pub struct CaptureFlow {
    uploader: UploadOrchestrator,
    processor: ProcessingCoordinator,
    gateway: ReportSubmissionGateway,
    stage: CaptureStage,
    selected: Vec<UploadFile>,
    tasks: Vec<UploadTask>,
    items: Vec<ProcessedItem>,
    last_error: Option<String>,
    progress: Option<UnboundedSender<UploadEvent>>,
}

impl CaptureFlow {
    pub fn new(
        uploader: UploadOrchestrator,
        processor: ProcessingCoordinator,
        gateway: ReportSubmissionGateway,
    ) -> Self {
        Self {
            uploader,
            processor,
            gateway,
            stage: CaptureStage::Idle,
            selected: Vec::new(),
            tasks: Vec::new(),
            items: Vec::new(),
            last_error: None,
            progress: None,
        }
    }

    pub fn stage(&self) -> CaptureStage {
        self.stage
    }

    pub fn selected(&self) -> &[UploadFile] {
        &self.selected
    }

    /// 最近一次上传的任务状态
    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn items(&self) -> &[ProcessedItem] {
        &self.items
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// 选择文件，返回被拒绝的文件及原因；有效文件追加到当前选择
    pub fn select_files(&mut self, files: Vec<UploadFile>) -> Vec<ValidationError> {
        if matches!(self.stage, CaptureStage::Complete | CaptureStage::Saved) {
            if self.stage == CaptureStage::Complete {
                warn!("⚠️ 丢弃未保存的 {} 条计数结果", self.items.len());
            }
            self.reset();
        }

        let (accepted, rejected) = self.uploader.validator().partition(files);
        for reason in &rejected {
            warn!("⚠️ {}", reason);
        }

        self.selected.extend(accepted);
        self.last_error = None;
        if !self.selected.is_empty() {
            self.stage = CaptureStage::Selected;
        }
        rejected
    }

    /// 移除一个已选文件；移除最后一个后回到 Idle
    pub fn remove_file(&mut self, index: usize) -> Option<UploadFile> {
        if self.stage != CaptureStage::Selected || index >= self.selected.len() {
            return None;
        }
        let removed = self.selected.remove(index);
        if self.selected.is_empty() {
            self.stage = CaptureStage::Idle;
        }
        Some(removed)
    }

    /// 订阅下一次上传的进度事件；丢弃接收方不影响上传
    pub fn subscribe_progress(&mut self) -> UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress = Some(tx);
        rx
    }

    /// 上传并计数
    pub async fn upload_and_process(&mut self, prompt: &str) -> AppResult<&[ProcessedItem]> {
        let mut progress = self.progress.take();
        if self.stage != CaptureStage::Selected || self.selected.is_empty() {
            return Err(ValidationError::EmptyBatch { what: "已选文件" }.into());
        }

        self.stage = CaptureStage::Uploading;
        self.last_error = None;
        info!("📤 [{}] 共 {} 个文件", self.stage, self.selected.len());

        let mut run = self.uploader.start(self.selected.clone());
        while let Some(event) = run.next_event().await {
            if let Some(tx) = &progress {
                if tx.send(event).is_err() {
                    progress = None;
                }
            }
        }
        self.tasks = run.tasks().to_vec();

        let uploaded = match run.finish().await.into_uploaded() {
            Ok(uploaded) => uploaded,
            Err(e) => return Err(self.fail(e)),
        };

        self.stage = CaptureStage::Processing;
        info!("🔢 [{}] 共 {} 个文件", self.stage, uploaded.len());

        match self.processor.process(&uploaded, prompt).await {
            Ok(items) => {
                self.items = items;
                self.selected.clear();
                self.stage = CaptureStage::Complete;
                info!("✓ 计数完成，等待复核");
                Ok(self.items.as_slice())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, err: AppError) -> AppError {
        error!("❌ [{}] 失败: {}", self.stage, err);
        self.stage = CaptureStage::Selected;
        self.last_error = Some(err.user_message());
        err
    }

    /// 修改人工计数（`None` 表示清空，提交时回退为 AI 计数）
    pub fn update_manual_count(&mut self, index: usize, manual_count: Option<u32>) -> bool {
        match self.editable_item(index) {
            Some(item) => {
                item.manual_count = manual_count;
                true
            }
            None => false,
        }
    }

    pub fn update_notes(&mut self, index: usize, notes: impl Into<String>) -> bool {
        match self.editable_item(index) {
            Some(item) => {
                item.notes = notes.into();
                true
            }
            None => false,
        }
    }

    fn editable_item(&mut self, index: usize) -> Option<&mut ProcessedItem> {
        if self.stage != CaptureStage::Complete {
            return None;
        }
        self.items.get_mut(index)
    }

    /// 提交报表
    ///
    /// 传输失败或任一记录失败时保持 Complete 并记录第一条错误；全部成功后进入 Saved。
    pub async fn save(&mut self) -> AppResult<SubmissionReport> {
        if self.stage != CaptureStage::Complete {
            return Err(ValidationError::EmptyBatch { what: "待保存结果" }.into());
        }

        match self.gateway.submit(&self.items).await {
            Ok(report) => {
                if report.all_succeeded() {
                    self.stage = CaptureStage::Saved;
                    self.last_error = None;
                    info!("✓ 已保存 {} 条记录", report.results.len());
                } else {
                    self.last_error = report.first_error_message();
                }
                Ok(report)
            }
            Err(e) => {
                error!("❌ 保存失败: {}", e);
                self.last_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// 回到 Idle
    pub fn reset(&mut self) {
        self.stage = CaptureStage::Idle;
        self.selected.clear();
        self.tasks.clear();
        self.items.clear();
        self.last_error = None;
        self.progress = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{CountingService, ObjectStore, ReportStore};
    use crate::models::{
        CountRequest, CountResponse, ReportBatch, ReportPayload, ReportQuery, SubmissionResult,
        TransferProgress, TransferReceipt,
    };
    use crate::services::FileValidator;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// 所有调用都失败的协作方
    struct Offline;

    #[async_trait]
    impl ObjectStore for Offline {
        fn bucket(&self) -> &str {
            "captures"
        }

        async fn put_object(
            &self,
            _path: &str,
            file: &UploadFile,
            _progress: UnboundedSender<TransferProgress>,
        ) -> AppResult<TransferReceipt> {
            Err(AppError::transfer_failed(&file.file_name, "离线"))
        }
    }

    #[async_trait]
    impl CountingService for Offline {
        async fn count(&self, _request: &CountRequest) -> AppResult<CountResponse> {
            Err(AppError::bad_response("process-ai", 503, None))
        }
    }

    #[async_trait]
    impl ReportStore for Offline {
        async fn save_reports(&self, _payloads: &[ReportPayload]) -> AppResult<Vec<SubmissionResult>> {
            Err(AppError::bad_response("save-report", 503, None))
        }

        async fn fetch_reports(&self, _query: &ReportQuery) -> AppResult<ReportBatch> {
            Ok(ReportBatch::default())
        }
    }

    fn offline_flow() -> CaptureFlow {
        let offline = Arc::new(Offline);
        CaptureFlow::new(
            UploadOrchestrator::new(offline.clone(), FileValidator::new(1024)),
            ProcessingCoordinator::new(offline.clone()),
            ReportSubmissionGateway::new(offline),
        )
    }

    fn photo(name: &str) -> UploadFile {
        UploadFile::new(name, "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0])
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(CaptureStage::Idle.to_string(), "空闲");
        assert_eq!(CaptureStage::Complete.to_string(), "待复核");
    }

    #[test]
    fn test_only_invalid_files_stay_idle() {
        let mut flow = offline_flow();
        let rejected = flow.select_files(vec![UploadFile::new("a.pdf", "application/pdf", vec![1])]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(flow.stage(), CaptureStage::Idle);
        assert!(flow.selected().is_empty());
    }

    #[tokio::test]
    async fn test_edits_and_save_require_review_stage() {
        let mut flow = offline_flow();
        flow.select_files(vec![photo("a.jpg")]);

        assert!(!flow.update_manual_count(0, Some(2)));
        assert!(!flow.update_notes(0, "x"));
        assert!(flow.save().await.is_err());
        assert_eq!(flow.stage(), CaptureStage::Selected);
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_selection_and_accepts_more() {
        let mut flow = offline_flow();
        flow.select_files(vec![photo("a.jpg")]);

        assert!(flow.upload_and_process("").await.is_err());
        assert_eq!(flow.stage(), CaptureStage::Selected);
        assert_eq!(flow.tasks().len(), 1);
        assert!(flow.last_error().is_some());

        flow.select_files(vec![photo("b.jpg")]);
        assert_eq!(flow.selected().len(), 2);
        assert!(flow.last_error().is_none());

        flow.reset();
        assert_eq!(flow.stage(), CaptureStage::Idle);
        assert!(flow.selected().is_empty() && flow.tasks().is_empty());
    }
}
