//! 应用入口 - 编排层
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：创建 HTTP 执行器和各协作方客户端，组装服务
//! 2. **批量加载**：读取拍照文件夹中的所有照片
//! 3. **拍照流程**：上传 → 计数 → 保存，逐文件输出进度
//! 4. **报表汇总**：分页读取最近 7 天的记录，按会话和日期输出合计

use crate::clients::{
    AuthProvider, BackendClient, CountingService, HttpObjectStore, ObjectStore, ReportStore,
    StaticTokenProvider, UploadNotifier, UrlSigner, UserDirectory,
};
use crate::config::Config;
use crate::infrastructure::HttpExecutor;
use crate::models::{load_capture_folder, UploadEvent};
use crate::orchestrator::report_processor::{self, ReportOverview};
use crate::services::{
    FileValidator, ProcessingCoordinator, ReportSubmissionGateway, ResolverCache,
    UploadOrchestrator,
};
use crate::utils::{logging, RetryPolicy};
use crate::workflow::{CaptureFlow, CaptureStage};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 应用依赖的全部外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub object_store: Arc<dyn ObjectStore>,
    pub signer: Arc<dyn UrlSigner>,
    pub counter: Arc<dyn CountingService>,
    pub reports: Arc<dyn ReportStore>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: Option<Arc<dyn UploadNotifier>>,
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub capture_stage: CaptureStage,
    pub saved: usize,
    pub capture_error: Option<String>,
    pub report: ReportOverview,
}

/// 应用主结构
pub struct App {
    config: Config,
    flow: CaptureFlow,
    reports: Arc<dyn ReportStore>,
    users: Arc<dyn UserDirectory>,
    resolver: ResolverCache,
}

impl App {
    /// 初始化应用（HTTP 协作方）
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config.backend_base_url, &config.storage_bucket);

        let auth: Arc<dyn AuthProvider> = Arc::new(StaticTokenProvider::new(&config.auth_token));
        let executor = HttpExecutor::new(
            &config.backend_base_url,
            Arc::clone(&auth),
            Duration::from_secs(config.request_timeout_secs),
        )?;

        let object_store = HttpObjectStore::new(
            executor.client().clone(),
            auth,
            &config.storage_upload_url,
            &config.storage_public_url,
            &config.storage_bucket,
        )
        .with_chunk_size(config.upload_chunk_size)
        .with_max_resumes(config.upload_max_resumes);

        let backend = Arc::new(BackendClient::new(executor));

        let collaborators = Collaborators {
            object_store: Arc::new(object_store),
            signer: backend.clone(),
            counter: backend.clone(),
            reports: backend.clone(),
            users: backend.clone(),
            notifier: Some(backend),
        };

        Ok(Self::with_collaborators(config, collaborators))
    }

    /// 使用给定的协作方组装应用
    pub fn with_collaborators(config: Config, collaborators: Collaborators) -> Self {
        let mut uploader = UploadOrchestrator::new(
            collaborators.object_store,
            FileValidator::new(config.max_file_size_bytes),
        );
        if let Some(notifier) = collaborators.notifier {
            uploader = uploader.with_notifier(notifier);
        }

        let flow = CaptureFlow::new(
            uploader,
            ProcessingCoordinator::new(collaborators.counter),
            ReportSubmissionGateway::new(Arc::clone(&collaborators.reports)),
        );

        let resolver = ResolverCache::with_options(
            collaborators.signer,
            Duration::from_secs(config.signed_url_safety_margin_secs),
            RetryPolicy::new(
                config.resolve_max_attempts,
                Duration::from_millis(config.resolve_initial_backoff_ms),
                Duration::from_millis(config.resolve_max_backoff_ms),
            ),
        );

        Self {
            config,
            flow,
            reports: collaborators.reports,
            users: collaborators.users,
            resolver,
        }
    }

    /// 运行应用主逻辑
    pub async fn run(mut self) -> Result<RunSummary> {
        let (saved, capture_error) = self.run_capture().await?;

        let report = report_processor::load_report(
            Arc::clone(&self.reports),
            self.users.as_ref(),
            &self.resolver,
            &self.config,
            chrono::Local::now().date_naive(),
        )
        .await?;

        logging::print_final_stats(
            report.record_count,
            report.session_count,
            report.totals.ai,
            report.totals.manual,
            report.totals.variance,
        );
        if let Some(notice) = &report.throttled {
            warn!("⚠️ {}", notice);
        }

        Ok(RunSummary {
            capture_stage: self.flow.stage(),
            saved,
            capture_error,
            report,
        })
    }

    /// 上传、计数并保存拍照文件夹中的照片；失败只记录，不中断报表汇总
    async fn run_capture(&mut self) -> Result<(usize, Option<String>)> {
        info!("\n📁 正在扫描拍照文件夹: {}", self.config.capture_folder);
        let files = load_capture_folder(&self.config.capture_folder).await?;

        if files.is_empty() {
            warn!("⚠️ 没有找到待上传的照片");
            return Ok((0, None));
        }

        let rejected = self.flow.select_files(files);
        if !rejected.is_empty() {
            warn!("⚠️ {} 个文件未通过校验", rejected.len());
        }
        if self.flow.stage() != CaptureStage::Selected {
            return Ok((0, None));
        }

        let mut progress = self.flow.subscribe_progress();
        let progress_logger = tokio::spawn(async move {
            while let Some(event) = progress.recv().await {
                log_upload_event(&event);
            }
        });

        let processed = self
            .flow
            .upload_and_process(&self.config.prompt)
            .await
            .map(|items| items.len());
        // 流程结束后发送端已释放，日志任务随之退出
        let _ = progress_logger.await;

        if let Err(e) = processed {
            error!("❌ 拍照流程失败: {}", e);
            return Ok((0, self.flow.last_error().map(str::to_string)));
        }

        match self.flow.save().await {
            Ok(report) => Ok((report.success_count(), self.flow.last_error().map(str::to_string))),
            Err(e) => {
                error!("❌ 保存报表失败: {}", e);
                Ok((0, self.flow.last_error().map(str::to_string)))
            }
        }
    }
}

fn log_upload_event(event: &UploadEvent) {
    match event {
        UploadEvent::Started { file_name, .. } => info!("[{}] ⏫ 开始上传", file_name),
        UploadEvent::Progress {
            file_name, percent, ..
        } => info!("[{}] {}%", file_name, percent),
        UploadEvent::Succeeded { file_name, .. } => info!("[{}] ✅ 上传成功", file_name),
        UploadEvent::Failed {
            file_name, message, ..
        } => warn!("[{}] ❌ {}", file_name, message),
    }
}
