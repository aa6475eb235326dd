//! 多文件上传编排
//!
//! ## 职责
//!
//! 1. **校验**：逐个文件校验，被拒绝的文件不影响其它文件
//! 2. **并发上传**：每个文件一个 tokio 任务
//! 3. **进度事件**：百分比只在增加时发出
//! 4. **结果汇总**：按输入顺序收集每个文件的结果，单个失败不会中断其它文件
//! 5. **上传通知**：批次结束后尽力通知后端，失败只记录日志

use crate::clients::{ObjectStore, UploadNotifier};
use crate::error::{AppError, AppResult, UploadError, ValidationError};
use crate::models::{
    CorrelationId, StorageReference, UploadEvent, UploadFile, UploadState, UploadTask,
    UploadedFile,
};
use crate::services::validation::FileValidator;
use crate::utils::logging;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 按日期分区的存储路径：`YYYYMMDD/<uuid>.<ext>`
pub fn storage_path_for(date: NaiveDate, id: CorrelationId, file: &UploadFile) -> String {
    format!("{}/{}.{}", date.format("%Y%m%d"), id, file.extension())
}

/// 单个文件的上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(UploadedFile),
    Failed {
        id: CorrelationId,
        file_name: String,
        message: String,
    },
}

/// 一个批次的上传结果
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    /// 与有效文件的输入顺序一致
    pub outcomes: Vec<UploadOutcome>,
    /// 校验未通过的文件
    pub rejected: Vec<ValidationError>,
}

impl UploadReport {
    pub fn successes(&self) -> impl Iterator<Item = &UploadedFile> {
        self.outcomes.iter().filter_map(|o| match o {
            UploadOutcome::Uploaded(file) => Some(file),
            UploadOutcome::Failed { .. } => None,
        })
    }

    /// 失败的文件名及原因
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            UploadOutcome::Failed {
                file_name, message, ..
            } => Some((file_name.as_str(), message.as_str())),
            UploadOutcome::Uploaded(_) => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    /// 全有或全无：任一文件失败则整个批次失败
    pub fn into_uploaded(self) -> AppResult<Vec<UploadedFile>> {
        if self.outcomes.is_empty() {
            return Err(ValidationError::EmptyBatch { what: "上传文件" }.into());
        }

        let failed: Vec<&str> = self.failures().map(|(name, _)| name).collect();
        if !failed.is_empty() {
            return Err(UploadError::BatchIncomplete {
                failed: failed.len(),
                total: self.outcomes.len(),
                files: failed.join(", "),
            }
            .into());
        }

        Ok(self
            .outcomes
            .into_iter()
            .filter_map(|o| match o {
                UploadOutcome::Uploaded(file) => Some(file),
                UploadOutcome::Failed { .. } => None,
            })
            .collect())
    }
}

struct PendingUpload {
    id: CorrelationId,
    file_name: String,
    handle: JoinHandle<AppResult<UploadedFile>>,
}

/// 进行中的上传批次
///
/// `next_event()` 读取进度事件；不读取或提前调用 `finish()` 都是安全的，
/// 之后的事件会被丢弃。
pub struct UploadRun {
    tasks: Vec<UploadTask>,
    rejected: Vec<ValidationError>,
    events: UnboundedReceiver<UploadEvent>,
    pending: Vec<PendingUpload>,
    notifier: Option<Arc<dyn UploadNotifier>>,
}

impl UploadRun {
    /// 每个有效文件对应的上传任务（随事件更新）
    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn rejected(&self) -> &[ValidationError] {
        &self.rejected
    }

    /// 下一个进度事件；所有文件结束后返回 `None`
    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        let event = self.events.recv().await?;
        for task in &mut self.tasks {
            task.apply(&event);
        }
        Some(event)
    }

    /// 等待所有文件结束并汇总结果
    pub async fn finish(self) -> UploadReport {
        let UploadRun {
            rejected,
            events,
            pending,
            notifier,
            ..
        } = self;
        drop(events);

        let total = pending.len();
        let mut outcomes = Vec::with_capacity(total);

        for upload in pending {
            let outcome = match upload.handle.await {
                Ok(Ok(file)) => UploadOutcome::Uploaded(file),
                Ok(Err(e)) => UploadOutcome::Failed {
                    id: upload.id,
                    file_name: upload.file_name,
                    message: e.to_string(),
                },
                Err(join_err) => {
                    let err = UploadError::TaskAborted {
                        file_name: upload.file_name.clone(),
                        message: join_err.to_string(),
                    };
                    error!("❌ {}", err);
                    UploadOutcome::Failed {
                        id: upload.id,
                        file_name: upload.file_name,
                        message: err.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let report = UploadReport { outcomes, rejected };
        logging::log_batch_complete("上传", report.successes().count(), total);

        if let Some(notifier) = notifier {
            notify_best_effort(notifier.as_ref(), &report).await;
        }

        report
    }
}

/// 上传编排器
#[derive(Clone)]
pub struct UploadOrchestrator {
    store: Arc<dyn ObjectStore>,
    validator: FileValidator,
    notifier: Option<Arc<dyn UploadNotifier>>,
}

impl UploadOrchestrator {
    pub fn new(store: Arc<dyn ObjectStore>, validator: FileValidator) -> Self {
        Self {
            store,
            validator,
            notifier: None,
        }
    }

    /// 批次结束后通知后端
    pub fn with_notifier(mut self, notifier: Arc<dyn UploadNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn validator(&self) -> &FileValidator {
        &self.validator
    }

    /// 校验并为每个有效文件启动一个上传任务
    pub fn start(&self, files: Vec<UploadFile>) -> UploadRun {
        let (accepted, rejected) = self.validator.partition(files);
        for reason in &rejected {
            warn!("⚠️ 跳过文件: {}", reason);
        }

        logging::log_batch_start("上传", accepted.len());

        let today = chrono::Local::now().date_naive();
        let (events_tx, events) = mpsc::unbounded_channel();
        let mut tasks = Vec::with_capacity(accepted.len());
        let mut pending = Vec::with_capacity(accepted.len());

        for file in accepted {
            let id = CorrelationId::new();
            let path = storage_path_for(today, id, &file);

            tasks.push(UploadTask {
                id,
                file_name: file.file_name.clone(),
                size: file.size(),
                storage_path: path.clone(),
                reference: None,
                progress_percent: 0,
                state: UploadState::Queued,
                error: None,
            });

            let file_name = file.file_name.clone();
            let store = Arc::clone(&self.store);
            let events_tx = events_tx.clone();
            let handle =
                tokio::spawn(async move { transfer_one(store, id, path, file, events_tx).await });

            pending.push(PendingUpload {
                id,
                file_name,
                handle,
            });
        }

        UploadRun {
            tasks,
            rejected,
            events,
            pending,
            notifier: self.notifier.clone(),
        }
    }

    /// 上传一批文件并等待全部结束
    pub async fn upload(&self, files: Vec<UploadFile>) -> UploadReport {
        let mut run = self.start(files);
        while run.next_event().await.is_some() {}
        run.finish().await
    }
}

/// 上传单个文件，转发字节进度为百分比事件
async fn transfer_one(
    store: Arc<dyn ObjectStore>,
    id: CorrelationId,
    path: String,
    file: UploadFile,
    events: UnboundedSender<UploadEvent>,
) -> AppResult<UploadedFile> {
    // 事件接收方可能已被丢弃，发送失败直接忽略
    let _ = events.send(UploadEvent::Started {
        id,
        file_name: file.file_name.clone(),
    });

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let transfer = store.put_object(&path, &file, progress_tx);
    let forward = async {
        let mut last = 0u8;
        while let Some(progress) = progress_rx.recv().await {
            let percent = progress.percent();
            if percent > last {
                last = percent;
                let _ = events.send(UploadEvent::Progress {
                    id,
                    file_name: file.file_name.clone(),
                    percent,
                });
            }
        }
    };

    let (result, ()) = tokio::join!(transfer, forward);

    match result {
        Ok(receipt) => {
            let reference = StorageReference::from_parts(store.bucket(), &path);
            info!("[{}] ✓ 上传完成 → {}", file.file_name, reference);
            let _ = events.send(UploadEvent::Succeeded {
                id,
                file_name: file.file_name.clone(),
                reference: reference.clone(),
            });
            Ok(UploadedFile {
                id,
                file_name: file.file_name,
                reference,
                access_url: receipt.access_url,
            })
        }
        Err(err) => {
            error!("[{}] ❌ 上传失败: {}", file.file_name, err);
            let err = match err {
                AppError::Upload(e) => AppError::Upload(e),
                other => AppError::transfer_failed(&file.file_name, other.user_message()),
            };
            let _ = events.send(UploadEvent::Failed {
                id,
                file_name: file.file_name.clone(),
                message: err.to_string(),
            });
            Err(err)
        }
    }
}

async fn notify_best_effort(notifier: &dyn UploadNotifier, report: &UploadReport) {
    let ids: Vec<CorrelationId> = report.successes().map(|f| f.id).collect();
    if ids.is_empty() {
        return;
    }
    if let Err(e) = notifier.notify_uploaded(&ids).await {
        warn!("⚠️ 上传通知失败（已忽略）: {}", e);
    }
}
