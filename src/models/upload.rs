//! 上传相关模型

use crate::models::reference::{AccessUrl, CorrelationId, StorageReference};
use serde::Serialize;

/// 本地选中的一个文件
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// 文件扩展名，缺省为 `jpg`
    pub fn extension(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
            _ => "jpg",
        }
    }
}

/// 上传任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Queued,
    Transferring,
    Succeeded,
    Failed,
}

/// 每个有效文件对应一个上传任务
#[derive(Debug, Clone, Serialize)]
pub struct UploadTask {
    pub id: CorrelationId,
    pub file_name: String,
    pub size: u64,
    pub storage_path: String,
    pub reference: Option<StorageReference>,
    pub progress_percent: u8,
    pub state: UploadState,
    pub error: Option<String>,
}

impl UploadTask {
    /// 应用一个进度事件，进度只增不减
    pub fn apply(&mut self, event: &UploadEvent) {
        if event.id() != self.id {
            return;
        }
        match event {
            UploadEvent::Started { .. } => {
                if self.state == UploadState::Queued {
                    self.state = UploadState::Transferring;
                }
            }
            UploadEvent::Progress { percent, .. } => {
                self.state = UploadState::Transferring;
                self.progress_percent = self.progress_percent.max(*percent);
            }
            UploadEvent::Succeeded { reference, .. } => {
                self.state = UploadState::Succeeded;
                self.progress_percent = 100;
                self.reference = Some(reference.clone());
            }
            UploadEvent::Failed { message, .. } => {
                self.state = UploadState::Failed;
                self.error = Some(message.clone());
            }
        }
    }
}

/// 传输原语上报的字节进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    /// 四舍五入后的百分比，总字节为 0 时视为 100
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let transferred = self.bytes_transferred.min(self.total_bytes) as f64;
        ((transferred / self.total_bytes as f64) * 100.0).round() as u8
    }
}

/// 传输完成后的回执
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub access_url: AccessUrl,
}

/// 上传进度事件流
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Started {
        id: CorrelationId,
        file_name: String,
    },
    Progress {
        id: CorrelationId,
        file_name: String,
        percent: u8,
    },
    Succeeded {
        id: CorrelationId,
        file_name: String,
        reference: StorageReference,
    },
    Failed {
        id: CorrelationId,
        file_name: String,
        message: String,
    },
}

impl UploadEvent {
    pub fn id(&self) -> CorrelationId {
        match self {
            UploadEvent::Started { id, .. }
            | UploadEvent::Progress { id, .. }
            | UploadEvent::Succeeded { id, .. }
            | UploadEvent::Failed { id, .. } => *id,
        }
    }
}

/// 上传成功的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: CorrelationId,
    pub file_name: String,
    pub reference: StorageReference,
    pub access_url: AccessUrl,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_fallback() {
        let file = UploadFile::new("ring.PNG", "image/png", vec![1]);
        assert_eq!(file.extension(), "PNG");
        let file = UploadFile::new("noext", "image/png", vec![1]);
        assert_eq!(file.extension(), "jpg");
        let file = UploadFile::new(".hidden", "image/png", vec![1]);
        assert_eq!(file.extension(), "jpg");
    }

    #[test]
    fn test_percent_rounding() {
        let p = TransferProgress {
            bytes_transferred: 1,
            total_bytes: 3,
        };
        assert_eq!(p.percent(), 33);
        let p = TransferProgress {
            bytes_transferred: 2,
            total_bytes: 3,
        };
        assert_eq!(p.percent(), 67);
        let p = TransferProgress {
            bytes_transferred: 0,
            total_bytes: 0,
        };
        assert_eq!(p.percent(), 100);
    }

    #[test]
    fn test_task_progress_never_decreases() {
        let id = CorrelationId::new();
        let mut task = UploadTask {
            id,
            file_name: "a.jpg".to_string(),
            size: 10,
            storage_path: "20250101/a.jpg".to_string(),
            reference: None,
            progress_percent: 0,
            state: UploadState::Queued,
            error: None,
        };
        task.apply(&UploadEvent::Progress {
            id,
            file_name: "a.jpg".to_string(),
            percent: 60,
        });
        task.apply(&UploadEvent::Progress {
            id,
            file_name: "a.jpg".to_string(),
            percent: 40,
        });
        assert_eq!(task.progress_percent, 60);
        assert_eq!(task.state, UploadState::Transferring);
    }
}
