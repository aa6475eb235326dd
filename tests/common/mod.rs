//! 集成测试共用的内存协作方
#![allow(dead_code)]

use async_trait::async_trait;
use gem_tally::clients::{
    CountingService, ObjectStore, ReportStore, UploadNotifier, UrlSigner, UserDirectory,
};
use gem_tally::error::{AppError, AppResult};
use gem_tally::models::{
    AccessUrl, CorrelationId, CountItem, CountRequest, CountResponse, KnownUser, ReportBatch,
    ReportPayload, ReportQuery, ReportRecord, SignedUrl, StorageReference, SubmissionResult,
    SubmissionStatus, TransferProgress, TransferReceipt, UploadFile,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

pub const UPLOADER: &str = "staff@example.com";

/// 内存对象存储：指定文件名在传输中途失败
#[derive(Default)]
pub struct MemoryStore {
    pub failing: Mutex<HashSet<String>>,
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, file_name: &str) {
        self.failing.lock().unwrap().insert(file_name.to_string());
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        "captures"
    }

    async fn put_object(
        &self,
        path: &str,
        file: &UploadFile,
        progress: UnboundedSender<TransferProgress>,
    ) -> AppResult<TransferReceipt> {
        let total = file.size();
        let _ = progress.send(TransferProgress {
            bytes_transferred: total / 2,
            total_bytes: total,
        });
        tokio::task::yield_now().await;

        if self.failing.lock().unwrap().contains(&file.file_name) {
            return Err(AppError::transfer_failed(&file.file_name, "网络中断"));
        }

        let _ = progress.send(TransferProgress {
            bytes_transferred: total,
            total_bytes: total,
        });
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), file.bytes.clone());

        Ok(TransferReceipt {
            access_url: AccessUrl::new(format!("https://dl.example/captures/{}", path)),
        })
    }
}

/// 内存后端：签名、计数、报表、用户列表、上传通知
pub struct MemoryBackend {
    pub records: Mutex<Vec<ReportRecord>>,
    pub queries: Mutex<Vec<ReportQuery>>,
    pub notified: Mutex<Vec<CorrelationId>>,
    pub sign_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub fail_counting: AtomicBool,
    /// 第 n 条记录保存失败并返回该信息
    pub reject_save: Mutex<Option<(usize, String)>>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            notified: Mutex::new(Vec::new()),
            sign_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            fail_counting: AtomicBool::new(false),
            reject_save: Mutex::new(None),
        })
    }

    pub fn saved(&self) -> Vec<ReportRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl UrlSigner for MemoryBackend {
    async fn sign(&self, reference: &StorageReference) -> AppResult<SignedUrl> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SignedUrl {
            url: AccessUrl::new(format!("https://signed.example/{}", reference.path())),
            expires_in: Duration::from_secs(3600),
        })
    }
}

#[async_trait]
impl CountingService for MemoryBackend {
    async fn count(&self, request: &CountRequest) -> AppResult<CountResponse> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_counting.load(Ordering::SeqCst) {
            return Err(AppError::bad_response(
                "process-ai",
                500,
                Some("AI processing failed".to_string()),
            ));
        }

        let items = request
            .correlation_ids
            .iter()
            .enumerate()
            .map(|(i, id)| CountItem {
                count: i as u32 + 3,
                description: format!("第 {} 盘：戒指和耳环", i + 1),
                image_id: Some(format!("img-{}", i)),
                correlation_id: Some(id.clone()),
            })
            .collect();
        Ok(CountResponse::from_items(items))
    }
}

#[async_trait]
impl ReportStore for MemoryBackend {
    async fn save_reports(&self, payloads: &[ReportPayload]) -> AppResult<Vec<SubmissionResult>> {
        let reject = self.reject_save.lock().unwrap().clone();
        let now = chrono::Utc::now();
        let mut records = self.records.lock().unwrap();

        let results = payloads
            .iter()
            .enumerate()
            .map(|(i, payload)| match &reject {
                Some((index, message)) if *index == i => SubmissionResult {
                    status: SubmissionStatus::Error,
                    message: Some(message.clone()),
                },
                _ => {
                    records.push(ReportRecord {
                        image_url: Some(payload.image_url.clone()),
                        ai_count: Some(f64::from(payload.ai_count)),
                        manual_count: Some(f64::from(payload.manual_count)),
                        ai_description: Some(payload.ai_description.clone()),
                        notes: Some(payload.notes.clone()),
                        user_email: Some(UPLOADER.to_string()),
                        created_at: Some(now + chrono::Duration::milliseconds(i as i64)),
                        ..Default::default()
                    });
                    SubmissionResult {
                        status: SubmissionStatus::Success,
                        message: None,
                    }
                }
            })
            .collect();
        Ok(results)
    }

    async fn fetch_reports(&self, query: &ReportQuery) -> AppResult<ReportBatch> {
        self.queries.lock().unwrap().push(query.clone());

        let mut records = self.records.lock().unwrap().clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let start = match &query.cursor {
            Some(cursor) => records
                .iter()
                .position(|r| {
                    r.created_at == Some(cursor.last_created_at)
                        && r.image_url.as_deref() == Some(cursor.last_storage_reference.as_str())
                })
                .map(|i| i + 1)
                .unwrap_or(records.len()),
            None => 0,
        };

        Ok(ReportBatch::from_records(
            records.into_iter().skip(start).take(query.limit).collect(),
        ))
    }
}

#[async_trait]
impl UserDirectory for MemoryBackend {
    async fn list_users(&self) -> AppResult<Vec<KnownUser>> {
        Ok(vec![KnownUser {
            uid: "u-1".to_string(),
            email: Some(UPLOADER.to_string()),
            display_name: Some("门店员工".to_string()),
        }])
    }
}

#[async_trait]
impl UploadNotifier for MemoryBackend {
    async fn notify_uploaded(&self, ids: &[CorrelationId]) -> AppResult<()> {
        self.notified.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }
}

/// 最小的 JPEG 文件头 + 填充
pub fn jpeg(name: &str, size: usize) -> UploadFile {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(size.max(4), 0);
    UploadFile::new(name, "image/jpeg", bytes)
}
