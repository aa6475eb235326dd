//! 计数处理协调
//!
//! 一批存储引用一次提交给计数服务，返回结果按位置对应输入；
//! 若每个结果都回传了已知的关联 ID，则按 ID 对应。

use crate::clients::CountingService;
use crate::error::{ApiError, AppResult, ValidationError};
use crate::models::{
    AccessUrl, CorrelationId, CountItem, CountRequest, ProcessedItem, StorageReference,
    UploadedFile,
};
use crate::utils::logging;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const PROCESS_ENDPOINT: &str = "process-ai";

struct ProcessInput {
    id: CorrelationId,
    reference: StorageReference,
    access_url: AccessUrl,
}

/// 计数处理协调器
#[derive(Clone)]
pub struct ProcessingCoordinator {
    counter: Arc<dyn CountingService>,
}

impl ProcessingCoordinator {
    pub fn new(counter: Arc<dyn CountingService>) -> Self {
        Self { counter }
    }

    /// 处理已上传的文件，结果与输入顺序一致
    pub async fn process(
        &self,
        uploaded: &[UploadedFile],
        prompt: &str,
    ) -> AppResult<Vec<ProcessedItem>> {
        let inputs = uploaded
            .iter()
            .map(|file| ProcessInput {
                id: file.id,
                reference: file.reference.clone(),
                access_url: file.access_url.clone(),
            })
            .collect();
        self.run(inputs, prompt).await
    }

    /// 处理已有的存储引用
    ///
    /// 访问链接暂用引用本身，展示前应经过签名缓存解析。
    pub async fn process_references(
        &self,
        references: &[StorageReference],
        prompt: &str,
    ) -> AppResult<Vec<ProcessedItem>> {
        let inputs = references
            .iter()
            .map(|reference| ProcessInput {
                id: CorrelationId::new(),
                reference: reference.clone(),
                access_url: AccessUrl::new(reference.as_str()),
            })
            .collect();
        self.run(inputs, prompt).await
    }

    async fn run(&self, inputs: Vec<ProcessInput>, prompt: &str) -> AppResult<Vec<ProcessedItem>> {
        if inputs.is_empty() {
            return Err(ValidationError::EmptyBatch { what: "计数文件" }.into());
        }

        logging::log_batch_start("计数", inputs.len());

        let request = CountRequest {
            file_uris: inputs.iter().map(|i| i.reference.to_string()).collect(),
            prompt: prompt.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_ids: inputs.iter().map(|i| i.id.to_string()).collect(),
        };

        let items = self.counter.count(&request).await?.into_items();
        if items.len() != inputs.len() {
            return Err(ApiError::ResultCountMismatch {
                endpoint: PROCESS_ENDPOINT.to_string(),
                expected: inputs.len(),
                actual: items.len(),
            }
            .into());
        }

        let ordered = match align_by_correlation(&inputs, items) {
            Ok(aligned) => {
                debug!("按关联 ID 对应计数结果");
                aligned
            }
            Err(positional) => positional,
        };

        let processed: Vec<ProcessedItem> = inputs
            .into_iter()
            .zip(ordered)
            .map(|(input, item)| ProcessedItem {
                id: input.id,
                reference: input.reference,
                access_url: input.access_url,
                ai_count: item.count,
                description: item.description,
                manual_count: Some(item.count),
                notes: String::new(),
                service_item_id: item.image_id,
            })
            .collect();

        for item in &processed {
            info!(
                "[{}] 🔢 AI 计数: {} - {}",
                item.reference.path(),
                item.ai_count,
                logging::truncate_text(&item.description, 40)
            );
        }
        logging::log_batch_complete("计数", processed.len(), processed.len());

        Ok(processed)
    }
}

/// 每个结果都回传了唯一且已知的关联 ID 时按 ID 重排；否则原样（按位置）返回
fn align_by_correlation(
    inputs: &[ProcessInput],
    items: Vec<CountItem>,
) -> Result<Vec<CountItem>, Vec<CountItem>> {
    let index: HashMap<CorrelationId, usize> =
        inputs.iter().enumerate().map(|(i, input)| (input.id, i)).collect();

    let mut targets = Vec::with_capacity(items.len());
    let mut taken = vec![false; inputs.len()];
    for item in &items {
        let target = item
            .correlation_id
            .as_deref()
            .and_then(CorrelationId::parse)
            .and_then(|id| index.get(&id).copied());
        match target {
            Some(i) if !taken[i] => {
                taken[i] = true;
                targets.push(i);
            }
            _ => return Err(items),
        }
    }

    let mut slots: Vec<Option<CountItem>> = vec![None; inputs.len()];
    for (item, target) in items.into_iter().zip(targets) {
        slots[target] = Some(item);
    }
    Ok(slots.into_iter().flatten().collect())
}
