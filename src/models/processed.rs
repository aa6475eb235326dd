use crate::models::reference::{AccessUrl, CorrelationId, StorageReference};
use serde::{Deserialize, Serialize};

/// 计数服务处理后的单个条目，复核前可以修改人工计数和备注
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedItem {
    pub id: CorrelationId,
    pub reference: StorageReference,
    pub access_url: AccessUrl,
    pub ai_count: u32,
    pub description: String,
    /// 默认等于 `ai_count`，用户可清空或修改
    pub manual_count: Option<u32>,
    pub notes: String,
    /// 计数服务返回的条目 ID（如有）
    pub service_item_id: Option<String>,
}

impl ProcessedItem {
    /// 提交时使用的人工计数：未设置时回退为 AI 计数
    pub fn effective_manual_count(&self) -> u32 {
        self.manual_count.unwrap_or(self.ai_count)
    }
}

/// 计数服务请求体
#[derive(Debug, Clone, Serialize)]
pub struct CountRequest {
    pub file_uris: Vec<String>,
    pub prompt: String,
    pub timestamp: String,
    pub correlation_ids: Vec<String>,
}

/// 计数服务返回的单个结果
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CountItem {
    pub count: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "imageID")]
    pub image_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct CountData {
    #[serde(default)]
    items: Vec<CountItem>,
}

/// 计数服务响应：`{data: {items: [...]}}`，也接受顶层 `items`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CountResponse {
    #[serde(default)]
    data: Option<CountData>,
    #[serde(default)]
    items: Option<Vec<CountItem>>,
}

impl CountResponse {
    pub fn from_items(items: Vec<CountItem>) -> Self {
        Self {
            data: Some(CountData { items }),
            items: None,
        }
    }

    pub fn into_items(self) -> Vec<CountItem> {
        match (self.data, self.items) {
            (Some(data), _) if !data.items.is_empty() => data.items,
            (_, Some(items)) => items,
            (Some(data), None) => data.items,
            (None, None) => Vec::new(),
        }
    }
}
