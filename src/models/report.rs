//! 报表记录、提交结果与分页模型

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

/// 提交给持久化服务的单条记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub image_url: String,
    pub ai_count: u32,
    pub manual_count: u32,
    pub ai_description: String,
    pub notes: String,
}

/// 单条提交状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Success,
    Error,
}

/// 单条提交结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub status: SubmissionStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl SubmissionResult {
    pub fn is_success(&self) -> bool {
        self.status == SubmissionStatus::Success
    }
}

/// 已持久化的报表记录（从服务端读回，所有字段均可能缺失）
///
/// 计数按数字读取，允许小数和数字字符串；类型不符的单个字段视为缺失，不影响整条记录。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportRecord {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_number")]
    pub ai_count: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_number")]
    pub manual_count: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub ai_description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub user_email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp_iso: Option<DateTime<Utc>>,
    /// 服务端给出的日期（`YYYY-MM-DD`）
    #[serde(default, deserialize_with = "deserialize_text")]
    pub date_str: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub month_str: Option<String>,
    /// 服务端计算的差异（可能缺失）
    #[serde(default, deserialize_with = "deserialize_number")]
    pub variance: Option<f64>,
}

impl ReportRecord {
    /// 记录时间：优先 `timestamp_iso`，其次 `created_at`
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp_iso.or(self.created_at)
    }

    /// 服务端给出的日期
    pub fn server_day(&self) -> Option<NaiveDate> {
        let raw = self.date_str.as_deref()?.trim();
        let date = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }

    pub fn ai(&self) -> f64 {
        self.ai_count.unwrap_or(0.0)
    }

    pub fn manual(&self) -> f64 {
        self.manual_count.unwrap_or(0.0)
    }

    /// 渲染用的键（存储引用 + 时间）
    pub fn key(&self) -> String {
        format!(
            "{}@{}",
            self.image_url.as_deref().unwrap_or(""),
            self.timestamp()
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default()
        )
    }
}

fn deserialize_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<JsonValue> = Option::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(number_from_json))
}

fn number_from_json(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<JsonValue> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(JsonValue::String(s)) => Some(s),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// 时间字段既可能是 RFC3339，也可能是不带时区的 ISO 字符串（按 UTC 处理）；无法解析时视为缺失
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<JsonValue> = Option::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(JsonValue::as_str).and_then(parse_timestamp))
}

/// 解析时间字符串
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// 报表过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilters {
    pub uploader: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ReportFilters {
    /// 开始日期不能晚于结束日期
    pub fn validate(&self) -> Result<(), ValidationError> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start > end => Err(ValidationError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// 分页游标：上一页最后一条记录的时间和存储引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub last_created_at: DateTime<Utc>,
    pub last_storage_reference: String,
}

impl PageCursor {
    /// 由页面最后一条记录生成游标；缺少时间或引用时返回 `None`
    pub fn after(record: &ReportRecord) -> Option<Self> {
        Some(Self {
            last_created_at: record.created_at.or(record.timestamp_iso)?,
            last_storage_reference: record.image_url.clone().filter(|s| !s.is_empty())?,
        })
    }
}

/// 一次分页查询
#[derive(Debug, Clone)]
pub struct ReportQuery {
    pub filters: ReportFilters,
    pub cursor: Option<PageCursor>,
    pub limit: usize,
}

impl ReportQuery {
    /// 转换为查询参数，空值不发送
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(uploader) = self
            .filters
            .uploader
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            pairs.push(("user_email", uploader.to_string()));
        }
        if let Some(start) = self.filters.start_date {
            pairs.push(("start_date", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.filters.end_date {
            pairs.push(("end_date", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(cursor) = &self.cursor {
            pairs.push((
                "last_created_at",
                cursor
                    .last_created_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
            pairs.push(("last_image_url", cursor.last_storage_reference.clone()));
        }
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }
}

/// 一页记录
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<ReportRecord>,
    pub next_cursor: Option<PageCursor>,
    pub has_more: bool,
}

/// 一次读取的结果
///
/// `served` 是服务端实际返回的条数，`tail` 取自服务端返回的最后一条，
/// 两者都不受单条记录解析失败的影响。
#[derive(Debug, Clone, Default)]
pub struct ReportBatch {
    pub records: Vec<ReportRecord>,
    pub served: usize,
    pub tail: Option<PageCursor>,
}

impl ReportBatch {
    /// 由已解析的记录构造（全部记录都来自服务端）
    pub fn from_records(records: Vec<ReportRecord>) -> Self {
        Self {
            served: records.len(),
            tail: records.last().and_then(PageCursor::after),
            records,
        }
    }
}

fn cursor_from_json(item: &JsonValue) -> Option<PageCursor> {
    let timestamp = ["created_at", "timestamp_iso"]
        .iter()
        .find_map(|key| item.get(*key)?.as_str().and_then(parse_timestamp))?;
    let reference = item
        .get("image_url")?
        .as_str()
        .filter(|s| !s.is_empty())?;
    Some(PageCursor {
        last_created_at: timestamp,
        last_storage_reference: reference.to_string(),
    })
}

/// 兼容多种响应形态：数组，或包含 `data` / `items` / `reports` 数组的对象
///
/// 无法解析的单条记录会被跳过并记录警告，但仍计入 `served`。
pub fn normalize_reports(payload: JsonValue) -> ReportBatch {
    let array = match payload {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => ["data", "items", "reports"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(JsonValue::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let served = array.len();
    let tail = array.last().and_then(cursor_from_json);
    let records = array
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ReportRecord>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("⚠️ 跳过无法解析的报表记录: {}", e);
                None
            }
        })
        .collect();

    ReportBatch {
        records,
        served,
        tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_accepts_wrapped_payloads() {
        let batch = normalize_reports(json!({"reports": [{"ai_count": 2}, {"ai_count": 3}]}));
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.served, 2);

        let batch = normalize_reports(json!([{"manual_count": 1}]));
        assert_eq!(batch.records[0].manual_count, Some(1.0));

        assert!(normalize_reports(json!({"error": "x"})).records.is_empty());
        assert_eq!(normalize_reports(JsonValue::Null).served, 0);
    }

    #[test]
    fn test_fractional_and_odd_fields_keep_the_record() {
        let batch = normalize_reports(json!([
            {"image_url": "gs://b/1.jpg", "ai_count": 3, "created_at": "2025-03-01T10:00:00Z"},
            {
                "image_url": "gs://b/2.jpg",
                "ai_count": 2.0,
                "manual_count": "1.5",
                "variance": 0.5,
                "notes": {"text": "嵌套"},
                "created_at": 1740823200,
                "timestamp_iso": "2025-03-01T09:00:00Z",
            },
        ]));

        assert_eq!(batch.served, 2);
        assert_eq!(batch.records.len(), 2);
        let second = &batch.records[1];
        assert_eq!(second.ai_count, Some(2.0));
        assert_eq!(second.manual_count, Some(1.5));
        assert_eq!(second.variance, Some(0.5));
        assert!(second.notes.is_none());
        assert!(second.created_at.is_none());

        let tail = batch.tail.unwrap();
        assert_eq!(tail.last_storage_reference, "gs://b/2.jpg");
        assert_eq!(tail.last_created_at.to_rfc3339(), "2025-03-01T09:00:00+00:00");
    }

    #[test]
    fn test_tail_comes_from_last_served_item() {
        // 最后一条整体不是对象，无法解析，也没有游标字段
        let batch = normalize_reports(json!([
            {"image_url": "gs://b/1.jpg", "created_at": "2025-03-01T10:00:00Z"},
            "garbage",
        ]));
        assert_eq!(batch.served, 2);
        assert_eq!(batch.records.len(), 1);
        assert!(batch.tail.is_none());
    }

    #[test]
    fn test_server_day_prefers_date_prefix() {
        let record = ReportRecord {
            date_str: Some("2025-03-02T00:00:00".to_string()),
            ..Default::default()
        };
        assert_eq!(record.server_day(), NaiveDate::from_ymd_opt(2025, 3, 2));

        let record = ReportRecord {
            date_str: Some("March 2".to_string()),
            ..Default::default()
        };
        assert!(record.server_day().is_none());
    }

    #[test]
    fn test_timestamp_parsing_is_tolerant() {
        let record: ReportRecord = serde_json::from_value(json!({
            "created_at": "2025-03-01T10:00:00",
            "timestamp_iso": "not a date",
        }))
        .unwrap();
        assert_eq!(
            record.timestamp().unwrap().to_rfc3339(),
            "2025-03-01T10:00:00+00:00"
        );
        assert!(record.timestamp_iso.is_none());

        let record: ReportRecord =
            serde_json::from_value(json!({"created_at": "2025-03-01T10:00:00+07:00"})).unwrap();
        assert_eq!(record.timestamp().unwrap().to_rfc3339(), "2025-03-01T03:00:00+00:00");
    }

    #[test]
    fn test_filters_reject_inverted_range() {
        let filters = ReportFilters {
            uploader: None,
            start_date: NaiveDate::from_ymd_opt(2025, 3, 2),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 1),
        };
        assert!(filters.validate().is_err());
    }

    #[test]
    fn test_query_pairs_include_cursor() {
        let query = ReportQuery {
            filters: ReportFilters {
                uploader: Some("  staff@example.com ".to_string()),
                start_date: NaiveDate::from_ymd_opt(2025, 3, 1),
                end_date: None,
            },
            cursor: Some(PageCursor {
                last_created_at: parse_timestamp("2025-03-01T10:00:00Z").unwrap(),
                last_storage_reference: "gs://b/p.jpg".to_string(),
            }),
            limit: 50,
        };
        let pairs = query.query_pairs();
        assert!(pairs.contains(&("user_email", "staff@example.com".to_string())));
        assert!(pairs.contains(&("start_date", "2025-03-01".to_string())));
        assert!(pairs.contains(&("last_created_at", "2025-03-01T10:00:00.000Z".to_string())));
        assert!(pairs.contains(&("last_image_url", "gs://b/p.jpg".to_string())));
        assert!(!pairs.iter().any(|(k, _)| *k == "end_date"));
    }
}
