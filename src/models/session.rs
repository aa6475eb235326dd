//! 会话与日期分组（派生视图，不持久化）

use crate::models::report::ReportRecord;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// AI / 人工 / 差异合计
///
/// 服务端读回的计数可能带小数，合计按 `f64` 计算。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub ai: f64,
    pub manual: f64,
    pub variance: f64,
}

impl SessionSummary {
    /// 累加一条记录：`variance += manual - ai`
    pub fn add(&mut self, record: &ReportRecord) {
        let ai = record.ai();
        let manual = record.manual();
        self.ai += ai;
        self.manual += manual;
        self.variance += manual - ai;
    }
}

/// 同一上传者在时间窗口内的一组记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSession {
    pub uploader: Option<String>,
    /// 会话第一条（最新）记录的时间
    pub anchor: Option<DateTime<Utc>>,
    pub records: Vec<ReportRecord>,
    pub summary: SessionSummary,
}

impl ReportSession {
    pub fn uploader_label(&self) -> &str {
        self.uploader.as_deref().unwrap_or("未知上传者")
    }
}

/// 按日历日分组的会话（仅用于展示排序）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    /// `None` 表示时间缺失
    pub day: Option<NaiveDate>,
    pub label: String,
    pub sessions: Vec<ReportSession>,
}
