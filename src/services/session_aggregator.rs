//! 报表分页与会话聚合
//!
//! ## 职责
//!
//! 1. **游标分页**：按服务端顺序读取记录，`has_more` 由页大小判断
//! 2. **增量加载**：`ReportFeed` 持有已加载的记录，追加新页，不重排、不去重
//! 3. **会话分组**：同一上传者、与会话锚点相差不超过窗口的记录归为一个会话
//! 4. **日期分组**：按固定时区的日历日分组，仅用于展示
//! 5. **合计**：AI 计数、人工计数、差异

use crate::clients::ReportStore;
use crate::error::AppResult;
use crate::models::{
    DayGroup, Page, PageCursor, ReportFilters, ReportQuery, ReportRecord, ReportSession,
    SessionSummary,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 默认会话窗口（秒）
pub const DEFAULT_SESSION_WINDOW_SECS: i64 = 5 * 60;

/// 默认每页记录数
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// 日期范围预设：(名称, 向前追溯的天数)
pub const PRESET_RANGES: [(&str, u32); 3] = [("今天", 0), ("最近 7 天", 6), ("最近 30 天", 29)];

/// 读取一页记录
///
/// 过滤条件无效时直接返回错误，不发请求。
pub async fn paginate(
    store: &dyn ReportStore,
    filters: &ReportFilters,
    cursor: Option<&PageCursor>,
    page_size: usize,
) -> AppResult<Page> {
    filters.validate()?;

    let page_size = page_size.max(1);
    let query = ReportQuery {
        filters: filters.clone(),
        cursor: cursor.cloned(),
        limit: page_size,
    };

    let batch = store.fetch_reports(&query).await?;
    if batch.served > batch.records.len() {
        warn!(
            "⚠️ 本页 {} 条记录中有 {} 条无法解析",
            batch.served,
            batch.served - batch.records.len()
        );
    }
    // 按服务端实际返回的条数判断是否还有下一页
    let full_page = batch.served >= page_size;
    let next_cursor = batch.tail;
    let records = batch.records;

    let has_more = match (&next_cursor, full_page) {
        (_, false) => false,
        (None, true) => {
            warn!("⚠️ 末条记录缺少时间或存储引用，无法继续分页");
            false
        }
        (Some(next), true) if cursor == Some(next) => {
            warn!("⚠️ 分页游标未前进，停止加载");
            false
        }
        (Some(_), true) => true,
    };

    debug!(
        "读取 {}/{} 条记录, has_more={}",
        records.len(),
        batch.served,
        has_more
    );

    Ok(Page {
        records,
        next_cursor,
        has_more,
    })
}

/// 单次加载的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// 追加了若干条记录
    Loaded { added: usize },
    /// 已无更多记录，未发请求
    Exhausted,
    /// 被限流；已加载的记录保留，`message` 供提示使用
    Throttled { message: String },
}

/// 客户端持有的分页状态
pub struct ReportFeed {
    store: Arc<dyn ReportStore>,
    page_size: usize,
    window: Duration,
    filters: ReportFilters,
    records: Vec<ReportRecord>,
    cursor: Option<PageCursor>,
    has_more: bool,
    notice: Option<String>,
}

impl ReportFeed {
    pub fn new(store: Arc<dyn ReportStore>, page_size: usize, window: Duration) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            window,
            filters: ReportFilters::default(),
            records: Vec::new(),
            cursor: None,
            has_more: true,
            notice: None,
        }
    }

    /// 更换过滤条件并清空已加载的记录
    pub fn reset(&mut self, filters: ReportFilters) -> AppResult<()> {
        filters.validate()?;
        self.filters = filters;
        self.records.clear();
        self.cursor = None;
        self.has_more = true;
        self.notice = None;
        Ok(())
    }

    /// 加载下一页
    pub async fn load_next(&mut self) -> AppResult<LoadOutcome> {
        if !self.has_more {
            return Ok(LoadOutcome::Exhausted);
        }

        match paginate(
            self.store.as_ref(),
            &self.filters,
            self.cursor.as_ref(),
            self.page_size,
        )
        .await
        {
            Ok(page) => {
                let added = page.records.len();
                self.records.extend(page.records);
                self.cursor = page.next_cursor;
                self.has_more = page.has_more;
                Ok(LoadOutcome::Loaded { added })
            }
            Err(e) if e.is_rate_limited() => {
                let message = e.user_message();
                warn!("⚠️ 报表加载被限流: {}", e);
                self.notice = Some(message.clone());
                Ok(LoadOutcome::Throttled { message })
            }
            Err(e) => Err(e),
        }
    }

    /// 连续加载直到没有更多记录或被限流，返回本次新增的记录数
    pub async fn load_all(&mut self) -> AppResult<usize> {
        let mut total = 0;
        loop {
            match self.load_next().await? {
                LoadOutcome::Loaded { added } => total += added,
                LoadOutcome::Exhausted => break,
                LoadOutcome::Throttled { .. } => break,
            }
        }
        info!("📄 已加载 {} 条记录", self.records.len());
        Ok(total)
    }

    pub fn records(&self) -> &[ReportRecord] {
        &self.records
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn filters(&self) -> &ReportFilters {
        &self.filters
    }

    /// 当前的限流提示
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn sessions(&self) -> Vec<ReportSession> {
        group_into_sessions(&self.records, self.window)
    }

    pub fn day_groups(&self, offset: FixedOffset) -> Vec<DayGroup> {
        group_sessions_by_day(self.sessions(), offset)
    }

    pub fn totals(&self) -> SessionSummary {
        compute_totals(&self.records)
    }
}

/// 时间降序，时间缺失的排在最后
fn newest_first(a: &ReportRecord, b: &ReportRecord) -> Ordering {
    match (a.timestamp(), b.timestamp()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn uploader_of(record: &ReportRecord) -> Option<String> {
    record
        .user_email
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn within_window(
    anchor: Option<DateTime<Utc>>,
    timestamp: Option<DateTime<Utc>>,
    window: Duration,
) -> bool {
    match (anchor, timestamp) {
        (Some(anchor), Some(timestamp)) => (anchor - timestamp).abs() <= window,
        (None, None) => true,
        _ => false,
    }
}

/// 把记录分组为会话
///
/// 先按时间稳定降序排序，再单次遍历：上传者不同，或与当前会话锚点（会话第一条记录的时间）
/// 相差超过 `window` 时开始新会话。相同输入总是得到相同输出。
pub fn group_into_sessions(records: &[ReportRecord], window: Duration) -> Vec<ReportSession> {
    let mut sorted: Vec<&ReportRecord> = records.iter().collect();
    sorted.sort_by(|a, b| newest_first(a, b));

    let mut sessions: Vec<ReportSession> = Vec::new();
    for record in sorted {
        let uploader = uploader_of(record);
        let timestamp = record.timestamp();

        let joins_current = sessions.last().is_some_and(|session| {
            session.uploader == uploader && within_window(session.anchor, timestamp, window)
        });

        match sessions.last_mut() {
            Some(session) if joins_current => {
                session.summary.add(record);
                session.records.push(record.clone());
            }
            _ => {
                let mut summary = SessionSummary::default();
                summary.add(record);
                sessions.push(ReportSession {
                    uploader,
                    anchor: timestamp,
                    records: vec![record.clone()],
                    summary,
                });
            }
        }
    }

    sessions
}

/// 会话所属的日历日：优先锚点记录上服务端给出的 `date_str`，其次锚点时间在报表时区的日期
fn session_day(session: &ReportSession, offset: FixedOffset) -> Option<NaiveDate> {
    session
        .records
        .first()
        .and_then(ReportRecord::server_day)
        .or_else(|| {
            session
                .anchor
                .map(|anchor| anchor.with_timezone(&offset).date_naive())
        })
}

/// 按日历日分组；日期降序，未知日期在最后，组内保持会话顺序
pub fn group_sessions_by_day(sessions: Vec<ReportSession>, offset: FixedOffset) -> Vec<DayGroup> {
    let mut groups: Vec<DayGroup> = Vec::new();

    for session in sessions {
        let day = session_day(&session, offset);

        match groups.iter_mut().find(|g| g.day == day) {
            Some(group) => group.sessions.push(session),
            None => groups.push(DayGroup {
                day,
                label: day_label(day),
                sessions: vec![session],
            }),
        }
    }

    groups.sort_by(|a, b| match (a.day, b.day) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    groups
}

fn day_label(day: Option<NaiveDate>) -> String {
    day.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "未知日期".to_string())
}

/// 整体合计；差异优先使用服务端给出的 `variance`
pub fn compute_totals(records: &[ReportRecord]) -> SessionSummary {
    records
        .iter()
        .fold(SessionSummary::default(), |mut totals, record| {
            let ai = record.ai();
            let manual = record.manual();
            totals.ai += ai;
            totals.manual += manual;
            totals.variance += record.variance.unwrap_or(manual - ai);
            totals
        })
}

/// `today` 往前追溯 `days_back` 天到 `today`
pub fn preset_range(today: NaiveDate, days_back: u32) -> (NaiveDate, NaiveDate) {
    let start = today
        .checked_sub_days(chrono::Days::new(u64::from(days_back)))
        .unwrap_or(today);
    (start, today)
}

/// 默认范围：最近 7 天（含今天）
pub fn default_date_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    preset_range(today, PRESET_RANGES[1].1)
}
