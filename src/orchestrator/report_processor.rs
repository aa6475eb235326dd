//! 报表读取与汇总
//!
//! 按默认日期范围分页读取全部记录，分组为会话和日期，并为每个会话解析访问链接。

use crate::clients::{ReportStore, UserDirectory};
use crate::config::Config;
use crate::models::{DayGroup, KnownUser, ReportFilters, SessionSummary};
use crate::services::{default_date_range, ReportFeed, ResolverCache};
use crate::utils::logging;
use anyhow::Result;
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// 报表汇总结果
#[derive(Debug, Clone, Default)]
pub struct ReportOverview {
    pub uploaders: Vec<KnownUser>,
    pub day_groups: Vec<DayGroup>,
    pub totals: SessionSummary,
    pub record_count: usize,
    pub session_count: usize,
    /// 已解析出访问链接的记录数
    pub resolved_count: usize,
    /// 加载被限流时的提示
    pub throttled: Option<String>,
}

/// 配置中的报表时区，超出范围时回退为 UTC
pub fn reporting_offset(config: &Config) -> FixedOffset {
    FixedOffset::east_opt(config.report_utc_offset_minutes.saturating_mul(60))
        .unwrap_or_else(|| Utc.fix())
}

/// 读取并汇总 `today` 往前 7 天的报表
pub async fn load_report(
    reports: Arc<dyn ReportStore>,
    users: &dyn UserDirectory,
    resolver: &ResolverCache,
    config: &Config,
    today: NaiveDate,
) -> Result<ReportOverview> {
    let uploaders = match users.list_users().await {
        Ok(list) => {
            info!("👥 已知上传者 {} 位", list.len());
            list
        }
        Err(e) => {
            warn!("⚠️ 读取上传者列表失败（已忽略）: {}", e);
            Vec::new()
        }
    };

    let (start, end) = default_date_range(today);
    info!("\n📅 报表范围: {} ~ {}", start, end);

    let mut feed = ReportFeed::new(reports, config.report_page_size, config.session_window()?);
    feed.reset(ReportFilters {
        uploader: None,
        start_date: Some(start),
        end_date: Some(end),
    })?;
    feed.load_all().await?;

    let throttled = feed.notice().map(str::to_string);
    let day_groups = feed.day_groups(reporting_offset(config));
    let session_count = day_groups.iter().map(|d| d.sessions.len()).sum();

    let mut resolved_count = 0;
    for day in &day_groups {
        info!("\n📆 {}", day.label);
        for session in &day.sessions {
            let references: Vec<&str> = session
                .records
                .iter()
                .filter_map(|r| r.image_url.as_deref())
                .collect();
            let urls = resolver.resolve_many(&references).await;
            let resolved = urls.iter().filter(|u| u.is_some()).count();
            resolved_count += resolved;

            info!(
                "  👤 {} | {} 条 | AI {} / 人工 {} / 差异 {} | 链接 {}/{}",
                session.uploader_label(),
                session.records.len(),
                logging::format_count(session.summary.ai),
                logging::format_count(session.summary.manual),
                logging::format_count(session.summary.variance),
                resolved,
                references.len()
            );
        }
    }

    Ok(ReportOverview {
        uploaders,
        day_groups,
        totals: feed.totals(),
        record_count: feed.records().len(),
        session_count,
        resolved_count,
        throttled,
    })
}
