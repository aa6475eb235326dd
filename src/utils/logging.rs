/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 日志
///
/// `RUST_LOG` 环境变量优先；否则按 `verbose` 选择 debug 或 info 级别。
/// 重复调用不会 panic（测试中多次初始化时静默忽略）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(backend: &str, bucket: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 珠宝照片计数流水线");
    info!("🌐 后端服务: {}", backend);
    info!("🪣 存储桶: {}", bucket);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `stage`: 阶段名称（上传 / 计数 / 保存）
/// - `total`: 本批文件数量
pub fn log_batch_start(stage: &str, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始{}: 共 {} 个文件", stage, total);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
///
/// # 参数
/// - `stage`: 阶段名称
/// - `success`: 成功数量
/// - `total`: 批次总数
pub fn log_batch_complete(stage: &str, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ {}完成: 成功 {}/{}", stage, success, total);
    info!("{}", "─".repeat(60));
}

/// 打印报表汇总
///
/// # 参数
/// - `records`: 已加载记录数
/// - `sessions`: 会话数量
/// - `ai`/`manual`/`variance`: 合计
pub fn print_final_stats(records: usize, sessions: usize, ai: f64, manual: f64, variance: f64) {
    info!("\n{}", "=".repeat(60));
    info!("📊 报表汇总");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📄 记录: {} 条 / 会话: {} 个", records, sessions);
    info!("🤖 AI 计数: {}", format_count(ai));
    info!("✋ 人工计数: {}", format_count(manual));
    info!("± 差异: {}", format_count(variance));
    info!("{}", "=".repeat(60));
}

/// 格式化计数，最多保留两位小数
pub fn format_count(value: f64) -> String {
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "…"
    } else {
        text.to_string()
    }
}
