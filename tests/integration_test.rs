use gem_tally::clients::{BackendClient, StaticTokenProvider, UrlSigner, UserDirectory};
use gem_tally::config::Config;
use gem_tally::models::{load_capture_folder, ReportFilters, StorageReference};
use gem_tally::services::{default_date_range, paginate};
use gem_tally::utils::logging;
use gem_tally::{App, HttpExecutor};
use std::sync::Arc;
use std::time::Duration;

fn live_backend(config: &Config) -> BackendClient {
    let executor = HttpExecutor::new(
        &config.backend_base_url,
        Arc::new(StaticTokenProvider::new(&config.auth_token)),
        Duration::from_secs(config.request_timeout_secs),
    )
    .expect("创建 HTTP 客户端失败");
    BackendClient::new(executor)
}

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_full_run_against_backend() {
    // 初始化日志
    logging::init(true);

    // 加载配置（GEM_TALLY_CONFIG / 环境变量）
    let config = Config::load().expect("加载配置失败");

    let summary = App::initialize(config)
        .await
        .expect("初始化失败")
        .run()
        .await
        .expect("运行失败");

    assert!(summary.capture_error.is_none(), "拍照流程应该成功");
}

#[tokio::test]
#[ignore]
async fn test_list_users() {
    logging::init(true);
    let config = Config::load().expect("加载配置失败");

    let users = live_backend(&config)
        .list_users()
        .await
        .expect("读取上传者列表失败");
    println!("找到 {} 位上传者", users.len());
}

#[tokio::test]
#[ignore]
async fn test_first_report_page() {
    logging::init(true);
    let config = Config::load().expect("加载配置失败");
    let backend = live_backend(&config);

    let (start, end) = default_date_range(chrono::Local::now().date_naive());
    let filters = ReportFilters {
        uploader: None,
        start_date: Some(start),
        end_date: Some(end),
    };

    let page = paginate(&backend, &filters, None, config.report_page_size)
        .await
        .expect("读取报表失败");
    println!("第一页 {} 条记录, has_more={}", page.records.len(), page.has_more);

    // 签名第一条记录的存储引用
    if let Some(raw) = page.records.first().and_then(|r| r.image_url.as_deref()) {
        if let Some(reference) = StorageReference::needs_resolution(raw) {
            let signed = backend.sign(&reference).await.expect("签名失败");
            assert!(signed.url.as_str().starts_with("http"));
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_load_capture_folder() {
    logging::init(true);
    let config = Config::load().expect("加载配置失败");

    let files = load_capture_folder(&config.capture_folder)
        .await
        .expect("应该能够读取拍照文件夹");
    println!("找到 {} 个文件", files.len());
}
