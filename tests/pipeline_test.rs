mod common;

use common::{jpeg, MemoryBackend, MemoryStore, UPLOADER};
use gem_tally::models::UploadEvent;
use gem_tally::services::{FileValidator, ProcessingCoordinator, ReportSubmissionGateway};
use gem_tally::{App, CaptureFlow, CaptureStage, Collaborators, Config, UploadOrchestrator};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_test::assert_ok;

fn capture_flow(store: &Arc<MemoryStore>, backend: &Arc<MemoryBackend>) -> CaptureFlow {
    let uploader = UploadOrchestrator::new(store.clone(), FileValidator::new(1024))
        .with_notifier(backend.clone());
    CaptureFlow::new(
        uploader,
        ProcessingCoordinator::new(backend.clone()),
        ReportSubmissionGateway::new(backend.clone()),
    )
}

#[tokio::test]
async fn test_capture_flow_select_upload_review_save() {
    let store = MemoryStore::new();
    let backend = MemoryBackend::new();
    let mut flow = capture_flow(&store, &backend);

    let rejected = flow.select_files(vec![
        jpeg("tray-1.jpg", 100),
        jpeg("huge.jpg", 4096),
        jpeg("tray-2.jpg", 200),
    ]);
    assert_eq!(rejected.len(), 1);
    assert_eq!(flow.stage(), CaptureStage::Selected);
    assert_eq!(flow.selected().len(), 2);

    let mut events = flow.subscribe_progress();
    let items = flow.upload_and_process("").await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].ai_count, 3);
    assert_eq!(items[1].ai_count, 4);
    assert_eq!(flow.stage(), CaptureStage::Complete);
    assert!(flow.selected().is_empty());

    let mut succeeded = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, UploadEvent::Succeeded { .. }) {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 2);
    assert_eq!(backend.notified.lock().unwrap().len(), 2);

    assert!(flow.update_manual_count(0, Some(5)));
    assert!(flow.update_manual_count(1, None));
    assert!(flow.update_notes(1, "耳环少一只"));
    assert!(!flow.update_notes(9, "越界"));

    let report = flow.save().await.unwrap();
    assert!(report.all_succeeded());
    assert_eq!(flow.stage(), CaptureStage::Saved);

    let saved = backend.saved();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].manual_count, Some(5));
    assert_eq!(saved[1].manual_count, Some(4));
    assert_eq!(saved[1].notes.as_deref(), Some("耳环少一只"));
    assert!(saved[0]
        .image_url
        .as_deref()
        .unwrap()
        .starts_with("gs://captures/"));
}

#[tokio::test]
async fn test_upload_failure_returns_to_selected() {
    let store = MemoryStore::new();
    store.fail_on("tray-2.jpg");
    let backend = MemoryBackend::new();
    let mut flow = capture_flow(&store, &backend);

    flow.select_files(vec![jpeg("tray-1.jpg", 100), jpeg("tray-2.jpg", 100)]);
    assert!(flow.upload_and_process("").await.is_err());

    assert_eq!(flow.stage(), CaptureStage::Selected);
    assert_eq!(flow.selected().len(), 2);
    assert!(flow.last_error().unwrap().contains("tray-2.jpg"));
    assert_eq!(backend.count_calls.load(Ordering::SeqCst), 0);
    // 成功的那个文件已经上传，但整个批次按失败处理
    assert_eq!(store.object_count(), 1);
}

#[tokio::test]
async fn test_counting_failure_keeps_selection() {
    let store = MemoryStore::new();
    let backend = MemoryBackend::new();
    backend.fail_counting.store(true, Ordering::SeqCst);
    let mut flow = capture_flow(&store, &backend);

    flow.select_files(vec![jpeg("tray-1.jpg", 100)]);
    assert!(flow.upload_and_process("").await.is_err());
    assert_eq!(flow.stage(), CaptureStage::Selected);
    assert_eq!(flow.last_error(), Some("AI processing failed"));

    backend.fail_counting.store(false, Ordering::SeqCst);
    assert_ok!(flow.upload_and_process("").await);
    assert_eq!(flow.stage(), CaptureStage::Complete);
}

#[tokio::test]
async fn test_partial_save_error_stays_in_review() {
    let store = MemoryStore::new();
    let backend = MemoryBackend::new();
    *backend.reject_save.lock().unwrap() = Some((1, "重复记录".to_string()));
    let mut flow = capture_flow(&store, &backend);

    flow.select_files(vec![jpeg("tray-1.jpg", 100), jpeg("tray-2.jpg", 100)]);
    assert_ok!(flow.upload_and_process("").await);

    let report = flow.save().await.unwrap();
    assert_eq!(report.success_count(), 1);
    assert_eq!(flow.stage(), CaptureStage::Complete);
    assert_eq!(flow.last_error(), Some("重复记录"));
}

#[tokio::test]
async fn test_remove_last_file_returns_to_idle() {
    let store = MemoryStore::new();
    let backend = MemoryBackend::new();
    let mut flow = capture_flow(&store, &backend);

    flow.select_files(vec![jpeg("tray-1.jpg", 100)]);
    assert!(flow.remove_file(0).is_some());
    assert_eq!(flow.stage(), CaptureStage::Idle);
    assert!(flow.upload_and_process("").await.is_err());
}

#[tokio::test]
async fn test_app_runs_capture_and_report() {
    let folder = std::env::temp_dir().join(format!("gem_tally_app_{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&folder).await.unwrap();
    for name in ["tray-1.jpg", "tray-2.jpg", "tray-3.jpg"] {
        tokio::fs::write(folder.join(name), jpeg(name, 64).bytes)
            .await
            .unwrap();
    }

    let store = MemoryStore::new();
    let backend = MemoryBackend::new();
    let config = Config {
        capture_folder: folder.to_string_lossy().to_string(),
        report_page_size: 2,
        ..Config::default()
    };
    let collaborators = Collaborators {
        object_store: store.clone(),
        signer: backend.clone(),
        counter: backend.clone(),
        reports: backend.clone(),
        users: backend.clone(),
        notifier: Some(backend.clone()),
    };

    let summary = App::with_collaborators(config, collaborators)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.capture_stage, CaptureStage::Saved);
    assert_eq!(summary.saved, 3);
    assert!(summary.capture_error.is_none());

    let report = &summary.report;
    assert_eq!(report.record_count, 3);
    assert_eq!(report.session_count, 1);
    assert_eq!(report.resolved_count, 3);
    assert_eq!(report.totals.ai, 12.0);
    assert_eq!(report.totals.variance, 0.0);
    assert_eq!(report.uploaders[0].label(), "门店员工");
    assert_eq!(
        report.day_groups[0].sessions[0].uploader.as_deref(),
        Some(UPLOADER)
    );

    // 3 条记录、每页 2 条：两次请求
    assert_eq!(backend.queries.lock().unwrap().len(), 2);
    assert_eq!(backend.sign_calls.load(Ordering::SeqCst), 3);

    tokio::fs::remove_dir_all(&folder).await.unwrap();
}
