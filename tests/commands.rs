mod common;

use common::*;
use receipt_ocr::commands::dashboard::get_batch_stats;
use receipt_ocr::commands::receipts::{
    add_item, get_grand_total, get_receipt_detail, get_receipts, prepare_submission, remove_receipt,
    replace_receipt, submit, update_item, upload_files, AddItemPayload, UpdateItemPayload,
};
use receipt_ocr::commands::settings::{get_settings, save_settings, SettingsPayload};
use receipt_ocr::models::ReceiptStatus;

#[tokio::test]
async fn uploads_files_from_a_directory() {
    let h = harness(
        ScriptedEngine::new()
            .text("a.jpg", COFFEE_RECEIPT)
            .text("b.png", LUNCH_RECEIPT),
    );
    let inbox = tempfile::tempdir().unwrap();
    std::fs::write(inbox.path().join("b.png"), b"png").unwrap();
    std::fs::write(inbox.path().join("a.jpg"), b"jpg").unwrap();
    std::fs::write(inbox.path().join("notes.md"), b"skip").unwrap();

    let ids = upload_files(vec![inbox.path().to_path_buf()], &h.state).await.unwrap();
    assert_eq!(ids.len(), 2);
    settle(&h.state).await;

    let summaries = get_receipts(&h.state).await.unwrap();
    let names = summaries.iter().map(|s| s.file_name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["a.jpg", "b.png"]);
    assert_eq!(summaries[0].item_count, 2);
    assert_eq!(get_grand_total(&h.state).await.unwrap(), "$16.25");
}

#[tokio::test]
async fn empty_selection_is_an_error() {
    let h = harness(ScriptedEngine::new());
    let inbox = tempfile::tempdir().unwrap();
    assert!(upload_files(vec![inbox.path().to_path_buf()], &h.state).await.is_err());
}

#[tokio::test]
async fn item_commands_report_errors_as_strings() {
    let h = harness(ScriptedEngine::new().text("snack.png", SNACK_RECEIPT));
    let ids = h.state.upload(vec![file("snack.png")]).unwrap();
    settle(&h.state).await;

    let detail = get_receipt_detail(ids[0].clone(), &h.state).await.unwrap();
    let chips = detail.items[0].id;
    let updated = update_item(
        UpdateItemPayload {
            receipt_id: ids[0].clone(),
            item_id: chips,
            description: Some("Crisps".to_string()),
            price: None,
        },
        &h.state,
    )
    .await
    .unwrap();
    assert_eq!(updated.items[0].description, "Crisps");
    assert_eq!(updated.total, "3.00");

    let err = add_item(
        AddItemPayload {
            receipt_id: ids[0].clone(),
            description: "Gum".to_string(),
            price: "abc".to_string(),
        },
        &h.state,
    )
    .await
    .unwrap_err();
    assert!(err.contains("Invalid price"));

    let err = get_receipt_detail("missing".to_string(), &h.state).await.unwrap_err();
    assert_eq!(err, "Receipt not found");
    assert!(remove_receipt("missing".to_string(), &h.state).await.is_err());
}

#[tokio::test]
async fn replacing_a_receipt_reprocesses_under_a_new_id() {
    let h = harness(
        ScriptedEngine::new()
            .failure("blurry.png", "unreadable")
            .text("retake.png", SNACK_RECEIPT),
    );
    let ids = h.state.upload(vec![file("blurry.png")]).unwrap();
    settle(&h.state).await;

    let retake = tempfile::tempdir().unwrap();
    let path = retake.path().join("retake.png");
    std::fs::write(&path, b"png").unwrap();
    let new_id = replace_receipt(ids[0].clone(), path, &h.state).await.unwrap();
    assert_ne!(new_id, ids[0]);
    settle(&h.state).await;

    let summaries = get_receipts(&h.state).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, new_id);
    assert_eq!(summaries[0].status, ReceiptStatus::Parsed);
}

#[tokio::test]
async fn batch_stats_and_submission() {
    let h = harness(
        ScriptedEngine::new()
            .text("coffee.png", COFFEE_RECEIPT)
            .failure("torn.png", "unreadable"),
    );
    h.state
        .upload(vec![file("coffee.png"), file("torn.png")])
        .unwrap();
    settle(&h.state).await;

    let stats = get_batch_stats(&h.state).await.unwrap();
    assert_eq!(stats.parsed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.item_count, 2);
    assert_eq!(stats.grand_total, "5.75");
    assert!(!stats.ready_to_submit);

    let torn = get_receipts(&h.state)
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.status == ReceiptStatus::Failed)
        .unwrap();
    assert!(prepare_submission("Trip".to_string(), &h.state).await.is_err());
    remove_receipt(torn.id, &h.state).await.unwrap();

    assert!(get_batch_stats(&h.state).await.unwrap().ready_to_submit);
    let preview = prepare_submission("Trip".to_string(), &h.state).await.unwrap();
    assert_eq!(preview.grand_total, "5.75");

    submit("Trip".to_string(), &h.state).await.unwrap();
    let stats = get_batch_stats(&h.state).await.unwrap();
    assert_eq!(stats.parsed, 0);
    assert_eq!(stats.recent_submissions.len(), 1);
    assert_eq!(stats.recent_submissions[0].title, "Trip");
}

#[tokio::test]
async fn settings_are_persisted_and_cleared() {
    let h = harness(ScriptedEngine::new());
    let defaults = get_settings(&h.state).await.unwrap();
    assert_eq!(defaults.ocr_language, "eng");
    assert_eq!(defaults.keywords_path, None);

    let saved = save_settings(
        SettingsPayload {
            ocr_language: Some("deu".to_string()),
            staging_dir: Some("/tmp/receipts".to_string()),
            ..Default::default()
        },
        &h.state,
    )
    .await
    .unwrap();
    assert_eq!(saved.ocr_language, "deu");
    assert_eq!(saved.staging_dir.as_deref(), Some("/tmp/receipts"));

    let cleared = save_settings(
        SettingsPayload {
            staging_dir: Some(String::new()),
            ..Default::default()
        },
        &h.state,
    )
    .await
    .unwrap();
    assert_eq!(cleared.staging_dir, None);
    assert_eq!(cleared.ocr_language, "deu");
    assert_eq!(h.state.settings.lock().unwrap().ocr_language, "deu");

    let bad = save_settings(
        SettingsPayload {
            keywords_path: Some("/nonexistent/keywords.json".to_string()),
            ..Default::default()
        },
        &h.state,
    )
    .await;
    assert!(bad.is_err());
    assert!(save_settings(
        SettingsPayload {
            ocr_language: Some(" ".to_string()),
            ..Default::default()
        },
        &h.state,
    )
    .await
    .is_err());
}

#[tokio::test]
async fn empty_file_in_a_folder_only_fails_itself() {
    let h = harness(ScriptedEngine::new().text("a.jpg", SNACK_RECEIPT));
    let inbox = tempfile::tempdir().unwrap();
    std::fs::write(inbox.path().join("a.jpg"), b"jpg").unwrap();
    std::fs::write(inbox.path().join("b.png"), b"").unwrap();

    let ids = upload_files(vec![inbox.path().to_path_buf()], &h.state).await.unwrap();
    assert_eq!(ids.len(), 2);
    settle(&h.state).await;

    let summaries = get_receipts(&h.state).await.unwrap();
    assert_eq!(summaries[0].status, ReceiptStatus::Parsed);
    assert_eq!(summaries[1].status, ReceiptStatus::Failed);
    assert!(summaries[1].error.is_some());
    assert_eq!(get_grand_total(&h.state).await.unwrap(), "$3.00");
}
