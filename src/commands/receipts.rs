use crate::models::{
    ItemEdit, ReceiptSummary, SubmissionAggregate, UnreadableFile, UploadFile, UploadedReceipt,
};
use crate::services::state::AppState;
use crate::services::watcher::collect_receipt_files;
use crate::utils::format_usd;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateItemPayload {
    pub receipt_id: String,
    pub item_id: u32,
    pub description: Option<String>,
    pub price: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddItemPayload {
    pub receipt_id: String,
    pub description: String,
    pub price: String,
}

fn read_upload(path: &Path) -> Result<UploadFile, UnreadableFile> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    match std::fs::read(path) {
        Ok(bytes) => Ok(UploadFile { file_name, bytes }),
        Err(err) => Err(UnreadableFile {
            file_name,
            error: format!("Cannot read {}: {}", path.display(), err),
        }),
    }
}

/// Uploads files and every receipt file directly inside given directories.
/// Unreadable files show up as failed receipts; the rest are processed.
pub async fn upload_files(paths: Vec<PathBuf>, state: &AppState) -> Result<Vec<String>, String> {
    let files = collect_receipt_files(&paths)
        .iter()
        .map(|path| read_upload(path))
        .collect::<Vec<_>>();
    if files.is_empty() {
        return Err("No receipt files found".to_string());
    }
    state.admit(files).map_err(|e| e.to_string())
}

pub async fn get_receipts(state: &AppState) -> Result<Vec<ReceiptSummary>, String> {
    let receipts = state.snapshot().map_err(|e| e.to_string())?;
    Ok(receipts
        .into_iter()
        .map(|receipt| ReceiptSummary {
            item_count: receipt.items.len(),
            id: receipt.id,
            file_name: receipt.file_name,
            status: receipt.status,
            total: receipt.total,
            error: receipt.error,
        })
        .collect())
}

pub async fn get_receipt_detail(receipt_id: String, state: &AppState) -> Result<UploadedReceipt, String> {
    state
        .receipt(&receipt_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "Receipt not found".to_string())
}

pub async fn update_item(payload: UpdateItemPayload, state: &AppState) -> Result<UploadedReceipt, String> {
    let edit = ItemEdit {
        description: payload.description,
        price: payload.price,
    };
    state
        .edit_item(&payload.receipt_id, payload.item_id, edit)
        .map_err(|e| e.to_string())
}

pub async fn add_item(payload: AddItemPayload, state: &AppState) -> Result<UploadedReceipt, String> {
    state
        .add_item(&payload.receipt_id, &payload.description, &payload.price)
        .map_err(|e| e.to_string())
}

pub async fn remove_item(receipt_id: String, item_id: u32, state: &AppState) -> Result<UploadedReceipt, String> {
    state.remove_item(&receipt_id, item_id).map_err(|e| e.to_string())
}

pub async fn remove_receipt(receipt_id: String, state: &AppState) -> Result<(), String> {
    if state.remove(&receipt_id).map_err(|e| e.to_string())? {
        Ok(())
    } else {
        Err("Receipt not found".to_string())
    }
}

pub async fn replace_receipt(receipt_id: String, path: PathBuf, state: &AppState) -> Result<String, String> {
    let file = read_upload(&path).map_err(|e| e.error)?;
    state.replace(&receipt_id, file).map_err(|e| e.to_string())
}

/// Grand total as shown to the user, e.g. `$12.50`.
pub async fn get_grand_total(state: &AppState) -> Result<String, String> {
    state.grand_total().map(format_usd).map_err(|e| e.to_string())
}

pub async fn prepare_submission(title: String, state: &AppState) -> Result<SubmissionAggregate, String> {
    state.submission(&title).map_err(|e| e.to_string())
}

pub async fn submit(title: String, state: &AppState) -> Result<SubmissionAggregate, String> {
    state.complete_submission(&title).map_err(|e| e.to_string())
}
