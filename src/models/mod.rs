use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::image::ImageHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Queued,
    Processing,
    Parsed,
    Failed,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Queued => "queued",
            ReceiptStatus::Processing => "processing",
            ReceiptStatus::Parsed => "parsed",
            ReceiptStatus::Failed => "failed",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ReceiptStatus::Queued | ReceiptStatus::Processing)
    }
}

/// Which rule produced a receipt's current total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalSource {
    PrintedTotal,
    PrintedSubtotal,
    ItemSum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub id: u32,
    pub description: String,
    pub price: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedReceipt {
    pub id: String,
    pub file_name: String,
    pub image_location: String,
    #[serde(skip)]
    pub image: Option<Arc<ImageHandle>>,
    pub image_hash: String,
    pub status: ReceiptStatus,
    pub items: Vec<ReceiptItem>,
    pub total: String,
    pub total_source: TotalSource,
    pub raw_extracted_text: Option<String>,
    pub error: Option<String>,
    pub next_item_id: u32,
    pub revision: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// Result of running the parser over one receipt's OCR text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub items: Vec<ReceiptItem>,
    pub total: String,
    pub total_source: TotalSource,
    pub computed_sum: String,
    pub detected_total: Option<String>,
    pub detected_subtotal: Option<String>,
}

/// One file handed over by the input surface.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A selected file whose bytes could not be read.
#[derive(Debug, Clone)]
pub struct UnreadableFile {
    pub file_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEdit {
    pub description: Option<String>,
    pub price: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedReceipt {
    pub id: String,
    pub file_name: String,
    pub total: String,
    pub items: Vec<ReceiptItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAggregate {
    pub title: String,
    pub grand_total: String,
    pub receipts: Vec<SubmittedReceipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub id: String,
    pub file_name: String,
    pub status: ReceiptStatus,
    pub item_count: usize,
    pub total: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ReceiptEvent {
    ReceiptUpdated(UploadedReceipt),
    ProcessingError { receipt_id: String, message: String },
    ReceiptRemoved { receipt_id: String },
    QueueIdle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub ocr_language: String,
    pub keywords_path: Option<String>,
    pub staging_dir: Option<String>,
    pub watch_folder: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ocr_language: "eng".to_string(),
            keywords_path: None,
            staging_dir: None,
            watch_folder: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLog {
    pub receipt_id: Option<String>,
    pub image_hash: Option<String>,
    pub process_type: String,
    pub status: String,
    pub message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub title: String,
    pub grand_total: String,
    pub receipt_count: usize,
    pub payload_json: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStats {
    pub queued: usize,
    pub processing: usize,
    pub parsed: usize,
    pub failed: usize,
    pub item_count: usize,
    pub grand_total: String,
    pub ready_to_submit: bool,
    pub recent_submissions: Vec<SubmissionRecord>,
}
