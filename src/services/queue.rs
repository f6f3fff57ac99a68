use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{
    ItemEdit, ParsedReceipt, ReceiptItem, ReceiptStatus, SubmissionAggregate, SubmittedReceipt,
    TotalSource, UploadedReceipt,
};
use crate::services::image::ImageHandle;
use crate::services::recalculator::{grand_total_cents, items_changed, items_sum, recompute_all};
use crate::utils::{format_decimal, now_rfc3339, parse_decimal};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("Receipt {0} not found")]
    ReceiptNotFound(String),
    #[error("Item {item_id} not found on receipt {receipt_id}")]
    ItemNotFound { receipt_id: String, item_id: u32 },
    #[error("Description must not be empty")]
    EmptyDescription,
    #[error("Invalid price '{0}'")]
    InvalidPrice(String),
    #[error("Item prices on receipt {0} would add up to more than can be represented")]
    TotalOutOfRange(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Title must not be empty")]
    EmptyTitle,
    #[error("No receipts to submit")]
    NoReceipts,
    #[error("{0} receipt(s) still waiting for OCR")]
    StillProcessing(usize),
    #[error("Receipt {0} claims a total but has no items")]
    MissingItems(String),
    #[error("Receipt {0} failed OCR and needs manual items")]
    NeedsManualEntry(String),
    #[error("Grand total is out of range")]
    TotalOutOfRange,
}

/// An uploaded file whose bytes are already staged.
#[derive(Debug)]
pub struct StagedUpload {
    pub id: String,
    pub file_name: String,
    pub image: ImageHandle,
    pub image_hash: String,
}

/// A file that could not be read or staged. It still becomes a receipt, in
/// the failed state, so the rest of its batch goes ahead.
#[derive(Debug, Clone)]
pub struct RejectedUpload {
    pub id: String,
    pub file_name: String,
    pub image_hash: String,
    pub error: String,
}

#[derive(Debug)]
pub enum Intake {
    Staged(StagedUpload),
    Rejected(RejectedUpload),
}

/// The single in-flight OCR job.
#[derive(Debug, Clone)]
pub struct OcrJob {
    pub receipt_id: String,
    pub image: Arc<ImageHandle>,
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct StartNext {
    pub job: Option<OcrJob>,
    /// Receipts that failed because their image was no longer readable.
    pub invalidated: Vec<UploadedReceipt>,
    /// Queued ids whose receipt no longer exists.
    pub dropped: Vec<String>,
}

/// Receipt collection plus the FIFO OCR queue.
///
/// Every state change goes through one of the transition methods below, so
/// the collection and the queue are always updated together: an id is in
/// `pending` or `current` exactly while its receipt is queued or processing.
#[derive(Debug, Default)]
pub struct ReceiptQueue {
    receipts: Vec<UploadedReceipt>,
    pending: VecDeque<String>,
    current: Option<String>,
}

impl ReceiptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receipts(&self) -> &[UploadedReceipt] {
        &self.receipts
    }

    pub fn get(&self, receipt_id: &str) -> Option<&UploadedReceipt> {
        self.receipts.iter().find(|r| r.id == receipt_id)
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().cloned().collect()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    pub fn grand_total(&self) -> Option<i64> {
        grand_total_cents(&self.receipts)
    }

    pub fn enqueue(&mut self, uploads: Vec<StagedUpload>) -> Vec<UploadedReceipt> {
        self.admit(uploads.into_iter().map(Intake::Staged).collect())
    }

    /// Adds a batch in upload order. Staged files are queued for OCR,
    /// rejected ones are added as failed receipts.
    pub fn admit(&mut self, batch: Vec<Intake>) -> Vec<UploadedReceipt> {
        let mut added = Vec::with_capacity(batch.len());
        for intake in batch {
            let receipt = new_receipt(intake);
            if receipt.status == ReceiptStatus::Queued {
                self.pending.push_back(receipt.id.clone());
            } else {
                warn!(receipt_id = %receipt.id, file = %receipt.file_name, "upload rejected");
            }
            self.receipts.push(receipt.clone());
            added.push(receipt);
        }
        added
    }

    /// Swaps a receipt for a freshly staged upload in one step. The old
    /// receipt is left untouched when it cannot be found.
    pub fn replace(
        &mut self,
        receipt_id: &str,
        upload: StagedUpload,
    ) -> Result<(UploadedReceipt, UploadedReceipt), EditError> {
        if self.get(receipt_id).is_none() {
            return Err(EditError::ReceiptNotFound(receipt_id.to_string()));
        }
        let removed = self
            .remove(receipt_id)
            .ok_or_else(|| EditError::ReceiptNotFound(receipt_id.to_string()))?;
        let added = self
            .enqueue(vec![upload])
            .pop()
            .ok_or_else(|| EditError::ReceiptNotFound(receipt_id.to_string()))?;
        Ok((removed, added))
    }

    /// Re-derives every receipt total that follows its items. Returns how
    /// many totals changed.
    pub fn recompute(&mut self) -> usize {
        recompute_all(&mut self.receipts)
    }

    /// Hands out the next job when nothing is in flight.
    pub fn start_next(&mut self) -> StartNext {
        let mut outcome = StartNext::default();
        if self.current.is_some() {
            return outcome;
        }

        while let Some(id) = self.pending.pop_front() {
            let Some(receipt) = self.receipts.iter_mut().find(|r| r.id == id) else {
                debug!(receipt_id = %id, "dropping orphaned queue entry");
                outcome.dropped.push(id);
                continue;
            };

            let image = match &receipt.image {
                Some(image) if image.is_available() => image.clone(),
                _ => {
                    warn!(receipt_id = %id, "image unavailable, marking failed");
                    receipt.status = ReceiptStatus::Failed;
                    receipt.error = Some("Image is no longer available".to_string());
                    receipt.updated_at = now_rfc3339();
                    outcome.invalidated.push(receipt.clone());
                    continue;
                }
            };

            receipt.status = ReceiptStatus::Processing;
            receipt.error = None;
            receipt.updated_at = now_rfc3339();
            self.current = Some(id.clone());
            info!(receipt_id = %id, file = %receipt.file_name, "starting OCR");
            outcome.job = Some(OcrJob {
                receipt_id: id,
                image,
                revision: receipt.revision,
            });
            break;
        }
        outcome
    }

    /// Writes a parse result back. Returns `None` when the receipt was removed
    /// (or is no longer the current job) while OCR was running.
    pub fn complete_success(
        &mut self,
        job: &OcrJob,
        raw_text: String,
        parsed: ParsedReceipt,
    ) -> Option<UploadedReceipt> {
        let receipt = self.take_current(job)?;
        if receipt.revision != job.revision {
            warn!(
                receipt_id = %job.receipt_id,
                "receipt was edited during OCR; edits are replaced by the OCR result"
            );
        }
        receipt.items = parsed.items;
        receipt.next_item_id = receipt.items.len() as u32;
        receipt.total = parsed.total;
        receipt.total_source = parsed.total_source;
        receipt.raw_extracted_text = Some(raw_text);
        receipt.error = None;
        receipt.status = ReceiptStatus::Parsed;
        receipt.updated_at = now_rfc3339();
        info!(
            receipt_id = %job.receipt_id,
            items = receipt.items.len(),
            total = %receipt.total,
            "OCR parsed"
        );
        Some(receipt.clone())
    }

    pub fn complete_failure(&mut self, job: &OcrJob, message: &str) -> Option<UploadedReceipt> {
        let receipt = self.take_current(job)?;
        receipt.items.clear();
        receipt.next_item_id = 0;
        receipt.total = format_decimal(0);
        receipt.total_source = TotalSource::ItemSum;
        receipt.error = Some(message.to_string());
        receipt.status = ReceiptStatus::Failed;
        receipt.updated_at = now_rfc3339();
        warn!(receipt_id = %job.receipt_id, error = %message, "OCR failed");
        Some(receipt.clone())
    }

    fn take_current(&mut self, job: &OcrJob) -> Option<&mut UploadedReceipt> {
        if self.current.as_deref() != Some(job.receipt_id.as_str()) {
            debug!(receipt_id = %job.receipt_id, "discarding stale OCR completion");
            return None;
        }
        self.current = None;
        self.receipts.iter_mut().find(|r| r.id == job.receipt_id)
    }

    /// Removes a receipt in any state. Its image is released once the
    /// returned value and any in-flight job drop their references.
    pub fn remove(&mut self, receipt_id: &str) -> Option<UploadedReceipt> {
        let index = self.receipts.iter().position(|r| r.id == receipt_id)?;
        let receipt = self.receipts.remove(index);
        self.pending.retain(|id| id != receipt_id);
        if self.current.as_deref() == Some(receipt_id) {
            self.current = None;
        }
        info!(receipt_id = %receipt_id, status = receipt.status.as_str(), "removed receipt");
        Some(receipt)
    }

    pub fn clear(&mut self) -> Vec<UploadedReceipt> {
        self.pending.clear();
        self.current = None;
        std::mem::take(&mut self.receipts)
    }

    pub fn edit_item(
        &mut self,
        receipt_id: &str,
        item_id: u32,
        edit: ItemEdit,
    ) -> Result<UploadedReceipt, EditError> {
        let description = edit
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?;
        let price = edit.price.as_deref().map(validate_price).transpose()?;

        let receipt = self.receipt_mut(receipt_id)?;
        let mut items = receipt.items.clone();
        let item = items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| EditError::ItemNotFound {
                receipt_id: receipt_id.to_string(),
                item_id,
            })?;
        if let Some(description) = description {
            item.description = description;
        }
        if let Some(price) = price {
            item.price = price;
        }
        commit_items(receipt, items)?;
        Ok(receipt.clone())
    }

    pub fn add_item(
        &mut self,
        receipt_id: &str,
        description: &str,
        price: &str,
    ) -> Result<UploadedReceipt, EditError> {
        let description = validate_description(description)?;
        let price = validate_price(price)?;

        let receipt = self.receipt_mut(receipt_id)?;
        let mut items = receipt.items.clone();
        items.push(ReceiptItem {
            id: receipt.next_item_id,
            description,
            price,
        });
        commit_items(receipt, items)?;
        receipt.next_item_id += 1;
        Ok(receipt.clone())
    }

    pub fn remove_item(&mut self, receipt_id: &str, item_id: u32) -> Result<UploadedReceipt, EditError> {
        let receipt = self.receipt_mut(receipt_id)?;
        let before = receipt.items.len();
        receipt.items.retain(|i| i.id != item_id);
        if receipt.items.len() == before {
            return Err(EditError::ItemNotFound {
                receipt_id: receipt_id.to_string(),
                item_id,
            });
        }
        items_changed(receipt);
        receipt.updated_at = now_rfc3339();
        Ok(receipt.clone())
    }

    fn receipt_mut(&mut self, receipt_id: &str) -> Result<&mut UploadedReceipt, EditError> {
        self.receipts
            .iter_mut()
            .find(|r| r.id == receipt_id)
            .ok_or_else(|| EditError::ReceiptNotFound(receipt_id.to_string()))
    }

    /// Read-only aggregate for the submission layer.
    pub fn submission(&self, title: &str) -> Result<SubmissionAggregate, SubmitError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SubmitError::EmptyTitle);
        }
        if self.receipts.is_empty() {
            return Err(SubmitError::NoReceipts);
        }
        let waiting = self.receipts.iter().filter(|r| r.status.is_pending()).count();
        if waiting > 0 {
            return Err(SubmitError::StillProcessing(waiting));
        }
        for receipt in &self.receipts {
            if receipt.items.is_empty() {
                if receipt.status == ReceiptStatus::Failed {
                    return Err(SubmitError::NeedsManualEntry(receipt.id.clone()));
                }
                if parse_decimal(&receipt.total).map(|c| c != 0).unwrap_or(true) {
                    return Err(SubmitError::MissingItems(receipt.id.clone()));
                }
            }
        }

        let grand_total = self.grand_total().ok_or(SubmitError::TotalOutOfRange)?;

        Ok(SubmissionAggregate {
            title: title.to_string(),
            grand_total: format_decimal(grand_total),
            receipts: self
                .receipts
                .iter()
                .map(|r| SubmittedReceipt {
                    id: r.id.clone(),
                    file_name: r.file_name.clone(),
                    total: r.total.clone(),
                    items: r.items.clone(),
                })
                .collect(),
        })
    }
}

fn new_receipt(intake: Intake) -> UploadedReceipt {
    let now = now_rfc3339();
    let (id, file_name, image, image_hash, status, error) = match intake {
        Intake::Staged(upload) => (
            upload.id,
            upload.file_name,
            Some(Arc::new(upload.image)),
            upload.image_hash,
            ReceiptStatus::Queued,
            None,
        ),
        Intake::Rejected(rejected) => (
            rejected.id,
            rejected.file_name,
            None,
            rejected.image_hash,
            ReceiptStatus::Failed,
            Some(rejected.error),
        ),
    };
    UploadedReceipt {
        id,
        file_name,
        image_location: image.as_ref().map(|i| i.location()).unwrap_or_default(),
        image,
        image_hash,
        status,
        items: Vec::new(),
        total: format_decimal(0),
        total_source: TotalSource::ItemSum,
        raw_extracted_text: None,
        error,
        next_item_id: 0,
        revision: 0,
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Applies an edited item list, refusing one whose sum no longer fits.
fn commit_items(receipt: &mut UploadedReceipt, items: Vec<ReceiptItem>) -> Result<(), EditError> {
    if items_sum(&items).is_none() {
        return Err(EditError::TotalOutOfRange(receipt.id.clone()));
    }
    receipt.items = items;
    items_changed(receipt);
    receipt.updated_at = now_rfc3339();
    Ok(())
}

fn validate_description(value: &str) -> Result<String, EditError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EditError::EmptyDescription);
    }
    Ok(trimmed.to_string())
}

fn validate_price(value: &str) -> Result<String, EditError> {
    match parse_decimal(value) {
        Ok(cents) if cents >= 0 => Ok(format_decimal(cents)),
        _ => Err(EditError::InvalidPrice(value.to_string())),
    }
}
