use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::db::Database;
use crate::models::{ParsedReceipt, UploadedReceipt};
use crate::services::ocr::OcrEngine;
use crate::services::parser::ReceiptParser;
use crate::services::queue::OcrJob;

#[derive(Debug)]
pub enum JobOutcome {
    Recognized { text: String, parsed: ParsedReceipt },
    Failed { message: String },
}

/// Runs the OCR engine for one job and parses its text. Engine and parse
/// errors become `JobOutcome::Failed`; there is no retry.
pub async fn process_receipt(engine: &dyn OcrEngine, parser: &ReceiptParser, job: &OcrJob) -> JobOutcome {
    let recognition = match engine.recognize(&job.image).await {
        Ok(recognition) => recognition,
        Err(err) => {
            return JobOutcome::Failed {
                message: err.to_string(),
            }
        }
    };

    match parser.parse(&job.receipt_id, &recognition.text) {
        Ok(parsed) => {
            info!(
                receipt_id = %job.receipt_id,
                chars = recognition.text.len(),
                items = parsed.items.len(),
                "recognition finished"
            );
            JobOutcome::Recognized {
                text: recognition.text,
                parsed,
            }
        }
        Err(err) => JobOutcome::Failed {
            message: err.to_string(),
        },
    }
}

pub fn log_outcome(db: &Arc<Mutex<Database>>, receipt: &UploadedReceipt) -> Result<()> {
    let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    db.log_processing(
        Some(&receipt.id),
        Some(&receipt.image_hash),
        "ocr",
        receipt.status.as_str(),
        receipt.error.as_deref(),
    )?;
    Ok(())
}
