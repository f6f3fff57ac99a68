use crate::models::{BatchStats, ReceiptStatus};
use crate::services::state::AppState;
use crate::utils::format_decimal;

pub async fn get_batch_stats(state: &AppState) -> Result<BatchStats, String> {
    let receipts = state.snapshot().map_err(|e| e.to_string())?;
    let count = |status: ReceiptStatus| receipts.iter().filter(|r| r.status == status).count();

    let grand_total = state.grand_total().map_err(|e| e.to_string())?;
    let recent_submissions = {
        let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
        db.get_submissions(5).map_err(|e| e.to_string())?
    };

    Ok(BatchStats {
        queued: count(ReceiptStatus::Queued),
        processing: count(ReceiptStatus::Processing),
        parsed: count(ReceiptStatus::Parsed),
        failed: count(ReceiptStatus::Failed),
        item_count: receipts.iter().map(|r| r.items.len()).sum(),
        grand_total: format_decimal(grand_total),
        // Any title passes here; only the batch itself is checked.
        ready_to_submit: !receipts.is_empty() && state.submission("batch").is_ok(),
        recent_submissions,
    })
}
