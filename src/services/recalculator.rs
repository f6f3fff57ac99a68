use tracing::warn;

use crate::models::{ReceiptItem, TotalSource, UploadedReceipt};
use crate::utils::{format_decimal, parse_decimal};

/// Sum of item prices in cents, `None` when it does not fit in an `i64`.
pub fn items_sum(items: &[ReceiptItem]) -> Option<i64> {
    items.iter().try_fold(0i64, |sum, item| match parse_decimal(&item.price) {
        Ok(cents) => sum.checked_add(cents),
        Err(err) => {
            warn!(item_id = item.id, price = %item.price, error = %err, "skipping unparsable price");
            Some(sum)
        }
    })
}

/// Recomputes one receipt's total. A printed total from the last parse is
/// kept until the items are edited; afterwards the total is the item sum.
/// Returns whether the stored total changed.
pub fn recompute_receipt(receipt: &mut UploadedReceipt) -> bool {
    if receipt.total_source != TotalSource::ItemSum {
        return false;
    }
    let Some(sum) = items_sum(&receipt.items) else {
        warn!(receipt_id = %receipt.id, "item sum out of range, keeping previous total");
        return false;
    };
    let total = format_decimal(sum);
    if receipt.total == total {
        return false;
    }
    receipt.total = total;
    true
}

/// Called after any change to a receipt's item list.
pub fn items_changed(receipt: &mut UploadedReceipt) {
    receipt.total_source = TotalSource::ItemSum;
    receipt.revision += 1;
    recompute_receipt(receipt);
}

pub fn recompute_all(receipts: &mut [UploadedReceipt]) -> usize {
    receipts
        .iter_mut()
        .map(recompute_receipt)
        .filter(|changed| *changed)
        .count()
}

/// Sum of receipt totals, `None` when a total cannot be read back or the sum
/// does not fit in an `i64`.
pub fn grand_total_cents(receipts: &[UploadedReceipt]) -> Option<i64> {
    receipts.iter().try_fold(0i64, |sum, receipt| {
        let cents = parse_decimal(&receipt.total).ok()?;
        sum.checked_add(cents)
    })
}
