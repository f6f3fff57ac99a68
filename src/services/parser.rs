use thiserror::Error;
use tracing::debug;

use crate::models::{ParsedReceipt, ReceiptItem, TotalSource};
use crate::services::classifier::{LineClass, LineClassifier};
use crate::services::extractor::ItemExtractor;
use crate::services::keywords::{KeywordTable, KeywordTableError};
use crate::services::normalizer::normalize_line;
use crate::utils::format_decimal;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Item prices add up to more than can be represented")]
    SumOutOfRange,
}

/// Normalizer -> classifier -> extractor over every line of one receipt.
#[derive(Debug, Clone)]
pub struct ReceiptParser {
    classifier: LineClassifier,
    extractor: ItemExtractor,
}

impl ReceiptParser {
    pub fn new(table: &KeywordTable) -> Result<Self, KeywordTableError> {
        let classifier = LineClassifier::new(table)?;
        let extractor = ItemExtractor::new(classifier.amount_grammar().clone());
        Ok(ReceiptParser {
            classifier,
            extractor,
        })
    }

    pub fn parse(&self, receipt_id: &str, text: &str) -> Result<ParsedReceipt, ParseError> {
        let mut items = Vec::new();
        let mut detected_total: Option<i64> = None;
        let mut detected_subtotal: Option<i64> = None;
        let mut computed_sum: i64 = 0;

        for raw in text.lines() {
            let line = normalize_line(raw);
            match self.classifier.classify(&line) {
                LineClass::Total(value) => {
                    if detected_total.is_none() {
                        detected_total = Some(value);
                    }
                }
                LineClass::Subtotal(value) => {
                    if detected_subtotal.is_none() {
                        detected_subtotal = Some(value);
                    }
                }
                LineClass::CashOrChange | LineClass::Ignorable => {}
                LineClass::ItemCandidate => {
                    if let Some(item) = self.extractor.extract(&line.text) {
                        computed_sum = computed_sum
                            .checked_add(item.cents)
                            .ok_or(ParseError::SumOutOfRange)?;
                        items.push(ReceiptItem {
                            id: items.len() as u32,
                            description: item.description,
                            price: format_decimal(item.cents),
                        });
                    }
                }
            }
        }

        let (total, total_source) = match (detected_total, detected_subtotal) {
            (Some(total), _) => (total, TotalSource::PrintedTotal),
            (None, Some(subtotal)) => (subtotal, TotalSource::PrintedSubtotal),
            (None, None) => (computed_sum, TotalSource::ItemSum),
        };

        debug!(
            receipt_id = %receipt_id,
            items = items.len(),
            total = %format_decimal(total),
            source = ?total_source,
            "parsed receipt text"
        );

        Ok(ParsedReceipt {
            items,
            total: format_decimal(total),
            total_source,
            computed_sum: format_decimal(computed_sum),
            detected_total: detected_total.map(format_decimal),
            detected_subtotal: detected_subtotal.map(format_decimal),
        })
    }
}
