use regex::Regex;
use std::ops::Range;

use crate::services::amount::AmountGrammar;
use crate::services::keywords::KeywordTable;
use crate::services::normalizer::NormalizedLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Total(i64),
    Subtotal(i64),
    CashOrChange,
    Ignorable,
    ItemCandidate,
}

/// Ordered keyword rules: total > subtotal > cash/change > ignorable > item.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    total: Regex,
    subtotal: Regex,
    cash_change: Regex,
    ignorable: Regex,
    amount: AmountGrammar,
}

impl LineClassifier {
    pub fn new(table: &KeywordTable) -> Result<Self, regex::Error> {
        Ok(LineClassifier {
            total: keyword_pattern(&table.total)?,
            subtotal: keyword_pattern(&table.subtotal)?,
            cash_change: keyword_pattern(&table.cash_change)?,
            ignorable: keyword_pattern(&table.ignorable)?,
            amount: AmountGrammar::new(&table.currency_symbols)?,
        })
    }

    pub fn amount_grammar(&self) -> &AmountGrammar {
        &self.amount
    }

    pub fn classify(&self, line: &NormalizedLine) -> LineClass {
        if let Some(amount) = self.amount.trailing(&line.text) {
            if self.is_total(&line.lower) {
                return LineClass::Total(amount.cents);
            }
            if self.subtotal.is_match(&line.lower) {
                return LineClass::Subtotal(amount.cents);
            }
        }
        if self.cash_change.is_match(&line.lower) {
            return LineClass::CashOrChange;
        }
        if self.ignorable.is_match(&line.lower) || !line.text.chars().any(|c| c.is_alphabetic()) {
            return LineClass::Ignorable;
        }
        LineClass::ItemCandidate
    }

    /// A total keyword that only occurs inside a subtotal phrase ("sub total",
    /// "sous-total") does not count.
    fn is_total(&self, lower: &str) -> bool {
        let subtotal_spans = self
            .subtotal
            .find_iter(lower)
            .map(|m| m.range())
            .collect::<Vec<Range<usize>>>();
        self.total.find_iter(lower).any(|m| {
            !subtotal_spans
                .iter()
                .any(|span| span.start <= m.start() && m.end() <= span.end)
        })
    }
}

fn keyword_pattern(keywords: &[String]) -> Result<Regex, regex::Error> {
    let mut words = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>();
    words.sort_by(|a, b| b.len().cmp(&a.len()));
    words.dedup();
    let alternation = words
        .iter()
        .map(|k| {
            k.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");
    if alternation.is_empty() {
        // Matches nothing.
        return Regex::new(r"\b\B");
    }
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))
}
