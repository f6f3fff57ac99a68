use crate::services::amount::AmountGrammar;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedItem {
    pub description: String,
    pub cents: i64,
}

/// Splits an item-candidate line into description and trailing price.
#[derive(Debug, Clone)]
pub struct ItemExtractor {
    amount: AmountGrammar,
}

impl ItemExtractor {
    pub fn new(amount: AmountGrammar) -> Self {
        ItemExtractor { amount }
    }

    pub fn extract(&self, line: &str) -> Option<ExtractedItem> {
        let amount = self.amount.trailing(line)?;
        if amount.cents < 0 {
            return None;
        }

        let raw = line[..amount.start].trim();
        if raw.is_empty() || raw.chars().all(is_filler) {
            return None;
        }

        let description = raw
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ':' | '-' | '—' | '–' | '…' | '*'))
            .trim_start_matches(|c: char| c.is_whitespace() || c == '*')
            .to_string();
        if description.chars().count() <= 1 {
            return None;
        }

        Some(ExtractedItem {
            description,
            cents: amount.cents,
        })
    }
}

fn is_filler(c: char) -> bool {
    c.is_ascii_digit() || c.is_whitespace() || matches!(c, '-' | '—' | '–')
}
