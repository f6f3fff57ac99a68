use regex::Regex;

use crate::utils::parse_decimal;

/// An amount found at the end of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingAmount {
    /// Byte offset where the amount (including sign and currency symbol) starts.
    pub start: usize,
    pub cents: i64,
}

/// Currency-optional numeric grammar shared by the classifier and the extractor.
#[derive(Debug, Clone)]
pub struct AmountGrammar {
    trailing: Regex,
}

impl AmountGrammar {
    pub fn new(currency_symbols: &[String]) -> Result<Self, regex::Error> {
        let mut symbols = currency_symbols
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>();
        symbols.sort_by(|a, b| b.len().cmp(&a.len()));
        let symbol = if symbols.is_empty() {
            r"\$".to_string()
        } else {
            symbols.join("|")
        };

        let pattern = format!(
            r"(?i)(?P<sign>[-+])?(?:(?:{sym})\s?|\b)(?P<num>\d{{1,3}}(?:[,.]\d{{3}})+(?:[.,]\d{{1,2}})?|\d+(?:[.,]\d{{1,2}})?)(?:\s?(?:{sym}))?\s*$",
            sym = symbol
        );
        Ok(AmountGrammar {
            trailing: Regex::new(&pattern)?,
        })
    }

    pub fn trailing(&self, line: &str) -> Option<TrailingAmount> {
        let caps = self.trailing.captures(line)?;
        let whole = caps.get(0)?;
        let num = caps.name("num")?.as_str();
        let mut cents = parse_decimal(num).ok()?;
        if caps.name("sign").map(|m| m.as_str()) == Some("-") {
            cents = -cents;
        }
        Some(TrailingAmount {
            start: whole.start(),
            cents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> AmountGrammar {
        AmountGrammar::new(&["$".to_string(), "€".to_string(), "USD".to_string()]).unwrap()
    }

    #[test]
    fn finds_amounts_with_and_without_symbols() {
        let g = grammar();
        assert_eq!(g.trailing("Coffee 3.50").map(|a| a.cents), Some(350));
        assert_eq!(g.trailing("TOTAL $6.00").map(|a| a.cents), Some(600));
        assert_eq!(g.trailing("Total 6,00 €").map(|a| a.cents), Some(600));
        assert_eq!(g.trailing("Total USD 1,234.50").map(|a| a.cents), Some(123_450));
        assert_eq!(g.trailing("Refund -$2.00").map(|a| a.cents), Some(-200));
        assert_eq!(g.trailing("Bagel 2").map(|a| a.cents), Some(200));
    }

    #[test]
    fn start_offset_excludes_description() {
        let g = grammar();
        let line = "Coffee - 3.50";
        let amount = g.trailing(line).unwrap();
        assert_eq!(amount.cents, 350);
        assert_eq!(line[..amount.start].trim(), "Coffee -");
    }

    #[test]
    fn no_trailing_number() {
        let g = grammar();
        assert!(g.trailing("Thank you").is_none());
        assert!(g.trailing("3.50 Coffee").is_none());
        assert!(g.trailing("").is_none());
    }
}
