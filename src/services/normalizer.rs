use once_cell::sync::Lazy;
use regex::Regex;

static DIGIT_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d) (\d{3})\b").expect("digit group pattern"));

/// A raw OCR line after cleanup, plus its lowercase copy for keyword tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLine {
    pub text: String,
    pub lower: String,
}

/// Cleans one OCR line. Never fails; the worst case is the input, trimmed.
pub fn normalize_line(raw: &str) -> NormalizedLine {
    let tokens = raw
        .split_whitespace()
        .map(fix_numeric_token)
        .collect::<Vec<_>>();
    let mut text = tokens.join(" ");

    // "1 234 567" needs one pass per group.
    for _ in 0..4 {
        let repaired = DIGIT_GROUP.replace_all(&text, "$1$2");
        if repaired == text {
            break;
        }
        text = repaired.into_owned();
    }

    let text = text.trim().to_string();
    let lower = text.to_lowercase();
    NormalizedLine { text, lower }
}

/// Applies letter-for-digit fixes only to tokens that already read as numbers.
fn fix_numeric_token(token: &str) -> String {
    if !is_numeric_context(token) {
        return token.to_string();
    }
    token
        .chars()
        .map(|c| match c {
            'o' | 'O' => '0',
            'l' | 'I' => '1',
            's' | 'S' => '5',
            other => other,
        })
        .collect()
}

fn is_numeric_context(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token.chars().all(|c| {
            c.is_ascii_digit()
                || matches!(c, 'o' | 'O' | 'l' | 'I' | 's' | 'S' | '.' | ',' | '-' | '+')
                || !c.is_alphanumeric()
        })
}
