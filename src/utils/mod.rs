use anyhow::{anyhow, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};

const MAX_AMOUNT_DIGITS: usize = 15;

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Formats an amount in cents as a two-decimal string (`1234` -> `"12.34"`).
pub fn format_decimal(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

pub fn format_usd(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

/// Parses a printed amount into cents.
///
/// Accepts an optional sign, an optional leading `$`, thousands separators and
/// either `.` or `,` as decimal separator. A trailing separator group of one or
/// two digits is the fraction; a group of three digits is a thousands group.
pub fn parse_decimal(value: &str) -> Result<i64> {
    let mut raw = value.trim();
    let mut negative = false;
    if let Some(rest) = raw.strip_prefix('-') {
        negative = true;
        raw = rest.trim_start();
    } else if let Some(rest) = raw.strip_prefix('+') {
        raw = rest.trim_start();
    }
    raw = raw.strip_prefix('$').unwrap_or(raw).trim_start();

    if raw.is_empty() {
        return Err(anyhow!("Parse decimal: empty amount"));
    }
    if !raw.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return Err(anyhow!("Parse decimal: invalid amount '{}'", value));
    }

    let (int_part, frac_part) = match raw.rfind(['.', ',']) {
        Some(pos) => {
            let tail = &raw[pos + 1..];
            match tail.len() {
                1 | 2 => (&raw[..pos], tail),
                3 => (raw, ""),
                _ => return Err(anyhow!("Parse decimal: invalid amount '{}'", value)),
            }
        }
        None => (raw, ""),
    };

    let mut groups = int_part.split(['.', ',']);
    let first = groups.next().unwrap_or_default();
    if first.is_empty() && !int_part.is_empty() {
        return Err(anyhow!("Parse decimal: invalid amount '{}'", value));
    }
    let mut digits = first.to_string();
    for group in groups {
        if group.len() != 3 {
            return Err(anyhow!("Parse decimal: bad digit grouping in '{}'", value));
        }
        digits.push_str(group);
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if digits.len() > MAX_AMOUNT_DIGITS {
        return Err(anyhow!("Parse decimal: amount too large '{}'", value));
    }

    let whole: i64 = digits
        .parse()
        .map_err(|e| anyhow!("Parse decimal: {}", e))?;
    let fraction: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>()? * 10,
        _ => frac_part.parse::<i64>()?,
    };

    let cents = whole * 100 + fraction;
    Ok(if negative { -cents } else { cents })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_grouped_amounts() {
        assert_eq!(parse_decimal("3.50").unwrap(), 350);
        assert_eq!(parse_decimal("3.5").unwrap(), 350);
        assert_eq!(parse_decimal("12").unwrap(), 1200);
        assert_eq!(parse_decimal("1,234.56").unwrap(), 123_456);
        assert_eq!(parse_decimal("1.234,56").unwrap(), 123_456);
        assert_eq!(parse_decimal("12,50").unwrap(), 1250);
        assert_eq!(parse_decimal("1,234").unwrap(), 123_400);
        assert_eq!(parse_decimal("$ 6.00").unwrap(), 600);
        assert_eq!(parse_decimal(".99").unwrap(), 99);
        assert_eq!(parse_decimal("-2.00").unwrap(), -200);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal("abc").is_err());
        assert!(parse_decimal("NaN").is_err());
        assert!(parse_decimal("inf").is_err());
        assert!(parse_decimal("1.2345").is_err());
        assert!(parse_decimal("12,34,5").is_err());
        assert!(parse_decimal("9999999999999999").is_err());
    }

    #[test]
    fn formats_cents() {
        assert_eq!(format_decimal(575), "5.75");
        assert_eq!(format_decimal(5), "0.05");
        assert_eq!(format_decimal(-150), "-1.50");
        assert_eq!(format_usd(600), "$6.00");
    }
}
