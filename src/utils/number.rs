// src/utils/number.rs

//! Parsing of abbreviated, human-readable counts ("46K", "1.2M", "12,345").

/// Parse a displayed count into an integer.
///
/// Thousands separators and whitespace are ignored, a trailing `K` or `M`
/// (any case) scales by 1,000 or 1,000,000, and fractional remainders are
/// truncated. Anything malformed yields 0 so a missing count only degrades
/// the record.
pub fn parse_count(text: &str) -> u64 {
    try_parse_count(text).unwrap_or(0)
}

/// Like [`parse_count`], but `None` for malformed input so callers can tell
/// a real zero from unreadable text.
pub fn try_parse_count(text: &str) -> Option<u64> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let (digits, scale) = match cleaned.chars().last() {
        Some('k' | 'K') => (&cleaned[..cleaned.len() - 1], 1_000),
        Some('m' | 'M') => (&cleaned[..cleaned.len() - 1], 1_000_000),
        _ => (cleaned.as_str(), 1),
    };

    scale_decimal(digits, scale)
}

/// Multiply a plain decimal string by `scale` using integer arithmetic.
fn scale_decimal(digits: &str, scale: u64) -> Option<u64> {
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole_value: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut value = whole_value.checked_mul(scale)?;

    let mut place = scale;
    for digit in fraction.bytes() {
        place /= 10;
        if place == 0 {
            break;
        }
        value = value.checked_add(u64::from(digit - b'0') * place)?;
    }

    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffixes() {
        assert_eq!(parse_count("1K"), 1000);
        assert_eq!(parse_count("46K"), 46_000);
        assert_eq!(parse_count("2.5M"), 2_500_000);
        assert_eq!(parse_count("1.2m"), 1_200_000);
        assert_eq!(parse_count("3.75k"), 3750);
    }

    #[test]
    fn test_separators() {
        assert_eq!(parse_count("1,234"), 1234);
        assert_eq!(parse_count("12,345"), 12_345);
        assert_eq!(parse_count(" 1,234,567 "), 1_234_567);
    }

    #[test]
    fn test_truncates_fraction() {
        assert_eq!(parse_count("12.9"), 12);
        assert_eq!(parse_count("1.2345K"), 1234);
    }

    #[test]
    fn test_malformed_is_zero() {
        assert_eq!(parse_count("garbage"), 0);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("K"), 0);
        assert_eq!(parse_count("1.2.3"), 0);
        assert_eq!(parse_count("-5"), 0);
        assert_eq!(parse_count("2B"), 0);
        assert_eq!(parse_count("99999999999999999999"), 0);
    }

    #[test]
    fn test_try_parse_separates_zero_from_garbage() {
        assert_eq!(try_parse_count("0"), Some(0));
        assert_eq!(try_parse_count("1.2K"), Some(1200));
        assert_eq!(try_parse_count("Liked by anna and others"), None);
        assert_eq!(try_parse_count(""), None);
    }

    #[test]
    fn test_idempotent_on_integers() {
        for n in [0u64, 7, 1000, 987_654_321] {
            let once = parse_count(&n.to_string());
            assert_eq!(once, n);
            assert_eq!(parse_count(&once.to_string()), once);
        }
    }
}
