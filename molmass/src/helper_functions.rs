//! Small shared helpers for tokenization and number formatting.

/// Canonical element/abbreviation casing: first character uppercase, the
/// rest lowercase. Only used on ASCII symbol candidates.
pub(crate) fn capitalized(symbol: &str) -> String {
    let mut chars = symbol.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
    })
}

/// Format a count for formula text: integers without a decimal part,
/// fractional counts with their trailing zeros trimmed.
pub(crate) fn format_count(count: f64) -> String {
    if (count - count.round()).abs() < 1e-10 {
        format!("{}", count.round() as i64)
    } else {
        let text = format!("{count:.10}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Format a value to the given number of significant digits.
pub(crate) fn format_significant(value: f64, digits: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }
    let magnitude = value.abs().log10().floor() as i64;
    let decimals = (digits as i64 - 1 - magnitude).max(0) as usize;
    format!("{value:.decimals$}")
}

#[test]
fn test_format_count() {
    assert_eq!(format_count(6.0), "6");
    assert_eq!(format_count(-2.0), "-2");
    assert_eq!(format_count(1.5), "1.5");
    assert_eq!(format_count(0.1), "0.1");
}

#[test]
fn test_format_significant() {
    assert_eq!(format_significant(53.2856, 5), "53.286");
    assert_eq!(format_significant(0.00123456, 3), "0.00123");
    assert_eq!(format_significant(100.0, 4), "100.0");
}

#[test]
fn test_capitalized() {
    assert_eq!(capitalized("co"), "Co");
    assert_eq!(capitalized("FE"), "Fe");
    assert_eq!(capitalized("h"), "H");
}
