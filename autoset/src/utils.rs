//! Small helpers shared by the engine and the backends

/// Render a number the way a numeric input's `value` property holds it:
/// shortest round-trip form, no trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // also folds -0.0
        return "0".to_string();
    }
    format!("{value}")
}

/// Parse the `value` property of a numeric control. Empty or non-numeric
/// text yields `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Equality within an absolute tolerance. A negative or NaN tolerance is
/// treated as zero.
pub fn within_tolerance(current: f64, target: f64, tolerance: f64) -> bool {
    let tolerance = if tolerance.is_nan() { 0.0 } else { tolerance.max(0.0) };
    (current - target).abs() <= tolerance
}

/// Normalize label text for comparison: trim and collapse inner whitespace.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_an_input_value() {
        assert_eq!(format_number(0.7), "0.7");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.95), "0.95");
    }

    #[test]
    fn parses_numeric_values() {
        assert_eq!(parse_number(" 0.25 "), Some(0.25));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn tolerance_is_inclusive() {
        assert!(within_tolerance(0.0003, 0.0, 0.001));
        assert!(within_tolerance(0.7005, 0.7, 0.001));
        assert!(!within_tolerance(0.71, 0.7, 0.001));
        assert!(within_tolerance(0.7, 0.7, -1.0));
    }

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_text("  Top \n  P "), "Top P");
    }
}
