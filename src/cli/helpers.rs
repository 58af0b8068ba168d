//! Shared helper functions for CLI commands.

/// Truncate for table columns, on a char boundary.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Show an empty field as a dash.
pub fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Chennai", 10), "Chennai");
        assert_eq!(truncate("Thiruvananthapuram", 10), "Thiruva...");
        assert_eq!(truncate("ಬೆಂಗಳೂರು ನಗರ", 6), "ಬೆಂ...");
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(""), "-");
        assert_eq!(or_dash("x"), "x");
    }
}
