//! Helpers for turning git stdout into values.

/// Non-empty, trimmed lines.
pub fn non_empty_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// First non-empty line, if any.
pub fn first_line(out: &str) -> Option<String> {
    out.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Single value printed by rev-parse style commands.
pub fn single_value(out: &str) -> String {
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_lines_drops_blanks() {
        assert_eq!(
            non_empty_lines("main\n\n  feature \n"),
            vec!["main".to_string(), "feature".to_string()]
        );
        assert!(non_empty_lines("\n\n").is_empty());
    }

    #[test]
    fn first_line_skips_leading_blanks() {
        assert_eq!(first_line("\nv2.0.0\nv1.0.0\n"), Some("v2.0.0".to_string()));
        assert_eq!(first_line(""), None);
    }

    #[test]
    fn single_value_trims_newline() {
        assert_eq!(single_value("/tmp/repo\n"), "/tmp/repo");
        assert_eq!(single_value("\n"), "");
    }
}
