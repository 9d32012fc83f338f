//! `{name}` placeholder substitution for prompt templates

/// Replace each `{key}` in `template` with its value
///
/// Placeholders without a value are left as they are.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{key}}}"), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_every_occurrence() {
        let text = fill("{a} and {a} then {b}", &[("a", "x"), ("b", "y")]);
        assert_eq!(text, "x and x then y");
    }

    #[test]
    fn test_unknown_placeholders_survive() {
        assert_eq!(fill("{missing}", &[("a", "x")]), "{missing}");
    }
}
