/// Key used for exact price lookups: surrounding whitespace trimmed, lowercased.
///
/// Internal whitespace is left alone, so `"copper  wire"` and `"copper wire"`
/// are different keys.
pub fn normalize_material_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Parses a price-sheet number such as `"$1,250.50"`, `"12.5%"` or `"3"`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('%')
        .trim_start_matches(|c: char| matches!(c, '$' | '€' | '£'))
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trims_and_lowercases() {
        assert_eq!(normalize_material_name(" Copper Wire "), "copper wire");
        assert_eq!(
            normalize_material_name(" Copper Wire "),
            normalize_material_name("copper wire")
        );
    }

    #[test]
    fn internal_whitespace_is_significant() {
        assert_ne!(
            normalize_material_name("Copper  Wire"),
            normalize_material_name("Copper Wire")
        );
    }

    #[test]
    fn parses_decorated_amounts() {
        assert_eq!(parse_amount("$1,250.50"), Some(1250.5));
        assert_eq!(parse_amount("12.5%"), Some(12.5));
        assert_eq!(parse_amount(" 3 "), Some(3.0));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(name in "[ A-Za-z0-9-]{0,32}") {
            let once = normalize_material_name(&name);
            prop_assert_eq!(normalize_material_name(&once), once.clone());
        }

        #[test]
        fn padding_never_changes_the_key(name in "[A-Za-z][A-Za-z0-9 ]{0,24}[A-Za-z0-9]", pad in 0usize..4) {
            let padded = format!("{}{}{}", " ".repeat(pad), name.to_uppercase(), "\t".repeat(pad));
            prop_assert_eq!(normalize_material_name(&padded), normalize_material_name(&name));
        }
    }
}
