//! Path normalization shared by every reader and by the comparison workers
//!
//! Inventories come from Windows shares and from cloud storage exports, so the
//! same file can be spelled with `\` or `/`, wrapped in CSV quotes, and with a
//! different letter case (cloud storage may change case on upload). Lookups
//! therefore always go through [`key`].

/// Canonicalize a raw path field: quote characters removed, `\` replaced by `/`
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|&c| c != '"')
        .map(|c| if c == '\\' { '/' } else { c })
        .collect()
}

/// Case-folded lookup key for a raw path field
pub fn key(raw: &str) -> String {
    normalize(raw).to_lowercase()
}

/// Normalize a directory prefix and make sure it ends with exactly one `/`
pub fn normalize_prefix(raw: &str) -> String {
    let mut prefix = normalize(raw);
    while prefix.ends_with("//") {
        prefix.pop();
    }
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// Strip one pair of surrounding quotes from a CSV field, if present
pub fn unquote(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_separators_and_quotes() {
        assert_eq!(normalize(r#""C:\share\pj\a.txt""#), "C:/share/pj/a.txt");
        assert_eq!(normalize("/already/clean"), "/already/clean");
    }

    #[test]
    fn test_key_is_case_folded() {
        assert_eq!(key(r"C:\Share\Report.XLSX"), "c:/share/report.xlsx");
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(r"C:\base"), "C:/base/");
        assert_eq!(normalize_prefix("C:/base/"), "C:/base/");
        assert_eq!(normalize_prefix(r"C:\base\\"), "C:/base/");
        assert_eq!(normalize_prefix(""), "/");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r#""name.txt""#), "name.txt");
        assert_eq!(unquote("bare"), "bare");
        assert_eq!(unquote(r#""half"#), r#""half"#);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(p in r#"[a-zA-Z0-9 ."\\/~$_-]{0,40}"#) {
            let once = normalize(&p);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prop_key_ignores_case(p in r#"[a-zA-Z0-9 ."\\/_-]{0,40}"#) {
            prop_assert_eq!(key(&p), key(&p.to_uppercase()));
        }

        #[test]
        fn prop_prefix_has_single_trailing_slash(p in r"[a-zA-Z0-9:\\/]{0,20}") {
            let prefix = normalize_prefix(&p);
            prop_assert!(prefix.ends_with('/'));
            prop_assert!(!prefix.ends_with("//"));
        }
    }
}
