//! IFS word splitting

/// IFS used when the variable is unset.
pub const DEFAULT_IFS: &str = " \t\n";

/// Result of splitting one expansion result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    /// Fields in order. A leading non-whitespace separator yields an empty
    /// first field; a trailing separator does not yield an empty last one.
    pub fields: Vec<String>,
    /// The text started with a separator: it cannot join the field before it.
    pub leading_boundary: bool,
    /// The text ended with a separator: it cannot join the field after it.
    pub trailing_boundary: bool,
}

fn is_ifs_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

/// Split `text` on the characters of `ifs`.
///
/// Whitespace separators collapse into one boundary and are ignored at
/// either end. Every other separator is significant on its own, so
/// `a::b` with `IFS=:` has an empty middle field. An empty `ifs` disables
/// splitting.
pub fn split_fields(text: &str, ifs: &str) -> Split {
    if text.is_empty() {
        return Split::default();
    }
    if ifs.is_empty() {
        return Split {
            fields: vec![text.to_string()],
            ..Split::default()
        };
    }

    let is_sep = |c: char| ifs.contains(c);
    let is_ws = |c: char| is_sep(c) && is_ifs_whitespace(c);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut i = 0;
    let mut result = Split::default();

    while i < len && is_ws(chars[i]) {
        i += 1;
    }
    if i > 0 {
        result.leading_boundary = true;
    }
    if i < len && is_sep(chars[i]) {
        result.leading_boundary = true;
        result.fields.push(String::new());
        i += 1;
        while i < len && is_ws(chars[i]) {
            i += 1;
        }
    }
    if i >= len {
        result.trailing_boundary = true;
        return result;
    }

    loop {
        let mut field = String::new();
        while i < len && !is_sep(chars[i]) {
            field.push(chars[i]);
            i += 1;
        }
        result.fields.push(field);
        if i >= len {
            break;
        }

        // one delimiter: whitespace, at most one other separator, whitespace
        while i < len && is_ws(chars[i]) {
            i += 1;
        }
        if i < len && is_sep(chars[i]) && !is_ws(chars[i]) {
            i += 1;
            while i < len && is_ws(chars[i]) {
                i += 1;
            }
        }
        if i >= len {
            result.trailing_boundary = true;
            break;
        }
    }
    result
}

/// Split text the way an unquoted expansion is split. `ifs` is `None` when
/// the variable is unset.
pub fn word_split(text: &str, ifs: Option<&str>) -> Vec<String> {
    split_fields(text, ifs.unwrap_or(DEFAULT_IFS)).fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ifs_compresses_whitespace() {
        assert_eq!(word_split("a  b\tc", None), vec!["a", "b", "c"]);
        assert_eq!(word_split("  a b  ", None), vec!["a", "b"]);
        assert!(word_split("   ", None).is_empty());
        assert!(word_split("", None).is_empty());
    }

    #[test]
    fn test_colon_ifs() {
        assert_eq!(word_split("a:b:c", Some(":")), vec!["a", "b", "c"]);
        assert_eq!(word_split("a::b", Some(":")), vec!["a", "", "b"]);
        assert_eq!(word_split(":a", Some(":")), vec!["", "a"]);
        assert_eq!(word_split("a:", Some(":")), vec!["a"]);
    }

    #[test]
    fn test_mixed_ifs() {
        assert_eq!(word_split("a : b  c", Some(" :")), vec!["a", "b", "c"]);
        assert_eq!(word_split("a :: b", Some(" :")), vec!["a", "", "b"]);
    }

    #[test]
    fn test_empty_ifs_does_not_split() {
        assert_eq!(word_split("a b c", Some("")), vec!["a b c"]);
    }

    #[test]
    fn test_boundaries() {
        let split = split_fields(" a ", DEFAULT_IFS);
        assert!(split.leading_boundary);
        assert!(split.trailing_boundary);
        let split = split_fields("a", DEFAULT_IFS);
        assert!(!split.leading_boundary);
        assert!(!split.trailing_boundary);
        let split = split_fields("a:", ":");
        assert!(split.trailing_boundary);
    }
}
