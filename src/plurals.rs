//! Detection of strings that consist of a single ICU plural construct.
//!
//! This is not a formatter. It only answers "is this whole string one
//! `{var, plural, ...}` block?" and, if so, splits it into its forms. Forms are
//! keyed by a representative count per rule: zero=0, one=1, two=2, few=3,
//! many=4, other=5.

use std::collections::BTreeMap;

/// Representative count of the `other` form. Non-plural strings are returned
/// under this key.
pub const OTHER: u32 = 5;

/// Parse `text` as a plural string.
///
/// Returns `(true, forms)` for a valid plural, otherwise `(false, {5: text})`
/// so callers can treat both cases through the same map.
pub fn parse_plurals(text: &str) -> (bool, BTreeMap<u32, String>) {
    match try_parse_plurals(text) {
        Some(forms) => (true, forms),
        None => (false, BTreeMap::from([(OTHER, text.to_string())])),
    }
}

/// Shorthand for the first half of [`parse_plurals`].
pub fn is_plural(text: &str) -> bool {
    try_parse_plurals(text).is_some()
}

/// Name of the plural variable, if `text` is a plural string.
pub fn plural_variable(text: &str) -> Option<&str> {
    try_parse_plurals(text)?;
    let comma = text.find(',')?;
    Some(text[1..comma].trim())
}

fn rule_to_count(rule: &str) -> Option<u32> {
    let count = match rule {
        "zero" | "=0" => 0,
        "one" | "=1" => 1,
        "two" | "=2" => 2,
        "few" | "=3" => 3,
        "many" | "=4" => 4,
        "other" | "=5" => 5,
        _ => return None,
    };
    Some(count)
}

/// Byte index of the `}` closing the `{` at `open`, honouring apostrophe
/// escapes: `''` is a literal quote and `'{` / `'}` start a quoted run that
/// ends at the next lone quote.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut i = open;

    while i < bytes.len() {
        let c = bytes[i];
        if c == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            if quoted {
                quoted = false;
            } else if matches!(bytes.get(i + 1), Some(b'{') | Some(b'}')) {
                quoted = true;
            }
        } else if !quoted {
            if c == b'{' {
                depth += 1;
            } else if c == b'}' {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn try_parse_plurals(text: &str) -> Option<BTreeMap<u32, String>> {
    if !text.starts_with('{') || matching_brace(text, 0)? != text.len() - 1 {
        return None;
    }

    let inner = &text[1..text.len() - 1];
    let (variable, rest) = inner.split_once(',')?;
    let variable = variable.trim();
    if variable.is_empty() || variable.contains(['{', '}']) {
        return None;
    }

    let (keyword, body) = rest.split_once(',')?;
    if keyword.trim() != "plural" {
        return None;
    }

    let mut forms = BTreeMap::new();
    let mut pos = 0;
    loop {
        let remaining = &body[pos..];
        let trimmed = remaining.trim_start();
        if trimmed.is_empty() {
            break;
        }
        pos += remaining.len() - trimmed.len();

        let rule_len = trimmed.find(|c: char| c == '{' || c.is_whitespace())?;
        let count = rule_to_count(&trimmed[..rule_len])?;
        pos += rule_len;

        let after_rule = &body[pos..];
        let open = pos + (after_rule.len() - after_rule.trim_start().len());
        if body.as_bytes().get(open) != Some(&b'{') {
            return None;
        }
        let close = matching_brace(body, open)?;
        forms.insert(count, body[open + 1..close].to_string());
        pos = close + 1;
    }

    if forms.contains_key(&1) && forms.contains_key(&OTHER) {
        Some(forms)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple() {
        assert!(!is_plural("hello world"));
        assert!(is_plural("{cnt, plural, one {ONE} other {OTHER}}"));
        assert!(is_plural("{cnt, plural, one {ONE} =5 {OTHER}}"));
        assert!(is_plural("{cnt, plural, =1 {ONE} other {OTHER}}"));
        assert!(is_plural("{cnt, plural, =1 {ONE} =5 {OTHER}}"));
    }

    #[test]
    fn test_almost_plural() {
        assert!(!is_plural("{cnt, plural, one {ONE} other {OTHER}"));
        assert!(!is_plural("{cnt, plurall, one {ONE} other {OTHER}}"));
        assert!(!is_plural("{cnt, plural, onee {ONE} other {OTHER}}"));
        assert!(!is_plural("{cnt, plural, =7 {ONE} other {OTHER}}"));
        assert!(!is_plural("{cnt, plural, one {ONE}, other {OTHER}}"));
        assert!(!is_plural("{cnt, plural, one {ONE} many {OTHER}}"));
        assert!(!is_plural("{cnt, plural, one {ONE}}"));
    }

    #[test]
    fn test_escapes() {
        assert!(is_plural("{cnt, plural, one {O '' NE} other {OTHER}}"));
        assert!(is_plural("{cnt, plural, one {O '{ NE'} other {OTHER}}"));
        assert!(is_plural("{cnt, plural, one {O '}' NE} other {OTHER}}"));
    }

    #[test]
    fn test_embedded_plural_is_not_plural() {
        assert!(!is_plural("You have {cnt, plural, one {one} other {many}}"));
        assert!(!is_plural("{cnt, plural, one {one} other {many}} items"));
    }

    #[test]
    fn test_forms_are_keyed_by_representative_count() {
        let (plural, forms) =
            parse_plurals("{cnt, plural, zero {none} one {{cnt} table} few {a few} other {{cnt} tables}}");
        assert!(plural);
        assert_eq!(forms.get(&0).map(String::as_str), Some("none"));
        assert_eq!(forms.get(&1).map(String::as_str), Some("{cnt} table"));
        assert_eq!(forms.get(&3).map(String::as_str), Some("a few"));
        assert_eq!(forms.get(&5).map(String::as_str), Some("{cnt} tables"));
    }

    #[test]
    fn test_failure_returns_whole_text_as_other() {
        let (plural, forms) = parse_plurals("{cnt, plural, one {ONE}}");
        assert!(!plural);
        assert_eq!(forms, BTreeMap::from([(5, "{cnt, plural, one {ONE}}".to_string())]));
    }

    #[test]
    fn test_plural_variable() {
        assert_eq!(plural_variable("{ cnt , plural, one {a} other {b}}"), Some("cnt"));
        assert_eq!(plural_variable("hello, world"), None);
    }

    proptest! {
        #[test]
        fn prop_valid_plurals_have_one_and_other(
            var in "[a-z_]{1,10}",
            one in "[a-zA-Z0-9 ]{0,20}",
            other in "[a-zA-Z0-9 ]{0,20}",
        ) {
            let text = format!("{{{}, plural, one {{{}}} other {{{}}}}}", var, one, other);
            let (plural, forms) = parse_plurals(&text);
            prop_assert!(plural);
            prop_assert_eq!(forms.get(&1), Some(&one));
            prop_assert_eq!(forms.get(&5), Some(&other));
        }

        #[test]
        fn prop_surrounding_text_is_never_plural(
            prefix in "[a-zA-Z ]{1,10}",
            body in "[a-zA-Z ]{0,10}",
        ) {
            let text = format!("{}{{cnt, plural, one {{{}}} other {{{}}}}}", prefix, body, body);
            let (plural, forms) = parse_plurals(&text);
            prop_assert!(!plural);
            prop_assert_eq!(forms, BTreeMap::from([(5, text.clone())]));
        }

        #[test]
        fn prop_text_without_braces_is_never_plural(text in "[^{}]{0,40}") {
            let (plural, forms) = parse_plurals(&text);
            prop_assert!(!plural);
            prop_assert_eq!(forms.get(&5), Some(&text));
        }
    }
}
