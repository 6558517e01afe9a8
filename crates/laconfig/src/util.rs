use std::borrow::Cow;

/// Case-insensitive name comparison used for every section and attribute lookup
pub(crate) fn names_eq(a: &str, b: &str) -> bool {
    if a.len() == b.len() && a.eq_ignore_ascii_case(b) {
        return true;
    }

    if a.is_ascii() && b.is_ascii() {
        return false;
    }

    a.to_lowercase() == b.to_lowercase()
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// A strict name is what both laconic and xml accept without quoting or escaping
///
/// ```
/// # use laconfig::util::is_strict_name;
/// assert!(is_strict_name("log-level"));
/// assert!(!is_strict_name("1st"));
/// assert!(!is_strict_name("a b"));
/// ```
pub fn is_strict_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    is_name_start(first) && chars.all(is_name_char)
}

/// Replace everything outside the strict charset
///
/// Offending characters become `-`, a name that does not start with a letter is prefixed with `_`.
pub fn normalize_name(name: &str) -> Cow<'_, str> {
    if is_strict_name(name) {
        return Cow::Borrowed(name);
    }

    let mut normalized = String::with_capacity(name.len() + 1);
    match name.chars().next() {
        Some(first) if is_name_start(first) => {}
        _ => normalized.push('_'),
    }

    normalized.extend(
        name.chars()
            .map(|c| if is_name_char(c) { c } else { '-' }),
    );

    Cow::Owned(normalized)
}

/// 1-based line and column of a byte offset
pub(crate) fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text[..floor_char_boundary(text, offset)];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(newline) => before[newline + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };

    (line, column)
}

fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
