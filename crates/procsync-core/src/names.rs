//! Name comparison and normalization shared by procedures and parameters.

/// Case-insensitive name equality, used for procedure lookup, duplicate
/// parameter detection and variable renames.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Key under which a name is stored in case-insensitive indices.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Normalizes a user-supplied parameter name: runs of whitespace (including
/// non-breaking spaces) collapse to one space, leading and trailing
/// whitespace is stripped. Returns `None` if nothing is left.
pub fn normalize_param_name(raw: &str) -> Option<String> {
    let joined = raw
        .split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Trims a proposed procedure name. Returns `None` if it is blank.
pub fn normalize_procedure_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{a0}');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Derives a name for which `is_taken` returns false.
///
/// A trailing number is incremented (`foo9` -> `foo10`); a name without one
/// gets `2` appended (`foo` -> `foo2`).
pub fn find_legal_name(name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let mut candidate = name.to_string();
    while is_taken(&candidate) {
        let digits = candidate
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits == 0 {
            candidate.push('2');
            continue;
        }
        let split = candidate.len() - digits;
        let (stem, number) = candidate.split_at(split);
        candidate = match number.parse::<u64>() {
            Ok(n) => format!("{stem}{}", n + 1),
            Err(_) => format!("{candidate}2"),
        };
    }
    candidate
}
