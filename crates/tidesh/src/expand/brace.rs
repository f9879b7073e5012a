//! Brace expansion: `pre{a,b}post`, `{1..5}`, `{a..e}`, `{01..10..3}`

/// Expand every brace expression in `text`. Text without a valid brace
/// expression comes back as a single item.
pub fn brace_expand(text: &str) -> Vec<String> {
    let Some((open, close, alternatives)) = find_brace(text) else {
        return vec![text.to_string()];
    };
    let prefix = &text[..open];
    let suffixes = brace_expand(&text[close + 1..]);

    let mut out = Vec::new();
    for alternative in alternatives {
        for expanded in brace_expand(&alternative) {
            for suffix in &suffixes {
                out.push(format!("{prefix}{expanded}{suffix}"));
            }
        }
    }
    out
}

/// First `{...}` that is a comma list or a sequence, as (open, close, items).
fn find_brace(text: &str) -> Option<(usize, usize, Vec<String>)> {
    let bytes = text.as_bytes();
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find('{') {
        let open = search_from + rel;
        search_from = open + 1;
        if open > 0 && matches!(bytes[open - 1], b'$' | b'\\') {
            continue;
        }
        let Some(close) = matching_close(text, open) else {
            continue;
        };
        let body = &text[open + 1..close];
        let parts = split_top_level_commas(body);
        if parts.len() > 1 {
            return Some((open, close, parts));
        }
        if let Some(items) = sequence(body) {
            return Some((open, close, items));
        }
    }
    None
}

fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in text[open..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level_commas(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut escaped = false;
    for c in body.chars() {
        if escaped {
            escaped = false;
            current.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                current.push(c);
            }
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// `{x..y}` or `{x..y..step}` for integers or single letters.
fn sequence(body: &str) -> Option<Vec<String>> {
    let pieces: Vec<&str> = body.split("..").collect();
    let (start, end, step) = match pieces.as_slice() {
        [start, end] => (*start, *end, None),
        [start, end, step] => (*start, *end, Some(step.parse::<i64>().ok()?)),
        _ => return None,
    };
    let step = step.map(i64::unsigned_abs).filter(|s| *s > 0).unwrap_or(1) as usize;

    if let (Ok(a), Ok(b)) = (start.parse::<i64>(), end.parse::<i64>()) {
        let padded = |s: &str| {
            let digits = s.trim_start_matches('-');
            digits.len() > 1 && digits.starts_with('0')
        };
        let width = if padded(start) || padded(end) {
            start.len().max(end.len())
        } else {
            0
        };
        let values: Vec<i64> = if a <= b {
            (a..=b).step_by(step).collect()
        } else {
            (b..=a).rev().step_by(step).collect()
        };
        return Some(
            values
                .into_iter()
                .map(|v| {
                    if width > 0 {
                        if v < 0 {
                            format!("-{:0>w$}", v.unsigned_abs(), w = width - 1)
                        } else {
                            format!("{v:0>width$}")
                        }
                    } else {
                        v.to_string()
                    }
                })
                .collect(),
        );
    }

    let mut a_chars = start.chars();
    let mut b_chars = end.chars();
    let (Some(a), None, Some(b), None) = (a_chars.next(), a_chars.next(), b_chars.next(), b_chars.next())
    else {
        return None;
    };
    if !a.is_ascii_alphabetic() || !b.is_ascii_alphabetic() {
        return None;
    }
    let (a, b) = (a as u8, b as u8);
    let values: Vec<u8> = if a <= b {
        (a..=b).step_by(step).collect()
    } else {
        (b..=a).rev().step_by(step).collect()
    };
    Some(values.into_iter().map(|c| (c as char).to_string()).collect())
}
