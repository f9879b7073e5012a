//! Pattern matching and pathname expansion
//!
//! Patterns use shell syntax: `*`, `?`, bracket expressions with ranges,
//! negation (`!` or `^`) and POSIX classes, and backslash escapes. Quoted
//! text reaches this module already escaped, so a quoted `*` never matches
//! more than itself.

use std::path::Path;

/// Knobs for pathname expansion.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobOptions {
    /// Let patterns match names starting with `.`
    pub dotglob: bool,
    /// `**` matches any number of directories
    pub globstar: bool,
}

/// Whether the pattern contains an unescaped glob metacharacter.
pub fn has_glob_chars(pattern: &str) -> bool {
    let mut escaped = false;
    for c in pattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// Escape glob metacharacters so the text only matches itself.
pub fn escape_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Remove pattern escapes.
pub fn unescape_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone)]
enum Token {
    Char(char),
    Any,
    Star,
    Class { negated: bool, items: Vec<ClassItem> },
}

#[derive(Debug, Clone)]
enum ClassItem {
    Char(char),
    Range(char, char),
    Named(String),
}

impl ClassItem {
    fn matches(&self, c: char) -> bool {
        match self {
            ClassItem::Char(x) => *x == c,
            ClassItem::Range(lo, hi) => *lo <= c && c <= *hi,
            ClassItem::Named(name) => match name.as_str() {
                "alpha" => c.is_alphabetic(),
                "digit" => c.is_ascii_digit(),
                "alnum" => c.is_alphanumeric(),
                "upper" => c.is_uppercase(),
                "lower" => c.is_lowercase(),
                "space" => c.is_whitespace(),
                "blank" => c == ' ' || c == '\t',
                "punct" => c.is_ascii_punctuation(),
                "xdigit" => c.is_ascii_hexdigit(),
                "cntrl" => c.is_control(),
                "print" => !c.is_control(),
                "graph" => !c.is_control() && !c.is_whitespace(),
                _ => false,
            },
        }
    }
}

fn compile(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                tokens.push(Token::Char(chars[i + 1]));
                i += 2;
            }
            '*' => {
                if !matches!(tokens.last(), Some(Token::Star)) {
                    tokens.push(Token::Star);
                }
                i += 1;
            }
            '?' => {
                tokens.push(Token::Any);
                i += 1;
            }
            '[' => match compile_class(&chars, i + 1) {
                Some((token, next)) => {
                    tokens.push(token);
                    i = next;
                }
                None => {
                    tokens.push(Token::Char('['));
                    i += 1;
                }
            },
            c => {
                tokens.push(Token::Char(c));
                i += 1;
            }
        }
    }
    tokens
}

/// Parse a bracket expression starting after `[`. Returns the token and the
/// index after the closing `]`, or `None` if the bracket is unterminated.
fn compile_class(chars: &[char], start: usize) -> Option<(Token, usize)> {
    let mut i = start;
    let negated = matches!(chars.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }
    let mut items = Vec::new();
    let mut first = true;
    loop {
        let c = *chars.get(i)?;
        if c == ']' && !first {
            return Some((Token::Class { negated, items }, i + 1));
        }
        first = false;
        if c == '[' && chars.get(i + 1) == Some(&':') {
            let rest: String = chars[i + 2..].iter().collect();
            if let Some(end) = rest.find(":]") {
                items.push(ClassItem::Named(rest[..end].to_string()));
                i += 2 + rest[..end].chars().count() + 2;
                continue;
            }
        }
        let c = if c == '\\' {
            i += 1;
            *chars.get(i)?
        } else {
            c
        };
        if chars.get(i + 1) == Some(&'-') && chars.get(i + 2).is_some_and(|&e| e != ']') {
            let hi = chars[i + 2];
            items.push(ClassItem::Range(c, hi));
            i += 3;
        } else {
            items.push(ClassItem::Char(c));
            i += 1;
        }
    }
}

fn matches_tokens(tokens: &[Token], text: &[char]) -> bool {
    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        let step = match tokens.get(p) {
            Some(Token::Star) => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some(Token::Any) => true,
            Some(Token::Char(c)) => *c == text[t],
            Some(Token::Class { negated, items }) => {
                items.iter().any(|item| item.matches(text[t])) != *negated
            }
            None => false,
        };
        if step {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    tokens[p..].iter().all(|tok| matches!(tok, Token::Star))
}

/// Whether `text` matches `pattern` entirely.
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    let tokens = compile(pattern);
    let chars: Vec<char> = text.chars().collect();
    matches_tokens(&tokens, &chars)
}

/// Byte length of the prefix of `text` matched by `pattern`.
pub fn match_prefix(pattern: &str, text: &str, longest: bool) -> Option<usize> {
    let tokens = compile(pattern);
    let chars: Vec<char> = text.chars().collect();
    let try_len = |n: usize| matches_tokens(&tokens, &chars[..n]);
    let found = if longest {
        (0..=chars.len()).rev().find(|&n| try_len(n))
    } else {
        (0..=chars.len()).find(|&n| try_len(n))
    }?;
    Some(chars[..found].iter().map(|c| c.len_utf8()).sum())
}

/// Byte offset where the suffix of `text` matched by `pattern` starts.
pub fn match_suffix(pattern: &str, text: &str, longest: bool) -> Option<usize> {
    let tokens = compile(pattern);
    let chars: Vec<char> = text.chars().collect();
    let try_start = |n: usize| matches_tokens(&tokens, &chars[n..]);
    let found = if longest {
        (0..=chars.len()).find(|&n| try_start(n))
    } else {
        (0..=chars.len()).rev().find(|&n| try_start(n))
    }?;
    Some(chars[..found].iter().map(|c| c.len_utf8()).sum())
}

/// First (leftmost, longest) match of `pattern` in `text` at or after
/// `from`, as a byte range.
pub fn find_match(pattern: &str, text: &str, from: usize) -> Option<(usize, usize)> {
    let tokens = compile(pattern);
    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    for start in 0..=chars.len() {
        if offsets[start] < from {
            continue;
        }
        for end in (start..=chars.len()).rev() {
            if matches_tokens(&tokens, &chars[start..end]) {
                return Some((offsets[start], offsets[end]));
            }
        }
    }
    None
}

fn is_hidden_allowed(segment: &str, name: &str, opts: GlobOptions) -> bool {
    !name.starts_with('.') || opts.dotglob || segment.starts_with('.') || segment.starts_with("\\.")
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if prefix.ends_with('/') {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}/{name}")
    }
}

/// Expand a pathname pattern relative to `cwd`. Returns matches sorted;
/// an empty result means nothing matched.
pub fn expand_pathname(pattern: &str, cwd: &Path, opts: GlobOptions) -> Vec<String> {
    let (base, prefix, rest) = match pattern.strip_prefix('/') {
        Some(rest) => (Path::new("/").to_path_buf(), "/".to_string(), rest),
        None => (cwd.to_path_buf(), String::new(), pattern),
    };
    let segments: Vec<&str> = rest.split('/').collect();
    let mut out = Vec::new();
    expand_segments(&base, &prefix, &segments, opts, &mut out);
    out.sort();
    out.dedup();
    out
}

fn sorted_entries(dir: &Path) -> Vec<(String, bool)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<(String, bool)> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let is_dir = e.path().is_dir();
            Some((name, is_dir))
        })
        .collect();
    names.sort();
    names
}

fn expand_segments(
    dir: &Path,
    prefix: &str,
    segments: &[&str],
    opts: GlobOptions,
    out: &mut Vec<String>,
) {
    let Some((&segment, rest)) = segments.split_first() else {
        out.push(prefix.to_string());
        return;
    };

    if segment.is_empty() {
        if rest.is_empty() {
            // trailing slash: only directories match
            if dir.is_dir() && !prefix.is_empty() {
                out.push(format!("{}/", prefix.trim_end_matches('/')));
            }
        } else {
            expand_segments(dir, prefix, rest, opts, out);
        }
        return;
    }

    if segment == "**" && opts.globstar {
        if rest.is_empty() {
            collect_descendants(dir, prefix, opts, out);
        } else {
            expand_segments(dir, prefix, rest, opts, out);
            let mut dirs = Vec::new();
            collect_descendant_dirs(dir, prefix, opts, &mut dirs);
            for (path, display) in dirs {
                expand_segments(Path::new(&path), &display, rest, opts, out);
            }
        }
        return;
    }

    if !has_glob_chars(segment) {
        let name = unescape_pattern(segment);
        let path = dir.join(&name);
        let display = join(prefix, &name);
        if rest.is_empty() {
            if path.symlink_metadata().is_ok() {
                out.push(display);
            }
        } else if path.is_dir() {
            expand_segments(&path, &display, rest, opts, out);
        }
        return;
    }

    let segment = if segment == "**" { "*" } else { segment };
    let tokens = compile(segment);
    for (name, is_dir) in sorted_entries(dir) {
        if !is_hidden_allowed(segment, &name, opts) {
            continue;
        }
        let chars: Vec<char> = name.chars().collect();
        if !matches_tokens(&tokens, &chars) {
            continue;
        }
        let display = join(prefix, &name);
        if rest.is_empty() {
            out.push(display);
        } else if is_dir {
            expand_segments(&dir.join(&name), &display, rest, opts, out);
        }
    }
}

fn collect_descendants(dir: &Path, prefix: &str, opts: GlobOptions, out: &mut Vec<String>) {
    for (name, is_dir) in sorted_entries(dir) {
        if name.starts_with('.') && !opts.dotglob {
            continue;
        }
        let display = join(prefix, &name);
        out.push(display.clone());
        if is_dir {
            collect_descendants(&dir.join(&name), &display, opts, out);
        }
    }
}

fn collect_descendant_dirs(
    dir: &Path,
    prefix: &str,
    opts: GlobOptions,
    out: &mut Vec<(std::path::PathBuf, String)>,
) {
    for (name, is_dir) in sorted_entries(dir) {
        if !is_dir || (name.starts_with('.') && !opts.dotglob) {
            continue;
        }
        let path = dir.join(&name);
        let display = join(prefix, &name);
        out.push((path.clone(), display.clone()));
        collect_descendant_dirs(&path, &display, opts, out);
    }
}
