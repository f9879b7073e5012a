//! Word parsing: raw lexer words into quoted/expansion parts
//!
//! The lexer keeps quoting verbatim so that this pass can record exactly
//! which characters were quoted. Expansion needs that to decide what gets
//! split and globbed.

use super::ast::{ParamExpansion, ParamOp, ReplaceMode, Subscript, Word, WordPart};
use super::{Parser, is_valid_name};
use crate::error::{Error, Result};

/// Parse a raw word as it appears in a command.
pub fn parse_word(raw: &str) -> Result<Word> {
    let mut parser = WordParser::new(raw);
    let parts = parser.parse_unquoted()?;
    Ok(Word { parts })
}

/// Parse here-document text or other "double-quote-like" text in which
/// `$`, backquotes and backslash are special but quotes are ordinary.
pub fn parse_expandable_text(raw: &str) -> Result<Word> {
    let mut parser = WordParser::new(raw);
    let parts = parser.parse_double_quoted(None)?;
    Ok(Word {
        parts: vec![WordPart::DoubleQuoted(parts)],
    })
}

struct WordParser {
    chars: Vec<char>,
    pos: usize,
}

impl WordParser {
    fn new(raw: &str) -> Self {
        Self {
            chars: raw.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn parse_unquoted(&mut self) -> Result<Vec<WordPart>> {
        let mut parts = Vec::new();
        let mut literal = String::new();

        if self.peek() == Some('~') {
            if let Some(tilde) = self.read_tilde() {
                parts.push(tilde);
            }
        }

        if matches!(self.peek(), Some('<' | '>')) && self.peek_at(1) == Some('(') {
            let input = self.bump() == Some('<');
            self.bump();
            let body = self.read_balanced('(', ')')?;
            parts.push(WordPart::ProcessSubstitution {
                program: Parser::new(&body).parse()?,
                input,
            });
        }

        while let Some(ch) = self.peek() {
            match ch {
                '\\' => {
                    self.bump();
                    flush(&mut literal, &mut parts);
                    match self.bump() {
                        Some(c) => parts.push(WordPart::Escaped(c)),
                        None => literal.push('\\'),
                    }
                }
                '\'' => {
                    self.bump();
                    flush(&mut literal, &mut parts);
                    let text = self.read_single_quoted()?;
                    parts.push(WordPart::SingleQuoted(text));
                }
                '"' => {
                    self.bump();
                    flush(&mut literal, &mut parts);
                    let inner = self.parse_double_quoted(Some('"'))?;
                    parts.push(WordPart::DoubleQuoted(inner));
                }
                '$' if self.peek_at(1) == Some('\'') => {
                    self.bump();
                    self.bump();
                    flush(&mut literal, &mut parts);
                    let text = self.read_ansi_c()?;
                    parts.push(WordPart::SingleQuoted(text));
                }
                '$' => {
                    match self.parse_dollar()? {
                        Some(part) => {
                            flush(&mut literal, &mut parts);
                            parts.push(part);
                        }
                        None => literal.push('$'),
                    }
                }
                '`' => {
                    flush(&mut literal, &mut parts);
                    parts.push(self.parse_backticks()?);
                }
                c => {
                    self.bump();
                    literal.push(c);
                }
            }
        }
        flush(&mut literal, &mut parts);
        Ok(parts)
    }

    /// Body of a double-quoted string. `terminator` is `None` for
    /// here-documents, which run to the end of the text.
    fn parse_double_quoted(&mut self, terminator: Option<char>) -> Result<Vec<WordPart>> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        loop {
            let Some(ch) = self.peek() else {
                if terminator.is_some() {
                    return Err(Error::Parse("unterminated double quote".to_string()));
                }
                break;
            };
            if Some(ch) == terminator {
                self.bump();
                break;
            }
            match ch {
                '\\' => {
                    self.bump();
                    match self.bump() {
                        Some(c @ ('$' | '`' | '\\')) => literal.push(c),
                        Some('"') if terminator.is_some() => literal.push('"'),
                        Some('\n') => {}
                        Some(c) => {
                            literal.push('\\');
                            literal.push(c);
                        }
                        None => literal.push('\\'),
                    }
                }
                '$' => {
                    match self.parse_dollar()? {
                        Some(part) => {
                            flush(&mut literal, &mut parts);
                            parts.push(part);
                        }
                        None => literal.push('$'),
                    }
                }
                '`' => {
                    flush(&mut literal, &mut parts);
                    parts.push(self.parse_backticks()?);
                }
                c => {
                    self.bump();
                    literal.push(c);
                }
            }
        }
        flush(&mut literal, &mut parts);
        Ok(parts)
    }

    fn read_tilde(&mut self) -> Option<WordPart> {
        let end = self.chars[self.pos + 1..]
            .iter()
            .position(|&c| c == '/' || c == ':')
            .map_or(self.chars.len(), |p| self.pos + 1 + p);
        let user: String = self.chars[self.pos + 1..end].iter().collect();
        if !user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return None;
        }
        self.pos = end;
        Some(WordPart::Tilde(user))
    }

    fn read_single_quoted(&mut self) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('\'') => return Ok(text),
                Some(c) => text.push(c),
                None => return Err(Error::Parse("unterminated single quote".to_string())),
            }
        }
    }

    /// `$'...'` with C-style escapes.
    fn read_ansi_c(&mut self) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('\'') => return Ok(text),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('a') => text.push('\x07'),
                    Some('b') => text.push('\x08'),
                    Some('e' | 'E') => text.push('\x1b'),
                    Some('0') => text.push('\0'),
                    Some(c) => text.push(c),
                    None => text.push('\\'),
                },
                Some(c) => text.push(c),
                None => return Err(Error::Parse("unterminated $' quote".to_string())),
            }
        }
    }

    /// Parse after a `$`. Returns `None` when the dollar is literal.
    fn parse_dollar(&mut self) -> Result<Option<WordPart>> {
        self.bump();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        match ch {
            '(' if self.peek_at(1) == Some('(') => {
                self.bump();
                self.bump();
                let expr = self.read_arithmetic()?;
                Ok(Some(WordPart::Arithmetic(expr)))
            }
            '(' => {
                self.bump();
                let body = self.read_balanced('(', ')')?;
                let program = Parser::new(&body).parse()?;
                Ok(Some(WordPart::CommandSubstitution(program)))
            }
            '{' => {
                self.bump();
                let body = self.read_balanced('{', '}')?;
                Ok(Some(WordPart::Parameter(Box::new(parse_parameter(&body)?))))
            }
            c if c.is_ascii_digit() || matches!(c, '@' | '*' | '#' | '?' | '$' | '!' | '-') => {
                self.bump();
                Ok(Some(WordPart::Variable(c.to_string())))
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                Ok(Some(WordPart::Variable(name)))
            }
            _ => Ok(None),
        }
    }

    fn parse_backticks(&mut self) -> Result<WordPart> {
        self.bump();
        let mut body = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => match self.bump() {
                    Some(c @ ('`' | '\\' | '$')) => body.push(c),
                    Some(c) => {
                        body.push('\\');
                        body.push(c);
                    }
                    None => body.push('\\'),
                },
                Some(c) => body.push(c),
                None => return Err(Error::Parse("unterminated backquote".to_string())),
            }
        }
        Ok(WordPart::CommandSubstitution(Parser::new(&body).parse()?))
    }

    /// Text up to the `))` closing a `$((`.
    fn read_arithmetic(&mut self) -> Result<String> {
        let mut depth = 0usize;
        let mut expr = String::new();
        loop {
            match self.bump() {
                None => return Err(Error::Parse("unterminated arithmetic expansion".to_string())),
                Some('(') => {
                    depth += 1;
                    expr.push('(');
                }
                Some(')') => {
                    if depth == 0 && self.peek() == Some(')') {
                        self.bump();
                        return Ok(expr);
                    }
                    depth = depth.saturating_sub(1);
                    expr.push(')');
                }
                Some(c) => expr.push(c),
            }
        }
    }

    /// Text up to the delimiter matching an already-consumed `open`.
    fn read_balanced(&mut self, open: char, close: char) -> Result<String> {
        let mut depth = 0usize;
        let mut text = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(Error::Parse(format!("missing `{close}'")));
            };
            match ch {
                '\\' => {
                    text.push('\\');
                    if let Some(next) = self.bump() {
                        text.push(next);
                    }
                }
                '\'' => {
                    text.push('\'');
                    text.push_str(&self.read_single_quoted()?);
                    text.push('\'');
                }
                '"' => {
                    text.push('"');
                    loop {
                        match self.bump() {
                            Some('"') => break,
                            Some('\\') => {
                                text.push('\\');
                                if let Some(next) = self.bump() {
                                    text.push(next);
                                }
                            }
                            Some(c) => text.push(c),
                            None => return Err(Error::Parse("unterminated double quote".to_string())),
                        }
                    }
                    text.push('"');
                }
                c if c == open => {
                    depth += 1;
                    text.push(c);
                }
                c if c == close => {
                    if depth == 0 {
                        return Ok(text);
                    }
                    depth -= 1;
                    text.push(c);
                }
                c => text.push(c),
            }
        }
    }
}

fn flush(literal: &mut String, parts: &mut Vec<WordPart>) {
    if !literal.is_empty() {
        parts.push(WordPart::Literal(std::mem::take(literal)));
    }
}

/// Parse the inside of `${...}`.
pub fn parse_parameter(body: &str) -> Result<ParamExpansion> {
    let bad = || Error::Parse(format!("${{{body}}}: bad substitution"));

    if body.is_empty() {
        return Err(bad());
    }

    // ${#name} / ${#arr[@]}
    if let Some(rest) = body.strip_prefix('#') {
        if !rest.is_empty() {
            if let Some((name, index, tail)) = split_name(rest) {
                if tail.is_empty() {
                    return Ok(ParamExpansion {
                        name,
                        index,
                        op: ParamOp::Length,
                    });
                }
            }
        }
    }

    // ${!name} / ${!arr[@]}
    if let Some(rest) = body.strip_prefix('!') {
        if !rest.is_empty() {
            let (name, index, tail) = split_name(rest).ok_or_else(bad)?;
            if !tail.is_empty() {
                return Err(bad());
            }
            let op = match index {
                Some(Subscript::All | Subscript::Star) => ParamOp::Keys,
                _ => ParamOp::Indirect,
            };
            return Ok(ParamExpansion { name, index, op });
        }
    }

    let (name, index, rest) = split_name(body).ok_or_else(bad)?;
    let op = parse_operator(rest).ok_or_else(bad)??;
    Ok(ParamExpansion { name, index, op })
}

/// Split `name[sub]rest` into its pieces. Special parameters are one char.
fn split_name(text: &str) -> Option<(String, Option<Subscript>, &str)> {
    let first = text.chars().next()?;
    let name_len = if first.is_ascii_alphabetic() || first == '_' {
        text.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len())
    } else if first.is_ascii_digit() {
        text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len())
    } else if matches!(first, '@' | '*' | '#' | '?' | '$' | '!' | '-') {
        1
    } else {
        return None;
    };
    let name = text[..name_len].to_string();
    let rest = &text[name_len..];

    if !is_valid_name(&name) || !rest.starts_with('[') {
        return Some((name, None, rest));
    }

    let mut depth = 0usize;
    for (i, c) in rest.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    let sub = &rest[1..i];
                    let subscript = match sub {
                        "@" => Subscript::All,
                        "*" => Subscript::Star,
                        _ => Subscript::Index(sub.to_string()),
                    };
                    return Some((name, Some(subscript), &rest[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

macro_rules! ok_or_return {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        }
    };
}

fn parse_operator(rest: &str) -> Option<Result<ParamOp>> {
    let op = if rest.is_empty() {
        ParamOp::None
    } else if let Some(word) = rest.strip_prefix(":-") {
        ParamOp::Default {
            colon: true,
            word: ok_or_return!(parse_word(word)),
        }
    } else if let Some(word) = rest.strip_prefix(":=") {
        ParamOp::Assign {
            colon: true,
            word: ok_or_return!(parse_word(word)),
        }
    } else if let Some(word) = rest.strip_prefix(":?") {
        ParamOp::Error {
            colon: true,
            word: ok_or_return!(optional_word(word)),
        }
    } else if let Some(word) = rest.strip_prefix(":+") {
        ParamOp::Alternative {
            colon: true,
            word: ok_or_return!(parse_word(word)),
        }
    } else if let Some(spec) = rest.strip_prefix(':') {
        let (offset, length) = match split_top_level_colon(spec) {
            Some((offset, length)) => (offset.to_string(), Some(length.to_string())),
            None => (spec.to_string(), None),
        };
        ParamOp::Substring { offset, length }
    } else if let Some(word) = rest.strip_prefix('-') {
        ParamOp::Default {
            colon: false,
            word: ok_or_return!(parse_word(word)),
        }
    } else if let Some(word) = rest.strip_prefix('=') {
        ParamOp::Assign {
            colon: false,
            word: ok_or_return!(parse_word(word)),
        }
    } else if let Some(word) = rest.strip_prefix('?') {
        ParamOp::Error {
            colon: false,
            word: ok_or_return!(optional_word(word)),
        }
    } else if let Some(word) = rest.strip_prefix('+') {
        ParamOp::Alternative {
            colon: false,
            word: ok_or_return!(parse_word(word)),
        }
    } else if let Some(pattern) = rest.strip_prefix("##") {
        ParamOp::RemovePrefix {
            longest: true,
            pattern: ok_or_return!(parse_word(pattern)),
        }
    } else if let Some(pattern) = rest.strip_prefix('#') {
        ParamOp::RemovePrefix {
            longest: false,
            pattern: ok_or_return!(parse_word(pattern)),
        }
    } else if let Some(pattern) = rest.strip_prefix("%%") {
        ParamOp::RemoveSuffix {
            longest: true,
            pattern: ok_or_return!(parse_word(pattern)),
        }
    } else if let Some(pattern) = rest.strip_prefix('%') {
        ParamOp::RemoveSuffix {
            longest: false,
            pattern: ok_or_return!(parse_word(pattern)),
        }
    } else if let Some(spec) = rest.strip_prefix('/') {
        let (mode, spec) = if let Some(s) = spec.strip_prefix('/') {
            (ReplaceMode::All, s)
        } else if let Some(s) = spec.strip_prefix('#') {
            (ReplaceMode::Prefix, s)
        } else if let Some(s) = spec.strip_prefix('%') {
            (ReplaceMode::Suffix, s)
        } else {
            (ReplaceMode::First, spec)
        };
        let (pattern, replacement) = split_unescaped_slash(spec);
        ParamOp::Replace {
            pattern: ok_or_return!(parse_word(pattern)),
            replacement: ok_or_return!(parse_word(replacement)),
            mode,
        }
    } else {
        match rest {
            "^^" => ParamOp::Case {
                upper: true,
                all: true,
            },
            "^" => ParamOp::Case {
                upper: true,
                all: false,
            },
            ",," => ParamOp::Case {
                upper: false,
                all: true,
            },
            "," => ParamOp::Case {
                upper: false,
                all: false,
            },
            _ => return None,
        }
    };
    Some(Ok(op))
}

fn optional_word(text: &str) -> Result<Option<Word>> {
    if text.is_empty() {
        Ok(None)
    } else {
        parse_word(text).map(Some)
    }
}

/// `offset:length` in a substring expansion; ignores colons inside a
/// `?:` conditional or parentheses.
fn split_top_level_colon(spec: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    let mut pending_ternary = 0i32;
    for (i, c) in spec.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '?' if depth == 0 => pending_ternary += 1,
            ':' if depth == 0 => {
                if pending_ternary > 0 {
                    pending_ternary -= 1;
                } else {
                    return Some((&spec[..i], &spec[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

fn split_unescaped_slash(spec: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut quote: Option<char> = None;
    for (i, c) in spec.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (c, quote) {
            ('\\', _) => escaped = true,
            ('\'' | '"', None) => quote = Some(c),
            (q, Some(open)) if q == open => quote = None,
            ('/', None) => return (&spec[..i], &spec[i + 1..]),
            _ => {}
        }
    }
    (spec, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lit(s: &str) -> WordPart {
        WordPart::Literal(s.to_string())
    }

    #[test]
    fn test_plain_word() {
        assert_eq!(parse_word("hello").unwrap().parts, vec![lit("hello")]);
    }

    #[test]
    fn test_mixed_quoting() {
        let word = parse_word(r#"a'b c'"$x d"\*"#).unwrap();
        assert_eq!(
            word.parts,
            vec![
                lit("a"),
                WordPart::SingleQuoted("b c".to_string()),
                WordPart::DoubleQuoted(vec![WordPart::Variable("x".to_string()), lit(" d")]),
                WordPart::Escaped('*'),
            ]
        );
    }

    #[test]
    fn test_variables_and_specials() {
        let word = parse_word("$1$@$foo_bar-x$").unwrap();
        assert_eq!(
            word.parts,
            vec![
                WordPart::Variable("1".to_string()),
                WordPart::Variable("@".to_string()),
                WordPart::Variable("foo_bar".to_string()),
                lit("-x$"),
            ]
        );
    }

    #[test]
    fn test_tilde() {
        let word = parse_word("~/bin").unwrap();
        assert_eq!(word.parts, vec![WordPart::Tilde(String::new()), lit("/bin")]);
        let word = parse_word("a~").unwrap();
        assert_eq!(word.parts, vec![lit("a~")]);
    }

    #[test]
    fn test_arithmetic_and_substitution() {
        let word = parse_word("$((1 + (2 * 3)))").unwrap();
        assert_eq!(
            word.parts,
            vec![WordPart::Arithmetic("1 + (2 * 3)".to_string())]
        );
        let word = parse_word("$(echo hi)").unwrap();
        assert!(matches!(word.parts[0], WordPart::CommandSubstitution(ref p) if p.statements.len() == 1));
        let word = parse_word("`echo hi`").unwrap();
        assert!(matches!(word.parts[0], WordPart::CommandSubstitution(_)));
    }

    #[test]
    fn test_ansi_c_quote() {
        let word = parse_word(r"$'a\tb\n'").unwrap();
        assert_eq!(word.parts, vec![WordPart::SingleQuoted("a\tb\n".to_string())]);
    }

    #[test]
    fn test_parameter_operators() {
        let p = parse_parameter("x:-default").unwrap();
        assert_eq!(p.name, "x");
        assert_eq!(
            p.op,
            ParamOp::Default {
                colon: true,
                word: Word::literal("default")
            }
        );

        let p = parse_parameter("#arr[@]").unwrap();
        assert_eq!(p.op, ParamOp::Length);
        assert_eq!(p.index, Some(Subscript::All));

        let p = parse_parameter("path##*/").unwrap();
        assert!(matches!(p.op, ParamOp::RemovePrefix { longest: true, .. }));

        let p = parse_parameter("s:1:2").unwrap();
        assert_eq!(
            p.op,
            ParamOp::Substring {
                offset: "1".to_string(),
                length: Some("2".to_string())
            }
        );

        let p = parse_parameter("s//a/b").unwrap();
        assert!(matches!(
            p.op,
            ParamOp::Replace {
                mode: ReplaceMode::All,
                ..
            }
        ));

        let p = parse_parameter("!ref").unwrap();
        assert_eq!(p.op, ParamOp::Indirect);

        let p = parse_parameter("!map[@]").unwrap();
        assert_eq!(p.op, ParamOp::Keys);

        let p = parse_parameter("#").unwrap();
        assert_eq!((p.name.as_str(), &p.op), ("#", &ParamOp::None));

        let p = parse_parameter("name^^").unwrap();
        assert_eq!(
            p.op,
            ParamOp::Case {
                upper: true,
                all: true
            }
        );
    }

    #[test]
    fn test_bad_substitution() {
        assert!(parse_parameter("x&y").is_err());
        assert!(parse_parameter("").is_err());
    }

    #[test]
    fn test_expandable_text_keeps_quotes() {
        let word = parse_expandable_text("it's \"$x\"\n").unwrap();
        assert_eq!(
            word.parts,
            vec![WordPart::DoubleQuoted(vec![
                lit("it's \""),
                WordPart::Variable("x".to_string()),
                lit("\"\n"),
            ])]
        );
    }
}
