//! Lexer for shell scripts
//!
//! Tokenizes input into a stream of tokens with source position tracking.
//! Words keep their quoting verbatim; `word.rs` turns them into parts.
//! Here-document bodies are cut out of the input as soon as their operator
//! is seen, so the token stream never contains them.

use std::collections::HashMap;

use super::ast::RedirectKind;
use super::span::{Position, Span};
use super::tokens::Token;
use crate::error::{Error, Result};

/// A token with its source location span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer for shell scripts.
pub struct Lexer {
    chars: Vec<char>,
    index: usize,
    position: Position,
    /// Lines removed after the newline at a given index (here-doc bodies)
    spliced_lines: HashMap<usize, usize>,
}

impl Lexer {
    /// Create a new lexer for the given input.
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            index: 0,
            position: Position::new(),
            spliced_lines: HashMap::new(),
        }
    }

    /// Get the current position in the input.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Source text between two offsets.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.chars.len());
        let start = start.min(end);
        self.chars[start..end].iter().collect()
    }

    /// Get the next token with its source span.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken>> {
        self.skip_blanks_and_comments();
        let start = self.position;
        let Some(token) = self.next_token_inner()? else {
            return Ok(None);
        };
        Ok(Some(SpannedToken {
            token,
            span: Span::from_positions(start, self.position),
        }))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.index).copied()?;
        if ch == '\n' {
            if let Some(extra) = self.spliced_lines.get(&self.index) {
                self.position.line += extra;
            }
        }
        self.index += 1;
        self.position.advance(ch);
        Some(ch)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse_at(message, self.position.line, self.position.column)
    }

    fn skip_blanks_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                Some('#') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token_inner(&mut self) -> Result<Option<Token>> {
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let token = match ch {
            '\n' => {
                self.advance();
                Token::Newline
            }
            ';' => {
                self.advance();
                if self.peek() == Some(';') {
                    self.advance();
                    if self.peek() == Some('&') {
                        self.advance();
                        Token::DoubleSemiAmp
                    } else {
                        Token::DoubleSemicolon
                    }
                } else if self.peek() == Some('&') {
                    self.advance();
                    Token::SemiAmp
                } else {
                    Token::Semicolon
                }
            }
            '|' => {
                self.advance();
                if self.peek() == Some('|') {
                    self.advance();
                    Token::Or
                } else {
                    Token::Pipe
                }
            }
            '&' => {
                self.advance();
                match self.peek() {
                    Some('&') => {
                        self.advance();
                        Token::And
                    }
                    Some('>') => {
                        self.advance();
                        if self.peek() == Some('>') {
                            self.advance();
                            Token::Redirect {
                                fd: None,
                                kind: RedirectKind::AppendBoth,
                            }
                        } else {
                            Token::Redirect {
                                fd: None,
                                kind: RedirectKind::OutputBoth,
                            }
                        }
                    }
                    _ => Token::Background,
                }
            }
            '(' => {
                if self.peek_at(1) == Some('(') {
                    self.read_arithmetic_command()?
                } else {
                    self.advance();
                    Token::LeftParen
                }
            }
            ')' => {
                self.advance();
                Token::RightParen
            }
            '<' | '>' if self.peek_at(1) == Some('(') => self.read_word()?,
            '<' | '>' => self.read_redirect(None)?,
            _ => {
                let token = self.read_word()?;
                if let Token::Word(ref w) = token {
                    if !w.is_empty()
                        && w.len() <= 2
                        && w.chars().all(|c| c.is_ascii_digit())
                        && matches!(self.peek(), Some('<' | '>'))
                        && self.peek_at(1) != Some('(')
                    {
                        let fd = w.parse().ok();
                        return self.read_redirect(fd).map(Some);
                    }
                }
                token
            }
        };
        Ok(Some(token))
    }

    fn read_redirect(&mut self, fd: Option<i32>) -> Result<Token> {
        let first = self.advance();
        let kind = if first == Some('<') {
            match self.peek() {
                Some('<') => {
                    self.advance();
                    match self.peek() {
                        Some('<') => {
                            self.advance();
                            RedirectKind::HereString
                        }
                        Some('-') => {
                            self.advance();
                            return self.read_heredoc(fd, true);
                        }
                        _ => return self.read_heredoc(fd, false),
                    }
                }
                Some('&') => {
                    self.advance();
                    RedirectKind::DupInput
                }
                Some('>') => {
                    self.advance();
                    RedirectKind::ReadWrite
                }
                _ => RedirectKind::Input,
            }
        } else {
            match self.peek() {
                Some('>') => {
                    self.advance();
                    RedirectKind::Append
                }
                Some('&') => {
                    self.advance();
                    RedirectKind::DupOutput
                }
                Some('|') => {
                    self.advance();
                    RedirectKind::Clobber
                }
                _ => RedirectKind::Output,
            }
        };
        Ok(Token::Redirect { fd, kind })
    }

    /// `<<DELIM`: read the delimiter word, then splice the body out of the
    /// lines that follow the current one.
    fn read_heredoc(&mut self, fd: Option<i32>, strip_tabs: bool) -> Result<Token> {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.advance();
        }
        let Token::Word(raw) = self.read_word()? else {
            return Err(self.error("expected here-document delimiter"));
        };
        if raw.is_empty() {
            return Err(self.error("expected here-document delimiter"));
        }
        let quoted = raw.contains(['\'', '"', '\\']);
        let delimiter: String = raw.chars().filter(|c| !matches!(c, '\'' | '"' | '\\')).collect();
        let body = self.splice_heredoc_body(&delimiter, strip_tabs);
        Ok(Token::HereDoc {
            fd,
            strip_tabs,
            delimiter,
            quoted,
            body,
        })
    }

    fn splice_heredoc_body(&mut self, delimiter: &str, strip_tabs: bool) -> String {
        let newline = self.find_line_end(self.index);
        if newline >= self.chars.len() {
            return String::new();
        }
        let body_start = newline + 1;
        let mut cursor = body_start;
        let mut body = String::new();
        let mut removed_lines = 0;
        let body_end = loop {
            if cursor >= self.chars.len() {
                break self.chars.len();
            }
            let line_end = self.chars[cursor..]
                .iter()
                .position(|&c| c == '\n')
                .map_or(self.chars.len(), |p| cursor + p);
            let line: String = self.chars[cursor..line_end].iter().collect();
            removed_lines += 1;
            let candidate = if strip_tabs {
                line.trim_start_matches('\t')
            } else {
                line.as_str()
            };
            if candidate == delimiter {
                break (line_end + 1).min(self.chars.len());
            }
            body.push_str(&line);
            body.push('\n');
            cursor = line_end + 1;
        };
        self.chars.drain(body_start..body_end);
        *self.spliced_lines.entry(newline).or_insert(0) += removed_lines;
        body
    }

    /// Index of the newline ending the logical line that contains `from`,
    /// skipping newlines inside quotes.
    fn find_line_end(&self, from: usize) -> usize {
        let mut i = from;
        let mut single = false;
        let mut double = false;
        while i < self.chars.len() {
            let ch = self.chars[i];
            if single {
                if ch == '\'' {
                    single = false;
                }
            } else if ch == '\\' {
                i += 1;
            } else if double {
                if ch == '"' {
                    double = false;
                }
            } else if ch == '\'' {
                single = true;
            } else if ch == '"' {
                double = true;
            } else if ch == '\n' {
                return i;
            }
            i += 1;
        }
        self.chars.len()
    }

    /// `(( expr ))` at token start.
    fn read_arithmetic_command(&mut self) -> Result<Token> {
        self.advance();
        self.advance();
        let mut depth = 0usize;
        let mut expr = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated arithmetic command")),
                Some('(') => {
                    depth += 1;
                    expr.push('(');
                }
                Some(')') => {
                    if depth == 0 && self.peek() == Some(')') {
                        self.advance();
                        break;
                    }
                    depth = depth.saturating_sub(1);
                    expr.push(')');
                }
                Some(c) => expr.push(c),
            }
        }
        Ok(Token::Arithmetic(expr.trim().to_string()))
    }

    fn is_word_end(ch: char) -> bool {
        matches!(
            ch,
            ' ' | '\t' | '\r' | '\n' | '|' | '&' | ';' | '<' | '>' | '(' | ')'
        )
    }

    fn read_word(&mut self) -> Result<Token> {
        let mut word = String::new();

        // process substitution starts a word
        if matches!(self.peek(), Some('<' | '>')) && self.peek_at(1) == Some('(') {
            if let Some(c) = self.advance() {
                word.push(c);
            }
            self.read_balanced('(', ')', &mut word)?;
        }

        while let Some(ch) = self.peek() {
            match ch {
                '\\' => {
                    self.advance();
                    match self.advance() {
                        Some('\n') => {}
                        Some(next) => {
                            word.push('\\');
                            word.push(next);
                        }
                        None => word.push('\\'),
                    }
                }
                '\'' => self.read_single_quoted(&mut word)?,
                '"' => self.read_double_quoted(&mut word)?,
                '`' => self.read_backticks(&mut word)?,
                '$' => self.read_dollar(&mut word)?,
                '(' if is_assignment_prefix(&word) => {
                    self.read_balanced('(', ')', &mut word)?;
                }
                c if Self::is_word_end(c) => break,
                c => {
                    self.advance();
                    word.push(c);
                }
            }
        }
        Ok(Token::Word(word))
    }

    fn read_single_quoted(&mut self, word: &mut String) -> Result<()> {
        self.advance();
        word.push('\'');
        loop {
            match self.advance() {
                Some('\'') => break,
                Some(c) => word.push(c),
                None => return Err(self.error("unterminated single quote")),
            }
        }
        word.push('\'');
        Ok(())
    }

    fn read_double_quoted(&mut self, word: &mut String) -> Result<()> {
        self.advance();
        word.push('"');
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('\n') => {}
                        Some(next) => {
                            word.push('\\');
                            word.push(next);
                        }
                        None => return Err(self.error("unterminated double quote")),
                    }
                }
                Some('$') => self.read_dollar(word)?,
                Some('`') => self.read_backticks(word)?,
                Some(c) => {
                    self.advance();
                    word.push(c);
                }
                None => return Err(self.error("unterminated double quote")),
            }
        }
        word.push('"');
        Ok(())
    }

    fn read_backticks(&mut self, word: &mut String) -> Result<()> {
        self.advance();
        word.push('`');
        loop {
            match self.advance() {
                Some('`') => break,
                Some('\\') => {
                    word.push('\\');
                    if let Some(next) = self.advance() {
                        word.push(next);
                    }
                }
                Some(c) => word.push(c),
                None => return Err(self.error("unterminated backquote")),
            }
        }
        word.push('`');
        Ok(())
    }

    fn read_dollar(&mut self, word: &mut String) -> Result<()> {
        self.advance();
        word.push('$');
        match self.peek() {
            Some('(') => self.read_balanced('(', ')', word),
            Some('{') => self.read_balanced('{', '}', word),
            Some('\'') => self.read_single_quoted(word),
            _ => Ok(()),
        }
    }

    /// Copy a bracketed region, including the delimiters, tracking nesting
    /// and skipping over quoted text.
    fn read_balanced(&mut self, open: char, close: char, word: &mut String) -> Result<()> {
        let mut depth = 0usize;
        loop {
            let Some(ch) = self.peek() else {
                return Err(self.error(format!("unexpected end of input: missing `{close}'")));
            };
            match ch {
                '\\' => {
                    self.advance();
                    word.push('\\');
                    if let Some(next) = self.advance() {
                        word.push(next);
                    }
                }
                '\'' if open == '(' || depth > 0 => self.read_single_quoted(word)?,
                '"' => self.read_double_quoted(word)?,
                '`' => self.read_backticks(word)?,
                '$' if depth > 0 => self.read_dollar(word)?,
                c if c == open => {
                    self.advance();
                    word.push(c);
                    depth += 1;
                }
                c if c == close => {
                    self.advance();
                    word.push(c);
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                c => {
                    self.advance();
                    word.push(c);
                }
            }
        }
    }
}

/// `name=`, `name+=` or `name[sub]=` so far: a following `(` opens an array
/// literal.
fn is_assignment_prefix(word: &str) -> bool {
    let Some(head) = word.strip_suffix('=') else {
        return false;
    };
    let head = head.strip_suffix('+').unwrap_or(head);
    let name = match head.find('[') {
        Some(idx) if head.ends_with(']') => &head[..idx],
        Some(_) => return false,
        None => head,
    };
    super::is_valid_name(name)
}
