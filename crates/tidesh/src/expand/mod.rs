//! Word expansion
//!
//! Expansion runs on the [`Interpreter`] because command substitution
//! re-enters the executor. A word goes through, in order: brace expansion,
//! tilde/parameter/arithmetic/command substitution, IFS splitting of the
//! unquoted results, then pathname expansion.
//!
//! Expansion first produces [`Piece`]s that remember whether each bit of text
//! was quoted. Quoting decides what gets split and which characters stay
//! live as glob metacharacters, so it has to survive until fields are built.

pub mod arithmetic;
pub mod brace;
pub mod glob;
pub mod split;

use futures_util::future::BoxFuture;

use crate::error::{Error, Result};
use crate::interpreter::{ControlFlow, Interpreter, IoContext, PendingSubstitution, Sink, VarKind};
use crate::options::ShellOption;
use crate::parser::{
    ParamExpansion, ParamOp, Program, ReplaceMode, Subscript, Word, WordPart, parse_expandable_text,
    parse_parameter,
};
use glob::{GlobOptions, escape_pattern, expand_pathname, find_match, has_glob_chars, match_prefix, match_suffix};
use split::{DEFAULT_IFS, split_fields};

/// Expanded text before field building.
#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text {
        text: String,
        quoted: bool,
        /// Unquoted expansion result: subject to IFS splitting
        splittable: bool,
    },
    /// Hard field boundary between elements of `$@` / `${a[@]}`
    Break,
}

impl Piece {
    fn literal(text: impl Into<String>, quoted: bool) -> Self {
        Piece::Text {
            text: text.into(),
            quoted,
            splittable: false,
        }
    }

    fn expanded(text: impl Into<String>, quoted: bool) -> Self {
        Piece::Text {
            text: text.into(),
            quoted,
            splittable: !quoted,
        }
    }
}

/// A parameter's value before an operator is applied.
#[derive(Debug, Clone)]
enum Value {
    /// `None` when unset
    Scalar(Option<String>),
    /// `$@`/`$*`/`${a[@]}`/`${a[*]}`. `joined` for the `*` forms.
    List { items: Vec<String>, joined: bool },
}

impl Value {
    fn is_unset(&self) -> bool {
        matches!(self, Value::Scalar(None))
    }

    fn is_null(&self) -> bool {
        match self {
            Value::Scalar(value) => value.as_deref().is_none_or(str::is_empty),
            Value::List { items, .. } => items.is_empty() || items.iter().all(String::is_empty),
        }
    }

    /// Apply a text transformation to the value or to every element.
    fn map(self, mut f: impl FnMut(String) -> String) -> Value {
        match self {
            Value::Scalar(value) => Value::Scalar(value.map(f)),
            Value::List { items, joined } => Value::List {
                items: items.into_iter().map(&mut f).collect(),
                joined,
            },
        }
    }
}

#[derive(Debug, Default)]
struct Field {
    text: String,
    /// The same text with quoted characters escaped
    pattern: String,
    has_glob: bool,
}

/// Assembles pieces into fields, splitting unquoted expansion results.
struct FieldBuilder<'a> {
    ifs: &'a str,
    fields: Vec<Field>,
    current: Option<Field>,
}

impl<'a> FieldBuilder<'a> {
    fn new(ifs: &'a str) -> Self {
        Self {
            ifs,
            fields: Vec::new(),
            current: None,
        }
    }

    fn push_text(&mut self, text: &str, quoted: bool) {
        let field = self.current.get_or_insert_with(Field::default);
        field.text.push_str(text);
        if quoted {
            field.pattern.push_str(&escape_pattern(text));
        } else {
            field.pattern.push_str(text);
            field.has_glob |= has_glob_chars(text);
        }
    }

    fn finish_field(&mut self) {
        if let Some(field) = self.current.take() {
            self.fields.push(field);
        }
    }

    fn push_split(&mut self, text: &str) {
        let split = split_fields(text, self.ifs);
        let mut fields = split.fields.into_iter().peekable();
        if split.leading_boundary {
            if fields.peek().is_some_and(String::is_empty) {
                // a leading non-whitespace separator ends the field in
                // progress, or delimits an empty one
                fields.next();
                if self.current.is_none() {
                    self.push_text("", false);
                }
            }
            self.finish_field();
        }
        for (i, field) in fields.enumerate() {
            if i > 0 {
                self.finish_field();
            }
            self.push_text(&field, false);
        }
        if split.trailing_boundary {
            self.finish_field();
        }
    }

    fn push(&mut self, piece: Piece) {
        match piece {
            Piece::Text {
                text,
                splittable: true,
                ..
            } => self.push_split(&text),
            Piece::Text { text, quoted, .. } => self.push_text(&text, quoted),
            Piece::Break => self.finish_field(),
        }
    }

    fn finish(mut self) -> Vec<Field> {
        self.finish_field();
        self.fields
    }
}

/// Join pieces without splitting. Field breaks become spaces.
fn join_pieces(pieces: Vec<Piece>, as_pattern: bool) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Text { text, quoted, .. } if as_pattern && quoted => out.push_str(&escape_pattern(&text)),
            Piece::Text { text, .. } => out.push_str(&text),
            Piece::Break => out.push(' '),
        }
    }
    out
}

/// Whether a double-quoted body expands `$@`-style, producing zero or more
/// fields instead of exactly one.
fn expands_to_list(parts: &[WordPart]) -> bool {
    parts.iter().any(|part| match part {
        WordPart::Variable(name) => name == "@",
        WordPart::Parameter(param) => {
            (param.name == "@" && param.index.is_none()) || matches!(param.index, Some(Subscript::All))
        }
        _ => false,
    })
}

/// Apply brace expansion to the unquoted literal parts of a word.
fn brace_expand_word(word: &Word) -> Vec<Word> {
    let has_braces = word
        .parts
        .iter()
        .any(|part| matches!(part, WordPart::Literal(text) if text.contains('{')));
    if !has_braces {
        return vec![word.clone()];
    }

    let mut words: Vec<Vec<WordPart>> = vec![Vec::new()];
    for part in &word.parts {
        match part {
            WordPart::Literal(text) if text.contains('{') => {
                let alternatives = brace::brace_expand(text);
                words = words
                    .into_iter()
                    .flat_map(|prefix| {
                        alternatives.iter().map(move |alt| {
                            let mut parts = prefix.clone();
                            parts.push(WordPart::Literal(alt.clone()));
                            parts
                        })
                    })
                    .collect();
            }
            other => {
                for parts in &mut words {
                    parts.push(other.clone());
                }
            }
        }
    }
    words.into_iter().map(|parts| Word { parts }).collect()
}

fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// `${v:offset:length}` window over `len` items, following bash: negative
/// offsets count from the end, a negative length stops that far from the end.
fn substring_range(len: usize, offset: i64, length: Option<i64>, length_text: &str) -> Result<Option<(usize, usize)>> {
    let len = len as i64;
    let start = if offset < 0 { len.saturating_add(offset) } else { offset };
    if start < 0 || start > len {
        return Ok(None);
    }
    let end = match length {
        None => len,
        Some(n) if n < 0 => {
            let end = len.saturating_add(n);
            if end < start {
                return Err(Error::InvalidExpression(format!("{length_text}: substring expression < 0")));
            }
            end
        }
        Some(n) => start.saturating_add(n).min(len),
    };
    Ok(Some((start as usize, end as usize)))
}

fn replace_text(text: &str, pattern: &str, replacement: &str, mode: ReplaceMode) -> String {
    if pattern.is_empty() {
        return text.to_string();
    }
    match mode {
        ReplaceMode::First => match find_match(pattern, text, 0) {
            Some((start, end)) if end > start => format!("{}{replacement}{}", &text[..start], &text[end..]),
            _ => text.to_string(),
        },
        ReplaceMode::All => {
            let mut out = String::new();
            let mut pos = 0;
            while pos <= text.len() {
                match find_match(pattern, text, pos) {
                    Some((start, end)) if end > start => {
                        out.push_str(&text[pos..start]);
                        out.push_str(replacement);
                        pos = end;
                    }
                    _ => break,
                }
            }
            out.push_str(&text[pos.min(text.len())..]);
            out
        }
        ReplaceMode::Prefix => match match_prefix(pattern, text, true) {
            Some(n) => format!("{replacement}{}", &text[n..]),
            None => text.to_string(),
        },
        ReplaceMode::Suffix => match match_suffix(pattern, text, true) {
            Some(n) => format!("{}{replacement}", &text[..n]),
            None => text.to_string(),
        },
    }
}

fn change_case(text: String, upper: bool, all: bool) -> String {
    let convert = |s: &str| if upper { s.to_uppercase() } else { s.to_lowercase() };
    if all {
        return convert(&text);
    }
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => convert(&first.to_string()) + chars.as_str(),
        None => text,
    }
}

fn home_of(user: &str) -> Option<String> {
    nix::unistd::User::from_name(user)
        .ok()
        .flatten()
        .map(|u| u.dir.to_string_lossy().into_owned())
}

impl Interpreter {
    /// Expand words into command arguments: all expansions, splitting and
    /// pathname expansion.
    pub(crate) async fn expand_words(&mut self, words: &[Word], io: &IoContext) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for word in words {
            out.extend(self.expand_word_fields(word, io).await?);
        }
        Ok(out)
    }

    /// Expand one word into zero or more fields.
    pub(crate) async fn expand_word_fields(&mut self, word: &Word, io: &IoContext) -> Result<Vec<String>> {
        let ifs = self.env.get("IFS").unwrap_or_else(|| DEFAULT_IFS.to_string());
        let glob = !self.options.is_set(ShellOption::Noglob);
        let nullglob = self.options.is_set(ShellOption::Nullglob);
        let glob_opts = self.glob_options();

        let mut result = Vec::new();
        for word in brace_expand_word(word) {
            let mut pieces = Vec::new();
            self.expand_parts(&word.parts, false, io, &mut pieces).await?;
            let mut builder = FieldBuilder::new(&ifs);
            for piece in pieces {
                builder.push(piece);
            }
            for field in builder.finish() {
                if glob && field.has_glob {
                    let matches = expand_pathname(&field.pattern, &self.cwd, glob_opts);
                    if !matches.is_empty() {
                        result.extend(matches);
                        continue;
                    }
                    if nullglob {
                        continue;
                    }
                }
                result.push(field.text);
            }
        }
        tracing::trace!(fields = result.len(), "expanded word");
        Ok(result)
    }

    /// Expand a word to a single string without splitting or globbing, as
    /// for assignment values and redirect targets.
    pub(crate) async fn expand_word_string(&mut self, word: &Word, io: &IoContext) -> Result<String> {
        let mut pieces = Vec::new();
        self.expand_parts(&word.parts, false, io, &mut pieces).await?;
        Ok(join_pieces(pieces, false))
    }

    /// Expand a word into a glob pattern: quoted characters are escaped so
    /// they only match themselves.
    pub(crate) async fn expand_word_pattern(&mut self, word: &Word, io: &IoContext) -> Result<String> {
        let mut pieces = Vec::new();
        self.expand_parts(&word.parts, false, io, &mut pieces).await?;
        Ok(join_pieces(pieces, true))
    }

    /// Expand `$name`, `${...}`, `$(...)` and `$((...))` inside free text
    /// such as a here-document body. Quote characters stay as they are.
    ///
    /// Text without `$` or a backquote comes back unchanged, backslashes
    /// included.
    pub(crate) async fn expand_text(&mut self, text: &str, io: &IoContext) -> Result<String> {
        if !text.contains(['$', '`']) {
            return Ok(text.to_string());
        }
        let word = parse_expandable_text(text)?;
        self.expand_word_string(&word, io).await
    }

    /// Evaluate arithmetic text after expanding any `$` references in it.
    pub(crate) async fn expand_arithmetic(&mut self, text: &str, io: &IoContext) -> Result<i64> {
        let expanded = self.expand_text(text, io).await?;
        Ok(arithmetic::evaluate(&expanded, &mut self.env)?)
    }

    pub(crate) fn glob_options(&self) -> GlobOptions {
        GlobOptions {
            dotglob: self.options.is_set(ShellOption::Dotglob),
            globstar: self.options.is_set(ShellOption::Globstar),
        }
    }

    fn expand_parts<'a>(
        &'a mut self,
        parts: &'a [WordPart],
        quoted: bool,
        io: &'a IoContext,
        out: &'a mut Vec<Piece>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for part in parts {
                match part {
                    WordPart::Literal(text) => out.push(Piece::literal(text.as_str(), quoted)),
                    WordPart::SingleQuoted(text) => out.push(Piece::literal(text.as_str(), true)),
                    WordPart::Escaped(c) => out.push(Piece::literal(c.to_string(), true)),
                    WordPart::DoubleQuoted(inner) => {
                        if !expands_to_list(inner) {
                            // `""` is still one (empty) field
                            out.push(Piece::literal("", true));
                        }
                        self.expand_parts(inner, true, io, out).await?;
                    }
                    WordPart::Tilde(user) => {
                        let home = if quoted {
                            None
                        } else if user.is_empty() {
                            self.env.get("HOME")
                        } else {
                            home_of(user)
                        };
                        let text = home.unwrap_or_else(|| format!("~{user}"));
                        out.push(Piece::literal(text, true));
                    }
                    WordPart::Variable(name) => {
                        let value = self.lookup(name, None, io).await?;
                        if value.is_unset() && self.options.is_set(ShellOption::Nounset) {
                            return Err(Error::UnboundVariable(name.clone()));
                        }
                        self.emit_value(value, quoted, out);
                    }
                    WordPart::Parameter(param) => {
                        self.expand_parameter(param, quoted, io, out).await?;
                    }
                    WordPart::CommandSubstitution(program) => {
                        let text = self.command_substitution(program, io).await?;
                        out.push(Piece::expanded(text, quoted));
                    }
                    WordPart::Arithmetic(expr) => {
                        let value = self.expand_arithmetic(expr, io).await?;
                        out.push(Piece::expanded(value.to_string(), quoted));
                    }
                    WordPart::ProcessSubstitution { program, input } => {
                        let path = self.process_substitution(program, *input, io).await?;
                        out.push(Piece::literal(path, true));
                    }
                }
            }
            Ok(())
        })
    }

    fn emit_value(&self, value: Value, quoted: bool, out: &mut Vec<Piece>) {
        match value {
            Value::Scalar(Some(text)) => out.push(Piece::expanded(text, quoted)),
            Value::Scalar(None) => {}
            Value::List { items, joined: true } if quoted => {
                let ifs = self.env.get("IFS");
                let sep = match ifs.as_deref() {
                    None => " ".to_string(),
                    Some(ifs) => ifs.chars().next().map(String::from).unwrap_or_default(),
                };
                out.push(Piece::literal(items.join(&sep), true));
            }
            Value::List { items, .. } => {
                for (i, item) in items.into_iter().enumerate() {
                    if i > 0 {
                        out.push(Piece::Break);
                    }
                    out.push(Piece::expanded(item, quoted));
                }
            }
        }
    }

    /// Current value of a parameter, before any operator.
    async fn lookup(&mut self, name: &str, index: Option<&Subscript>, io: &IoContext) -> Result<Value> {
        let scalar = |v: String| Value::Scalar(Some(v));
        match name {
            "@" | "*" => {
                return Ok(Value::List {
                    items: self.env.positional().to_vec(),
                    joined: name == "*",
                });
            }
            "#" => return Ok(scalar(self.env.positional().len().to_string())),
            "?" => return Ok(scalar(self.last_status.to_string())),
            "$" => return Ok(scalar(self.shell_pid.to_string())),
            "!" => return Ok(Value::Scalar(self.jobs.last_pid().map(|p| p.to_string()))),
            "-" => return Ok(scalar(self.options.flags_string())),
            "0" => return Ok(scalar(self.env.script_name().to_string())),
            "RANDOM" if index.is_none() && !self.env.is_set("RANDOM") => {
                return Ok(scalar(self.env.next_random().to_string()));
            }
            _ => {}
        }
        if let Ok(n) = name.parse::<usize>() {
            let value = n.checked_sub(1).and_then(|i| self.env.positional().get(i).cloned());
            return Ok(Value::Scalar(value));
        }

        Ok(match index {
            None => Value::Scalar(self.env.get(name)),
            Some(Subscript::All) => Value::List {
                items: self.env.values(name),
                joined: false,
            },
            Some(Subscript::Star) => Value::List {
                items: self.env.values(name),
                joined: true,
            },
            Some(Subscript::Index(expr)) => {
                if self.env.kind(name) == Some(VarKind::Associative) {
                    let key = self.expand_text(expr, io).await?;
                    Value::Scalar(self.env.get_assoc_element(name, &key))
                } else {
                    let index = self.expand_arithmetic(expr, io).await?;
                    Value::Scalar(
                        self.env
                            .resolve_index(name, index)
                            .and_then(|i| self.env.get_element(name, i)),
                    )
                }
            }
        })
    }

    async fn expand_parameter(
        &mut self,
        param: &ParamExpansion,
        quoted: bool,
        io: &IoContext,
        out: &mut Vec<Piece>,
    ) -> Result<()> {
        let name = param.name.as_str();
        let value = self.lookup(name, param.index.as_ref(), io).await?;

        let tolerates_unset = matches!(
            param.op,
            ParamOp::Default { .. } | ParamOp::Assign { .. } | ParamOp::Error { .. } | ParamOp::Alternative { .. }
        );
        if value.is_unset() && !tolerates_unset && self.options.is_set(ShellOption::Nounset) {
            return Err(Error::UnboundVariable(name.to_string()));
        }

        let (unset, null) = (value.is_unset(), value.is_null());
        let missing = move |colon: bool| unset || (colon && null);
        let value = match &param.op {
            ParamOp::None => value,
            ParamOp::Default { colon, word } => {
                if missing(*colon) {
                    return self.expand_parts(&word.parts, quoted, io, out).await;
                }
                value
            }
            ParamOp::Alternative { colon, word } => {
                if !missing(*colon) {
                    self.expand_parts(&word.parts, quoted, io, out).await?;
                }
                return Ok(());
            }
            ParamOp::Assign { colon, word } => {
                if missing(*colon) {
                    let text = self.expand_word_string(word, io).await?;
                    self.assign_parameter(param, &text, io).await?;
                    Value::Scalar(Some(text))
                } else {
                    value
                }
            }
            ParamOp::Error { colon, word } => {
                if missing(*colon) {
                    let message = match word {
                        Some(word) => self.expand_word_string(word, io).await?,
                        None if *colon => "parameter null or not set".to_string(),
                        None => "parameter not set".to_string(),
                    };
                    return Err(Error::Parameter {
                        name: name.to_string(),
                        message,
                    });
                }
                value
            }
            ParamOp::Length => {
                let len = match value {
                    Value::Scalar(v) => v.map_or(0, |v| v.chars().count()),
                    Value::List { items, .. } => items.len(),
                };
                Value::Scalar(Some(len.to_string()))
            }
            ParamOp::Indirect => {
                let target = match value {
                    Value::Scalar(v) => v.unwrap_or_default(),
                    Value::List { items, .. } => items.join(" "),
                };
                if target.is_empty() {
                    return Err(Error::InvalidExpression(format!("{name}: invalid indirect expansion")));
                }
                let inner = parse_parameter(&target)
                    .map_err(|_| Error::InvalidExpression(format!("{target}: invalid variable name")))?;
                self.lookup(&inner.name, inner.index.as_ref(), io).await?
            }
            ParamOp::Keys => Value::List {
                items: self.env.keys(name),
                joined: matches!(param.index, Some(Subscript::Star)),
            },
            ParamOp::RemovePrefix { longest, pattern } => {
                let pattern = self.expand_word_pattern(pattern, io).await?;
                value.map(|text| match match_prefix(&pattern, &text, *longest) {
                    Some(n) => text[n..].to_string(),
                    None => text,
                })
            }
            ParamOp::RemoveSuffix { longest, pattern } => {
                let pattern = self.expand_word_pattern(pattern, io).await?;
                value.map(|text| match match_suffix(&pattern, &text, *longest) {
                    Some(n) => text[..n].to_string(),
                    None => text,
                })
            }
            ParamOp::Substring { offset, length } => {
                let offset_value = self.expand_arithmetic(offset, io).await?;
                let length_value = match length {
                    Some(text) => Some(self.expand_arithmetic(text, io).await?),
                    None => None,
                };
                let length_text = length.as_deref().unwrap_or_default();
                match value {
                    Value::Scalar(v) => {
                        let text = v.unwrap_or_default();
                        let len = text.chars().count();
                        Value::Scalar(Some(
                            match substring_range(len, offset_value, length_value, length_text)? {
                                Some((start, end)) => char_slice(&text, start, end),
                                None => String::new(),
                            },
                        ))
                    }
                    Value::List { items, joined } => {
                        // positional slices count $0 as element 0
                        let items = if matches!(name, "@" | "*") {
                            std::iter::once(self.env.script_name().to_string())
                                .chain(items)
                                .collect()
                        } else {
                            items
                        };
                        let items = match substring_range(items.len(), offset_value, length_value, length_text)? {
                            Some((start, end)) => items[start..end].to_vec(),
                            None => Vec::new(),
                        };
                        Value::List { items, joined }
                    }
                }
            }
            ParamOp::Replace {
                pattern,
                replacement,
                mode,
            } => {
                let pattern = self.expand_word_pattern(pattern, io).await?;
                let replacement = self.expand_word_string(replacement, io).await?;
                value.map(|text| replace_text(&text, &pattern, &replacement, *mode))
            }
            ParamOp::Case { upper, all } => value.map(|text| change_case(text, *upper, *all)),
        };
        self.emit_value(value, quoted, out);
        Ok(())
    }

    /// `${name:=word}` assignment.
    async fn assign_parameter(&mut self, param: &ParamExpansion, text: &str, io: &IoContext) -> Result<()> {
        let name = param.name.as_str();
        if !crate::parser::is_valid_name(name) {
            return Err(Error::InvalidExpression(format!("${name}: cannot assign in this way")));
        }
        match &param.index {
            None => self.env.set(name, text),
            Some(Subscript::Index(expr)) if self.env.kind(name) == Some(VarKind::Associative) => {
                let key = self.expand_text(expr, io).await?;
                self.env.set_assoc_element(name, &key, text);
            }
            Some(Subscript::Index(expr)) => {
                let index = self.expand_arithmetic(expr, io).await?;
                let index = usize::try_from(index)
                    .map_err(|_| Error::InvalidExpression(format!("{name}[{expr}]: bad array subscript")))?;
                self.env.set_element(name, index, text);
            }
            Some(_) => {
                return Err(Error::InvalidExpression(format!("{name}: cannot assign to a list")));
            }
        }
        Ok(())
    }

    /// Run `$(...)` and return its output without trailing newlines.
    ///
    /// The inner script runs on a forked interpreter with its own capture
    /// buffer, so assignments inside it are not seen by the caller.
    fn command_substitution<'a>(&'a mut self, program: &'a Program, io: &'a IoContext) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.counters.push_substitution(&self.limits)?;
            let (sink, buffer) = Sink::buffer();
            let sub_io = io.with_stdout(sink);
            let mut sub = self.subshell();
            let outcome = sub.execute_statements(&program.statements, &sub_io).await;
            self.counters.pop_substitution();

            let status = match outcome {
                Ok(ControlFlow::Exit(code)) => code,
                Ok(_) => sub.last_status,
                Err(e @ (Error::Interrupted { .. } | Error::ResourceLimit(_))) => return Err(e),
                Err(e) => {
                    io.diagnostic(&format!("tidesh: {e}"));
                    e.exit_code()
                }
            };
            sub.finish_process_substitutions(&sub_io).await?;
            self.last_substitution_status = Some(status);

            let mut text = crate::interpreter::take_string(&buffer);
            while text.ends_with('\n') {
                text.pop();
            }
            tracing::trace!(status, bytes = text.len(), "command substitution");
            Ok(text)
        })
    }

    /// Set up `<(...)` or `>(...)` and return the path standing in for it.
    ///
    /// `<(cmd)` runs to completion first, writing into a temporary file.
    /// `>(cmd)` runs after the current command finishes, reading what the
    /// command wrote to the file.
    async fn process_substitution(&mut self, program: &Program, input: bool, io: &IoContext) -> Result<String> {
        let file = tempfile::NamedTempFile::new()?;
        if input {
            let writer = file.reopen()?;
            let sub_io = io.with_stdout(Sink::File(std::sync::Arc::new(writer)));
            let mut sub = self.subshell();
            match sub.execute_statements(&program.statements, &sub_io).await {
                Ok(_) => {}
                Err(e @ Error::Interrupted { .. }) => return Err(e),
                Err(e) => io.diagnostic(&format!("tidesh: {e}")),
            }
            sub.finish_process_substitutions(&sub_io).await?;
        }
        let path = file.into_temp_path();
        let display = path.display().to_string();
        self.pending_substitutions.push(PendingSubstitution {
            path,
            program: (!input).then(|| program.clone()),
        });
        Ok(display)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields(pieces: Vec<Piece>, ifs: &str) -> Vec<String> {
        let mut builder = FieldBuilder::new(ifs);
        for piece in pieces {
            builder.push(piece);
        }
        builder.finish().into_iter().map(|f| f.text).collect()
    }

    #[test]
    fn test_split_joins_surrounding_text() {
        let pieces = vec![
            Piece::literal("x", false),
            Piece::expanded("a b", false),
            Piece::literal("y", false),
        ];
        assert_eq!(fields(pieces, DEFAULT_IFS), vec!["xa", "by"]);
    }

    #[test]
    fn test_leading_separator_ends_prefix() {
        let pieces = vec![Piece::literal("x", false), Piece::expanded(":a", false)];
        assert_eq!(fields(pieces, ":"), vec!["x", "a"]);
        assert_eq!(fields(vec![Piece::expanded(":a", false)], ":"), vec!["", "a"]);
    }

    #[test]
    fn test_empty_quoted_is_a_field() {
        assert_eq!(fields(vec![Piece::literal("", true)], DEFAULT_IFS), vec![""]);
        assert!(fields(vec![Piece::expanded("", false)], DEFAULT_IFS).is_empty());
    }

    #[test]
    fn test_break_separates_fields() {
        let pieces = vec![
            Piece::literal("a", true),
            Piece::Break,
            Piece::literal("b c", true),
        ];
        assert_eq!(fields(pieces, DEFAULT_IFS), vec!["a", "b c"]);
    }

    #[test]
    fn test_quoted_glob_chars_are_escaped() {
        let mut builder = FieldBuilder::new(DEFAULT_IFS);
        builder.push(Piece::literal("*", true));
        builder.push(Piece::literal("?", false));
        let field = builder.finish().pop().unwrap();
        assert_eq!(field.pattern, "\\*?");
        assert!(field.has_glob);
    }

    #[test]
    fn test_brace_expansion_on_literals() {
        let word = Word {
            parts: vec![
                WordPart::Literal("a{1,2}".into()),
                WordPart::Variable("x".into()),
                WordPart::Literal("{b,c}".into()),
            ],
        };
        let words = brace_expand_word(&word);
        assert_eq!(words.len(), 4);
        assert_eq!(words[0].parts[0], WordPart::Literal("a1".into()));
        assert_eq!(words[1].parts[2], WordPart::Literal("c".into()));
    }

    #[test]
    fn test_substring_range() {
        assert_eq!(substring_range(5, 1, Some(2), "2").unwrap(), Some((1, 3)));
        assert_eq!(substring_range(5, -2, None, "").unwrap(), Some((3, 5)));
        assert_eq!(substring_range(5, 1, Some(-1), "-1").unwrap(), Some((1, 4)));
        assert_eq!(substring_range(5, 9, None, "").unwrap(), None);
        assert!(substring_range(5, 3, Some(-4), "-4").is_err());
        assert_eq!(substring_range(3, 1, Some(i64::MAX), "").unwrap(), Some((1, 3)));
        assert_eq!(substring_range(3, i64::MIN, None, "").unwrap(), None);
        assert!(substring_range(3, 0, Some(i64::MIN), "").is_err());
    }

    #[test]
    fn test_replace_modes() {
        assert_eq!(replace_text("a-b-c", "-", "+", ReplaceMode::First), "a+b-c");
        assert_eq!(replace_text("a-b-c", "-", "+", ReplaceMode::All), "a+b+c");
        assert_eq!(replace_text("abc", "a", "X", ReplaceMode::Prefix), "Xbc");
        assert_eq!(replace_text("abc", "c", "X", ReplaceMode::Suffix), "abX");
        assert_eq!(replace_text("abc", "z", "X", ReplaceMode::All), "abc");
    }

    #[test]
    fn test_case_modification() {
        assert_eq!(change_case("hello".into(), true, false), "Hello");
        assert_eq!(change_case("hello".into(), true, true), "HELLO");
        assert_eq!(change_case("HeLLo".into(), false, true), "hello");
    }
}
