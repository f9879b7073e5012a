//! AST types for parsed shell scripts
//!
//! The executor consumes these read-only. Every statement kind is a variant
//! of the closed [`Statement`] enum so dispatch is an exhaustive `match`.

use std::sync::Arc;

/// A complete script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A single statement in a script or block.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// A simple command (e.g., `FOO=1 echo hello > out`)
    Command(CommandStatement),

    /// A pipeline (e.g., `ls | grep foo`), possibly negated with `!`
    Pipeline(Pipeline),

    /// An AND-OR list (e.g., `a && b || c`)
    AndOr(AndOrList),

    /// `if ...; then ...; elif ...; else ...; fi`
    If(IfStatement),

    /// `for name in words; do ...; done`
    For(ForStatement),

    /// `for ((init; cond; step)); do ...; done`
    ArithFor(ArithForStatement),

    /// `while`/`until` loops
    While(WhileStatement),

    /// `case word in pattern) ...;; esac`
    Case(CaseStatement),

    /// Function definition
    Function(FunctionStatement),

    /// Brace group `{ ...; }`
    Block(BlockStatement),

    /// Subshell `( ... )`: runs with isolated variables and cwd
    Subshell(BlockStatement),

    /// Arithmetic command `(( expr ))`
    Arithmetic(ArithmeticCommand),

    /// `break [N]`
    Break(LoopControl),

    /// `continue [N]`
    Continue(LoopControl),

    /// `return [N]`
    Return(ReturnStatement),

    /// A statement terminated by `&`
    Background(BackgroundStatement),

    /// A compound statement with redirections (e.g., `while ...; done < file`)
    Redirected(RedirectedStatement),
}

/// A simple command with assignments, words and redirections.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandStatement {
    /// Variable assignments before the command name
    pub assignments: Vec<Assignment>,
    /// Command name; `None` for assignment-only or redirect-only commands
    pub name: Option<Word>,
    /// Command arguments
    pub args: Vec<Word>,
    /// Arguments of `declare`/`local`/`export`-style commands that are
    /// assignments, keyed by their position in `args`
    pub declarations: Vec<(usize, Assignment)>,
    /// Redirections
    pub redirects: Vec<Redirect>,
}

/// A pipeline of statements connected by `|`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Whether the pipeline is negated (`!`)
    pub negated: bool,
    /// Stages, left to right
    pub commands: Vec<Statement>,
}

/// A list of pipelines joined by `&&` / `||`.
#[derive(Debug, Clone, PartialEq)]
pub struct AndOrList {
    pub first: Box<Statement>,
    pub rest: Vec<(AndOrOp, Statement)>,
}

/// Operators for AND-OR lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndOrOp {
    /// `&&` - run next if previous succeeded
    And,
    /// `||` - run next if previous failed
    Or,
}

/// If statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Vec<Statement>,
    pub consequence: Vec<Statement>,
    pub elifs: Vec<ElifClause>,
    pub alternative: Option<Vec<Statement>>,
}

/// An `elif` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct ElifClause {
    pub condition: Vec<Statement>,
    pub body: Vec<Statement>,
}

/// For loop over words (or positional parameters when `items` is `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    pub variable: String,
    pub items: Option<Vec<Word>>,
    pub body: Vec<Statement>,
}

/// C-style arithmetic for loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ArithForStatement {
    pub init: String,
    pub condition: String,
    pub step: String,
    pub body: Vec<Statement>,
}

/// While or until loop.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub condition: Vec<Statement>,
    pub body: Vec<Statement>,
    /// `until` loops run while the condition fails
    pub until: bool,
}

/// Case statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseStatement {
    pub word: Word,
    pub clauses: Vec<CaseClause>,
}

/// One `pattern) body ;;` arm of a case statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    pub patterns: Vec<Word>,
    pub body: Vec<Statement>,
    pub terminator: CaseTerminator,
}

/// How a case clause hands off after its body runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTerminator {
    /// `;;` - stop
    Break,
    /// `;&` - run the next clause body without testing its patterns
    FallThrough,
    /// `;;&` - keep testing the following clauses
    Continue,
}

/// Function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionStatement {
    pub name: String,
    pub body: Arc<Statement>,
}

/// A `{ ... }` or `( ... )` body.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

/// `(( expression ))`
#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticCommand {
    pub expression: String,
}

/// `break` / `continue` with an optional level word.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopControl {
    pub level: Option<Word>,
}

/// `return` with an optional status word.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub status: Option<Word>,
}

/// A statement started with `&`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundStatement {
    pub statement: Box<Statement>,
    /// Source text, shown by `jobs`
    pub command_line: String,
}

/// Compound statement plus trailing redirections.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectedStatement {
    pub body: Box<Statement>,
    pub redirects: Vec<Redirect>,
}

/// A word (potentially with expansions).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    /// Create a simple literal word.
    pub fn literal(s: impl Into<String>) -> Self {
        Self {
            parts: vec![WordPart::Literal(s.into())],
        }
    }

    /// The word's text if it contains no expansions, with quotes removed.
    pub fn as_literal(&self) -> Option<String> {
        fn collect(parts: &[WordPart], out: &mut String) -> bool {
            for part in parts {
                match part {
                    WordPart::Literal(s) | WordPart::SingleQuoted(s) => out.push_str(s),
                    WordPart::Escaped(c) => out.push(*c),
                    WordPart::DoubleQuoted(inner) => {
                        if !collect(inner, out) {
                            return false;
                        }
                    }
                    _ => return false,
                }
            }
            true
        }
        let mut out = String::new();
        collect(&self.parts, &mut out).then_some(out)
    }

    /// Whether any part of the word is quoted or escaped.
    pub fn is_quoted(&self) -> bool {
        self.parts.iter().any(|p| {
            matches!(
                p,
                WordPart::SingleQuoted(_) | WordPart::DoubleQuoted(_) | WordPart::Escaped(_)
            )
        })
    }
}

/// Parts of a word.
#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    /// Unquoted literal text (subject to globbing)
    Literal(String),
    /// `'...'` - no expansion at all
    SingleQuoted(String),
    /// `"..."` - expansions inside, but no splitting or globbing
    DoubleQuoted(Vec<WordPart>),
    /// Backslash-escaped character outside quotes
    Escaped(char),
    /// `~` or `~user` at the start of a word
    Tilde(String),
    /// `$name`, `$1`, `$@`, `$?` ...
    Variable(String),
    /// `${...}`
    Parameter(Box<ParamExpansion>),
    /// `$(...)` or backticks
    CommandSubstitution(Program),
    /// `$((...))`, raw expression text
    Arithmetic(String),
    /// `<(...)` (input) or `>(...)` (output)
    ProcessSubstitution { program: Program, input: bool },
}

/// A `${...}` expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamExpansion {
    pub name: String,
    pub index: Option<Subscript>,
    pub op: ParamOp,
}

/// Array subscript in `${name[...]}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Subscript {
    /// `[@]`
    All,
    /// `[*]`
    Star,
    /// `[expr]` - arithmetic for indexed arrays, key for associative ones
    Index(String),
}

/// Operator applied inside `${...}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamOp {
    /// `${name}`
    None,
    /// `${#name}`
    Length,
    /// `${!name}`
    Indirect,
    /// `${!name[@]}`
    Keys,
    /// `${name:-word}` / `${name-word}`
    Default { colon: bool, word: Word },
    /// `${name:=word}` / `${name=word}`
    Assign { colon: bool, word: Word },
    /// `${name:?word}` / `${name?word}`
    Error { colon: bool, word: Option<Word> },
    /// `${name:+word}` / `${name+word}`
    Alternative { colon: bool, word: Word },
    /// `${name#pat}` / `${name##pat}`
    RemovePrefix { longest: bool, pattern: Word },
    /// `${name%pat}` / `${name%%pat}`
    RemoveSuffix { longest: bool, pattern: Word },
    /// `${name:offset}` / `${name:offset:length}`, arithmetic text
    Substring {
        offset: String,
        length: Option<String>,
    },
    /// `${name/pat/rep}` and friends
    Replace {
        pattern: Word,
        replacement: Word,
        mode: ReplaceMode,
    },
    /// `${name^}`, `${name^^}`, `${name,}`, `${name,,}`
    Case { upper: bool, all: bool },
}

/// Which matches `${name/pat/rep}` replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    First,
    All,
    Prefix,
    Suffix,
}

/// I/O redirection.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    /// File descriptor (default: 1 for output kinds, 0 for input kinds)
    pub fd: Option<i32>,
    /// Type of redirection
    pub kind: RedirectKind,
    /// Target file, fd number, or here-string word
    pub target: Word,
    /// Here-document body for `<<` / `<<-`
    pub heredoc: Option<HereDoc>,
}

impl Redirect {
    /// The file descriptor this redirect applies to.
    pub fn effective_fd(&self) -> i32 {
        self.fd.unwrap_or(match self.kind {
            RedirectKind::Input
            | RedirectKind::HereDoc
            | RedirectKind::HereDocStrip
            | RedirectKind::HereString
            | RedirectKind::DupInput
            | RedirectKind::ReadWrite => 0,
            _ => 1,
        })
    }
}

/// Types of redirections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<`
    Input,
    /// `>`
    Output,
    /// `>>`
    Append,
    /// `<<`
    HereDoc,
    /// `<<-` (leading tabs stripped)
    HereDocStrip,
    /// `<<<`
    HereString,
    /// `<&`
    DupInput,
    /// `>&`
    DupOutput,
    /// `>|` (ignores noclobber)
    Clobber,
    /// `<>`
    ReadWrite,
    /// `&>`
    OutputBoth,
    /// `&>>`
    AppendBoth,
}

/// Here-document body captured by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct HereDoc {
    /// Raw body text, one `\n` per line
    pub body: String,
    /// Delimiter was quoted: body is used verbatim
    pub quoted: bool,
}

/// Variable assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    /// Optional subscript for `arr[0]=value`
    pub index: Option<String>,
    pub value: AssignmentValue,
    /// `+=`
    pub append: bool,
}

/// Value in an assignment - scalar or array
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentValue {
    /// `VAR=value`
    Scalar(Word),
    /// `VAR=(a b [k]=c)`
    Array(Vec<ArrayElement>),
}

/// One element of an array literal.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElement {
    /// `[key]=` prefix, if present
    pub key: Option<String>,
    pub value: Word,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_word() {
        let word = Word {
            parts: vec![
                WordPart::Literal("a".into()),
                WordPart::SingleQuoted("b c".into()),
                WordPart::DoubleQuoted(vec![WordPart::Literal("d".into())]),
                WordPart::Escaped('$'),
            ],
        };
        assert_eq!(word.as_literal().as_deref(), Some("ab cd$"));
        assert!(word.is_quoted());
    }

    #[test]
    fn test_non_literal_word() {
        let word = Word {
            parts: vec![WordPart::Variable("HOME".into())],
        };
        assert_eq!(word.as_literal(), None);
        assert!(!word.is_quoted());
    }

    #[test]
    fn test_effective_fd() {
        let redirect = Redirect {
            fd: None,
            kind: RedirectKind::HereString,
            target: Word::literal("x"),
            heredoc: None,
        };
        assert_eq!(redirect.effective_fd(), 0);
        let redirect = Redirect {
            fd: Some(2),
            kind: RedirectKind::Output,
            target: Word::literal("x"),
            heredoc: None,
        };
        assert_eq!(redirect.effective_fd(), 2);
    }
}
