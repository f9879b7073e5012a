//! Token types for the lexer

use super::ast::RedirectKind;

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A word with its quoting kept verbatim; the word parser splits it into
    /// parts later
    Word(String),

    /// Newline character
    Newline,

    /// Semicolon (;)
    Semicolon,

    /// Case terminator (;;)
    DoubleSemicolon,

    /// Case fall-through (;&)
    SemiAmp,

    /// Case continue-testing (;;&)
    DoubleSemiAmp,

    /// Pipe (|)
    Pipe,

    /// And (&&)
    And,

    /// Or (||)
    Or,

    /// Background (&)
    Background,

    /// Left parenthesis (()
    LeftParen,

    /// Right parenthesis ())
    RightParen,

    /// `(( expr ))` at command position, with the expression text
    Arithmetic(String),

    /// Redirection operator with optional leading fd number
    Redirect { fd: Option<i32>, kind: RedirectKind },

    /// `<<DELIM` or `<<-DELIM` together with the captured body
    HereDoc {
        fd: Option<i32>,
        strip_tabs: bool,
        delimiter: String,
        quoted: bool,
        body: String,
    },
}

impl Token {
    /// Short description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            Token::Word(w) => format!("`{w}'"),
            Token::Newline => "newline".to_string(),
            Token::Semicolon => "`;'".to_string(),
            Token::DoubleSemicolon => "`;;'".to_string(),
            Token::SemiAmp => "`;&'".to_string(),
            Token::DoubleSemiAmp => "`;;&'".to_string(),
            Token::Pipe => "`|'".to_string(),
            Token::And => "`&&'".to_string(),
            Token::Or => "`||'".to_string(),
            Token::Background => "`&'".to_string(),
            Token::LeftParen => "`('".to_string(),
            Token::RightParen => "`)'".to_string(),
            Token::Arithmetic(_) => "`(('".to_string(),
            Token::Redirect { .. } => "redirection".to_string(),
            Token::HereDoc { .. } => "here-document".to_string(),
        }
    }
}
