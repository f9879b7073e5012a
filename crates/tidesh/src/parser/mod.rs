//! Parser module for Tidesh
//!
//! Recursive descent over the lexer's token stream, producing the AST in
//! [`ast`]. Words are handed to [`word`] to split quoting and expansions.

mod ast;
mod lexer;
mod span;
mod tokens;
mod word;

pub use ast::*;
pub use lexer::{Lexer, SpannedToken};
pub use span::{Position, Span};
pub use tokens::Token;
pub use word::{parse_expandable_text, parse_parameter, parse_word};

use std::sync::Arc;

use crate::error::{Error, Result};

/// Whether `name` is a valid variable or function identifier.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const RESERVED: &[&str] = &[
    "if", "then", "elif", "else", "fi", "for", "in", "do", "done", "while", "until", "case",
    "esac", "function", "{", "}", "!",
];

/// Parser for shell scripts.
pub struct Parser {
    lexer: Lexer,
    current: Option<SpannedToken>,
    peeked: Option<SpannedToken>,
    primed: bool,
    /// End offset of the last consumed token
    last_end: usize,
}

impl Parser {
    /// Create a new parser for the given input.
    pub fn new(input: &str) -> Self {
        Self {
            lexer: Lexer::new(input),
            current: None,
            peeked: None,
            primed: false,
            last_end: 0,
        }
    }

    /// Parse the input into a program.
    pub fn parse(mut self) -> Result<Program> {
        self.advance()?;
        let statements = self.parse_list(&[])?;
        if let Some(tok) = &self.current {
            return Err(self.unexpected(&tok.token.clone()));
        }
        Ok(Program { statements })
    }

    fn advance(&mut self) -> Result<()> {
        let next = match self.peeked.take() {
            Some(tok) => Some(tok),
            None => self.lexer.next_token()?,
        };
        if self.primed {
            if let Some(prev) = &self.current {
                self.last_end = prev.span.end.offset;
            }
        }
        self.primed = true;
        self.current = next;
        Ok(())
    }

    fn peek_next(&mut self) -> Result<Option<&Token>> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        Ok(self.peeked.as_ref().map(|t| &t.token))
    }

    fn token(&self) -> Option<&Token> {
        self.current.as_ref().map(|t| &t.token)
    }

    fn start_offset(&self) -> usize {
        self.current
            .as_ref()
            .map_or(self.last_end, |t| t.span.start.offset)
    }

    fn is_word(&self, keyword: &str) -> bool {
        matches!(self.token(), Some(Token::Word(w)) if w == keyword)
    }

    fn unexpected(&self, token: &Token) -> Error {
        let pos = self
            .current
            .as_ref()
            .map(|t| t.span.start)
            .unwrap_or_else(|| self.lexer.position());
        Error::parse_at(
            format!("syntax error near unexpected token {}", token.describe()),
            pos.line,
            pos.column,
        )
    }

    fn eof_error(&self) -> Error {
        let pos = self.lexer.position();
        Error::parse_at("syntax error: unexpected end of file", pos.line, pos.column)
    }

    fn expect_word(&mut self, keyword: &str) -> Result<()> {
        if self.is_word(keyword) {
            return self.advance();
        }
        match self.token().cloned() {
            Some(tok) => Err(self.unexpected(&tok)),
            None => Err(self.eof_error()),
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.token().cloned() {
            Some(tok) if &tok == expected => self.advance(),
            Some(tok) => Err(self.unexpected(&tok)),
            None => Err(self.eof_error()),
        }
    }

    fn skip_newlines(&mut self) -> Result<()> {
        while matches!(self.token(), Some(Token::Newline)) {
            self.advance()?;
        }
        Ok(())
    }

    fn skip_separators(&mut self) -> Result<()> {
        while matches!(self.token(), Some(Token::Newline | Token::Semicolon)) {
            self.advance()?;
        }
        Ok(())
    }

    /// Parse statements until EOF, a closing token, or one of `terminators`
    /// in command position.
    fn parse_list(&mut self, terminators: &[&str]) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators()?;
            match self.token() {
                None
                | Some(
                    Token::RightParen
                    | Token::DoubleSemicolon
                    | Token::SemiAmp
                    | Token::DoubleSemiAmp,
                ) => break,
                Some(Token::Word(w)) if terminators.contains(&w.as_str()) => break,
                _ => {}
            }
            let statement = self.parse_and_or_background()?;
            let backgrounded = matches!(statement, Statement::Background(_));
            statements.push(statement);
            if backgrounded {
                continue;
            }
            match self.token() {
                None
                | Some(
                    Token::Newline
                    | Token::Semicolon
                    | Token::RightParen
                    | Token::DoubleSemicolon
                    | Token::SemiAmp
                    | Token::DoubleSemiAmp,
                ) => {}
                Some(Token::Word(w)) if terminators.contains(&w.as_str()) => {}
                Some(tok) => {
                    let tok = tok.clone();
                    return Err(self.unexpected(&tok));
                }
            }
        }
        Ok(statements)
    }

    fn parse_and_or_background(&mut self) -> Result<Statement> {
        let start = self.start_offset();
        let statement = self.parse_and_or()?;
        if matches!(self.token(), Some(Token::Background)) {
            let command_line = self.lexer.slice(start, self.current_end());
            let command_line = command_line.trim().trim_end_matches('&').trim_end().to_string();
            self.advance()?;
            return Ok(Statement::Background(BackgroundStatement {
                statement: Box::new(statement),
                command_line,
            }));
        }
        Ok(statement)
    }

    fn current_end(&self) -> usize {
        self.current
            .as_ref()
            .map_or(self.last_end, |t| t.span.end.offset)
    }

    fn parse_and_or(&mut self) -> Result<Statement> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.token() {
                Some(Token::And) => AndOrOp::And,
                Some(Token::Or) => AndOrOp::Or,
                _ => break,
            };
            self.advance()?;
            self.skip_newlines()?;
            rest.push((op, self.parse_pipeline()?));
        }
        if rest.is_empty() {
            return Ok(first);
        }
        Ok(Statement::AndOr(AndOrList {
            first: Box::new(first),
            rest,
        }))
    }

    fn parse_pipeline(&mut self) -> Result<Statement> {
        let mut negated = false;
        while self.is_word("!") {
            negated = !negated;
            self.advance()?;
        }
        let mut commands = vec![self.parse_command()?];
        while matches!(self.token(), Some(Token::Pipe)) {
            self.advance()?;
            self.skip_newlines()?;
            commands.push(self.parse_command()?);
        }
        if commands.len() == 1 && !negated {
            return Ok(commands.remove(0));
        }
        Ok(Statement::Pipeline(Pipeline { negated, commands }))
    }

    fn parse_command(&mut self) -> Result<Statement> {
        let compound = match self.token().cloned() {
            None => return Err(self.eof_error()),
            Some(Token::Word(w)) => match w.as_str() {
                "if" => self.parse_if()?,
                "for" => self.parse_for()?,
                "while" => self.parse_while(false)?,
                "until" => self.parse_while(true)?,
                "case" => self.parse_case()?,
                "{" => self.parse_block()?,
                "function" => self.parse_function_keyword()?,
                "break" | "continue" | "return" => return self.parse_flow_command(&w),
                _ => {
                    if is_valid_name(&w)
                        && !RESERVED.contains(&w.as_str())
                        && matches!(self.peek_next()?, Some(Token::LeftParen))
                    {
                        self.parse_function_parens(w)?
                    } else {
                        return self.parse_simple_command();
                    }
                }
            },
            Some(Token::LeftParen) => self.parse_subshell()?,
            Some(Token::Arithmetic(expr)) => {
                self.advance()?;
                Statement::Arithmetic(ArithmeticCommand { expression: expr })
            }
            Some(Token::Redirect { .. } | Token::HereDoc { .. }) => {
                return self.parse_simple_command();
            }
            Some(tok) => return Err(self.unexpected(&tok)),
        };

        let mut redirects = Vec::new();
        while let Some(redirect) = self.parse_redirect()? {
            redirects.push(redirect);
        }
        if redirects.is_empty() {
            Ok(compound)
        } else {
            Ok(Statement::Redirected(RedirectedStatement {
                body: Box::new(compound),
                redirects,
            }))
        }
    }

    /// Parse a redirect at the current token, if there is one.
    fn parse_redirect(&mut self) -> Result<Option<Redirect>> {
        match self.token().cloned() {
            Some(Token::Redirect { fd, kind }) => {
                self.advance()?;
                let target = match self.token().cloned() {
                    Some(Token::Word(w)) => {
                        self.advance()?;
                        parse_word(&w)?
                    }
                    Some(tok) => return Err(self.unexpected(&tok)),
                    None => return Err(self.eof_error()),
                };
                Ok(Some(Redirect {
                    fd,
                    kind,
                    target,
                    heredoc: None,
                }))
            }
            Some(Token::HereDoc {
                fd,
                strip_tabs,
                delimiter,
                quoted,
                body,
            }) => {
                self.advance()?;
                Ok(Some(Redirect {
                    fd,
                    kind: if strip_tabs {
                        RedirectKind::HereDocStrip
                    } else {
                        RedirectKind::HereDoc
                    },
                    target: Word::literal(delimiter),
                    heredoc: Some(HereDoc { body, quoted }),
                }))
            }
            _ => Ok(None),
        }
    }

    fn parse_simple_command(&mut self) -> Result<Statement> {
        let mut assignments = Vec::new();
        let mut name: Option<Word> = None;
        let mut args = Vec::new();
        let mut declarations = Vec::new();
        let mut redirects = Vec::new();

        loop {
            if let Some(redirect) = self.parse_redirect()? {
                redirects.push(redirect);
                continue;
            }
            let Some(Token::Word(raw)) = self.token().cloned() else {
                break;
            };
            self.advance()?;
            if name.is_none() {
                if let Some(assignment) = parse_assignment(&raw)? {
                    assignments.push(assignment);
                    continue;
                }
                name = Some(parse_word(&raw)?);
            } else {
                if is_declaration_command(name.as_ref()) {
                    if let Some(assignment) = parse_assignment(&raw)? {
                        declarations.push((args.len(), assignment));
                    }
                }
                args.push(parse_word(&raw)?);
            }
        }

        if name.is_none() && assignments.is_empty() && redirects.is_empty() {
            return match self.token().cloned() {
                Some(tok) => Err(self.unexpected(&tok)),
                None => Err(self.eof_error()),
            };
        }

        Ok(Statement::Command(CommandStatement {
            assignments,
            name,
            args,
            declarations,
            redirects,
        }))
    }

    fn parse_flow_command(&mut self, keyword: &str) -> Result<Statement> {
        self.advance()?;
        let arg = match self.token().cloned() {
            Some(Token::Word(w)) => {
                self.advance()?;
                Some(parse_word(&w)?)
            }
            _ => None,
        };
        Ok(match keyword {
            "break" => Statement::Break(LoopControl { level: arg }),
            "continue" => Statement::Continue(LoopControl { level: arg }),
            _ => Statement::Return(ReturnStatement { status: arg }),
        })
    }

    fn parse_if(&mut self) -> Result<Statement> {
        self.expect_word("if")?;
        let condition = self.parse_list(&["then"])?;
        self.expect_word("then")?;
        let consequence = self.parse_list(&["elif", "else", "fi"])?;

        let mut elifs = Vec::new();
        while self.is_word("elif") {
            self.advance()?;
            let condition = self.parse_list(&["then"])?;
            self.expect_word("then")?;
            let body = self.parse_list(&["elif", "else", "fi"])?;
            elifs.push(ElifClause { condition, body });
        }

        let alternative = if self.is_word("else") {
            self.advance()?;
            Some(self.parse_list(&["fi"])?)
        } else {
            None
        };
        self.expect_word("fi")?;

        Ok(Statement::If(IfStatement {
            condition,
            consequence,
            elifs,
            alternative,
        }))
    }

    fn parse_do_group(&mut self) -> Result<Vec<Statement>> {
        self.skip_separators()?;
        self.expect_word("do")?;
        let body = self.parse_list(&["done"])?;
        self.expect_word("done")?;
        Ok(body)
    }

    fn parse_while(&mut self, until: bool) -> Result<Statement> {
        self.advance()?;
        let condition = self.parse_list(&["do"])?;
        let body = self.parse_do_group()?;
        Ok(Statement::While(WhileStatement {
            condition,
            body,
            until,
        }))
    }

    fn parse_for(&mut self) -> Result<Statement> {
        self.expect_word("for")?;

        if let Some(Token::Arithmetic(expr)) = self.token().cloned() {
            self.advance()?;
            let mut sections = expr.splitn(3, ';').map(|s| s.trim().to_string());
            let init = sections.next().unwrap_or_default();
            let condition = sections.next().unwrap_or_default();
            let step = sections.next().unwrap_or_default();
            let body = self.parse_do_group()?;
            return Ok(Statement::ArithFor(ArithForStatement {
                init,
                condition,
                step,
                body,
            }));
        }

        let variable = match self.token().cloned() {
            Some(Token::Word(w)) if is_valid_name(&w) => w,
            Some(tok) => return Err(self.unexpected(&tok)),
            None => return Err(self.eof_error()),
        };
        self.advance()?;
        self.skip_newlines()?;

        let items = if self.is_word("in") {
            self.advance()?;
            let mut items = Vec::new();
            while let Some(Token::Word(w)) = self.token().cloned() {
                self.advance()?;
                items.push(parse_word(&w)?);
            }
            Some(items)
        } else {
            None
        };

        let body = self.parse_do_group()?;
        Ok(Statement::For(ForStatement {
            variable,
            items,
            body,
        }))
    }

    fn parse_case(&mut self) -> Result<Statement> {
        self.expect_word("case")?;
        let word = match self.token().cloned() {
            Some(Token::Word(w)) => {
                self.advance()?;
                parse_word(&w)?
            }
            Some(tok) => return Err(self.unexpected(&tok)),
            None => return Err(self.eof_error()),
        };
        self.skip_newlines()?;
        self.expect_word("in")?;
        self.skip_separators()?;

        let mut clauses = Vec::new();
        while !self.is_word("esac") {
            if matches!(self.token(), Some(Token::LeftParen)) {
                self.advance()?;
            }
            let mut patterns = Vec::new();
            loop {
                match self.token().cloned() {
                    Some(Token::Word(w)) => {
                        self.advance()?;
                        patterns.push(parse_word(&w)?);
                    }
                    Some(tok) => return Err(self.unexpected(&tok)),
                    None => return Err(self.eof_error()),
                }
                if matches!(self.token(), Some(Token::Pipe)) {
                    self.advance()?;
                } else {
                    break;
                }
            }
            self.expect(&Token::RightParen)?;

            let body = self.parse_list(&["esac"])?;
            let terminator = match self.token() {
                Some(Token::DoubleSemicolon) => CaseTerminator::Break,
                Some(Token::SemiAmp) => CaseTerminator::FallThrough,
                Some(Token::DoubleSemiAmp) => CaseTerminator::Continue,
                _ => CaseTerminator::Break,
            };
            if !self.is_word("esac") {
                match self.token().cloned() {
                    Some(
                        Token::DoubleSemicolon | Token::SemiAmp | Token::DoubleSemiAmp,
                    ) => self.advance()?,
                    Some(tok) => return Err(self.unexpected(&tok)),
                    None => return Err(self.eof_error()),
                }
            }
            clauses.push(CaseClause {
                patterns,
                body,
                terminator,
            });
            self.skip_separators()?;
        }
        self.expect_word("esac")?;

        Ok(Statement::Case(CaseStatement { word, clauses }))
    }

    fn parse_block(&mut self) -> Result<Statement> {
        self.expect_word("{")?;
        let statements = self.parse_list(&["}"])?;
        self.expect_word("}")?;
        Ok(Statement::Block(BlockStatement { statements }))
    }

    fn parse_subshell(&mut self) -> Result<Statement> {
        self.expect(&Token::LeftParen)?;
        let statements = self.parse_list(&[])?;
        self.expect(&Token::RightParen)?;
        Ok(Statement::Subshell(BlockStatement { statements }))
    }

    /// `function name [()] body`
    fn parse_function_keyword(&mut self) -> Result<Statement> {
        self.expect_word("function")?;
        let name = match self.token().cloned() {
            Some(Token::Word(w)) if is_valid_name(&w) => w,
            Some(tok) => return Err(self.unexpected(&tok)),
            None => return Err(self.eof_error()),
        };
        self.advance()?;
        if matches!(self.token(), Some(Token::LeftParen)) {
            self.advance()?;
            self.expect(&Token::RightParen)?;
        }
        self.parse_function_body(name)
    }

    /// `name() body`
    fn parse_function_parens(&mut self, name: String) -> Result<Statement> {
        self.advance()?;
        self.expect(&Token::LeftParen)?;
        self.expect(&Token::RightParen)?;
        self.parse_function_body(name)
    }

    fn parse_function_body(&mut self, name: String) -> Result<Statement> {
        self.skip_newlines()?;
        let body = self.parse_command()?;
        Ok(Statement::Function(FunctionStatement {
            name,
            body: Arc::new(body),
        }))
    }
}

/// Recognize `NAME=value`, `NAME+=value`, `NAME[sub]=value` and array
/// literals `NAME=(...)`.
/// Builtins whose `name=value` arguments are assignments.
const DECLARATION_COMMANDS: &[&str] = &["declare", "typeset", "local", "export"];

fn is_declaration_command(name: Option<&Word>) -> bool {
    name.and_then(Word::as_literal)
        .is_some_and(|n| DECLARATION_COMMANDS.contains(&n.as_str()))
}

fn parse_assignment(raw: &str) -> Result<Option<Assignment>> {
    let Some(eq) = raw.find('=') else {
        return Ok(None);
    };
    let (head, value) = (&raw[..eq], &raw[eq + 1..]);
    let (head, append) = match head.strip_suffix('+') {
        Some(h) => (h, true),
        None => (head, false),
    };
    let (name, index) = match head.find('[') {
        Some(open) if head.ends_with(']') => (&head[..open], Some(head[open + 1..head.len() - 1].to_string())),
        Some(_) => return Ok(None),
        None => (head, None),
    };
    if !is_valid_name(name) {
        return Ok(None);
    }

    let value = if index.is_none() && value.starts_with('(') && value.ends_with(')') {
        AssignmentValue::Array(parse_array_literal(&value[1..value.len() - 1])?)
    } else {
        AssignmentValue::Scalar(parse_word(value)?)
    };

    Ok(Some(Assignment {
        name: name.to_string(),
        index,
        value,
        append,
    }))
}

fn parse_array_literal(inner: &str) -> Result<Vec<ArrayElement>> {
    let mut lexer = Lexer::new(inner);
    let mut elements = Vec::new();
    while let Some(tok) = lexer.next_token()? {
        match tok.token {
            Token::Newline => {}
            Token::Word(raw) => {
                let keyed = raw
                    .strip_prefix('[')
                    .and_then(|rest| rest.find("]=").map(|close| (rest, close)));
                let element = match keyed {
                    Some((rest, close)) => ArrayElement {
                        key: Some(rest[..close].to_string()),
                        value: parse_word(&rest[close + 2..])?,
                    },
                    None => ArrayElement {
                        key: None,
                        value: parse_word(&raw)?,
                    },
                };
                elements.push(element);
            }
            other => {
                return Err(Error::Parse(format!(
                    "syntax error in array literal near {}",
                    other.describe()
                )));
            }
        }
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Program {
        Parser::new(input).parse().unwrap()
    }

    fn single(input: &str) -> Statement {
        let mut program = parse(input);
        assert_eq!(program.statements.len(), 1, "{input}");
        program.statements.remove(0)
    }

    #[test]
    fn test_simple_command() {
        let Statement::Command(cmd) = single("echo hello world") else {
            panic!("expected command");
        };
        assert_eq!(cmd.name, Some(Word::literal("echo")));
        assert_eq!(cmd.args.len(), 2);
    }

    #[test]
    fn test_assignments_and_redirects() {
        let Statement::Command(cmd) = single("A=1 B+=x arr[2]=y cmd >out 2>&1") else {
            panic!("expected command");
        };
        assert_eq!(cmd.assignments.len(), 3);
        assert!(cmd.assignments[1].append);
        assert_eq!(cmd.assignments[2].index.as_deref(), Some("2"));
        assert_eq!(cmd.redirects.len(), 2);
        assert_eq!(cmd.redirects[1].kind, RedirectKind::DupOutput);
        assert_eq!(cmd.redirects[1].effective_fd(), 2);
    }

    #[test]
    fn test_array_literal() {
        let Statement::Command(cmd) = single("m=([a]=1 [b]='x y' plain)") else {
            panic!("expected command");
        };
        let AssignmentValue::Array(elements) = &cmd.assignments[0].value else {
            panic!("expected array");
        };
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].key.as_deref(), Some("a"));
        assert_eq!(elements[2].key, None);
    }

    #[test]
    fn test_declaration_arguments() {
        let Statement::Command(cmd) = single("local -a xs=(1 \"2 3\") plain y=1") else {
            panic!("expected command");
        };
        assert_eq!(cmd.args.len(), 4);
        let positions: Vec<usize> = cmd.declarations.iter().map(|(i, _)| *i).collect();
        assert_eq!(positions, vec![1, 3]);
        assert!(matches!(cmd.declarations[0].1.value, AssignmentValue::Array(_)));

        let Statement::Command(cmd) = single("echo y=1") else {
            panic!("expected command");
        };
        assert!(cmd.declarations.is_empty());
    }

    #[test]
    fn test_pipeline_and_list() {
        let Statement::AndOr(list) = single("! a | b && c || d") else {
            panic!("expected and-or list");
        };
        let Statement::Pipeline(pipeline) = list.first.as_ref() else {
            panic!("expected pipeline");
        };
        assert!(pipeline.negated);
        assert_eq!(pipeline.commands.len(), 2);
        assert_eq!(list.rest.len(), 2);
        assert_eq!(list.rest[1].0, AndOrOp::Or);
    }

    #[test]
    fn test_if_elif_else() {
        let Statement::If(stmt) =
            single("if a; then b; elif c; then d; else e; fi")
        else {
            panic!("expected if");
        };
        assert_eq!(stmt.condition.len(), 1);
        assert_eq!(stmt.elifs.len(), 1);
        assert!(stmt.alternative.is_some());
    }

    #[test]
    fn test_loops() {
        let Statement::For(stmt) = single("for i in 1 2 3; do echo $i; done") else {
            panic!("expected for");
        };
        assert_eq!(stmt.variable, "i");
        assert_eq!(stmt.items.as_ref().map(Vec::len), Some(3));

        let Statement::For(stmt) = single("for arg\ndo\n  echo $arg\ndone") else {
            panic!("expected for");
        };
        assert_eq!(stmt.items, None);

        let Statement::While(stmt) = single("until false; do break; done") else {
            panic!("expected while");
        };
        assert!(stmt.until);
        assert!(matches!(stmt.body[0], Statement::Break(_)));

        let Statement::ArithFor(stmt) = single("for ((i=0; i<3; i++)); do :; done") else {
            panic!("expected arithmetic for");
        };
        assert_eq!(stmt.condition, "i<3");
    }

    #[test]
    fn test_case() {
        let Statement::Case(stmt) =
            single("case $x in\n  a|b) echo ab ;;\n  (c) echo c ;&\n  *) echo other ;;&\nesac")
        else {
            panic!("expected case");
        };
        assert_eq!(stmt.clauses.len(), 3);
        assert_eq!(stmt.clauses[0].patterns.len(), 2);
        assert_eq!(stmt.clauses[1].terminator, CaseTerminator::FallThrough);
        assert_eq!(stmt.clauses[2].terminator, CaseTerminator::Continue);
    }

    #[test]
    fn test_case_last_clause_without_terminator() {
        let Statement::Case(stmt) = single("case x in x) echo hit\nesac") else {
            panic!("expected case");
        };
        assert_eq!(stmt.clauses[0].terminator, CaseTerminator::Break);
    }

    #[test]
    fn test_functions() {
        let program = parse("greet() { echo hi; }\nfunction bye { echo bye; }");
        assert!(matches!(&program.statements[0], Statement::Function(f) if f.name == "greet"));
        assert!(matches!(&program.statements[1], Statement::Function(f) if f.name == "bye"));
    }

    #[test]
    fn test_background_keeps_source_text() {
        let program = parse("sleep 1 &\necho done");
        let Statement::Background(bg) = &program.statements[0] else {
            panic!("expected background");
        };
        assert_eq!(bg.command_line, "sleep 1");
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_background_followed_by_command() {
        let program = parse("a & b");
        assert_eq!(program.statements.len(), 2);
        assert!(matches!(program.statements[1], Statement::Command(_)));
    }

    #[test]
    fn test_compound_redirect() {
        let Statement::Redirected(stmt) = single("while read l; do echo $l; done < input") else {
            panic!("expected redirected statement");
        };
        assert!(matches!(*stmt.body, Statement::While(_)));
        assert_eq!(stmt.redirects[0].kind, RedirectKind::Input);
    }

    #[test]
    fn test_subshell_and_block() {
        assert!(matches!(single("(cd /tmp; pwd)"), Statement::Subshell(_)));
        assert!(matches!(single("{ a; b; }"), Statement::Block(b) if b.statements.len() == 2));
    }

    #[test]
    fn test_heredoc_redirect() {
        let Statement::Command(cmd) = single("cat <<EOF\nhello $name\nEOF") else {
            panic!("expected command");
        };
        let heredoc = cmd.redirects[0].heredoc.as_ref().unwrap();
        assert_eq!(heredoc.body, "hello $name\n");
        assert!(!heredoc.quoted);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(Parser::new("if true; then").parse().is_err());
        assert!(Parser::new("echo )").parse().is_err());
        assert!(Parser::new("| cat").parse().is_err());
        let err = Parser::new("for do").parse().unwrap_err();
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_reserved_words_as_arguments() {
        let Statement::Command(cmd) = single("echo if then fi") else {
            panic!("expected command");
        };
        assert_eq!(cmd.args.len(), 3);
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("_foo1"));
        assert!(!is_valid_name("1foo"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a-b"));
    }
}
