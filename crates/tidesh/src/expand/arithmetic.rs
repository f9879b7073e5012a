//! Arithmetic evaluation for `$(( ))`, `(( ))`, `let`-style contexts
//!
//! Expressions are tokenized, parsed by recursive descent into a small tree
//! and then evaluated, so that `&&`, `||` and `?:` only run the side effects
//! of the branch they take. All arithmetic is wrapping `i64`.
//!
//! Precedence, lowest to highest:
//!
//! ```text
//! ,  =  +=  -= ...  ?:  ||  &&  == != < <= > >=  |  ^  &  << >>  + -  * / %  **  unary  postfix
//! ```
//!
//! Comparison operators sit below the bitwise operators, so `1 | 2 == 3`
//! parses as `(1 | 2) == 3`.

use thiserror::Error;

/// Maximum nesting when a variable's value is itself an expression.
const MAX_VARIABLE_DEPTH: usize = 64;

/// Arithmetic failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by 0")]
    DivisionByZero,

    #[error("exponent less than 0")]
    NegativeExponent,

    #[error("{expression}: syntax error: {message}")]
    Syntax { expression: String, message: String },

    #[error("{0}: unknown arithmetic function")]
    UnknownFunction(String),

    #[error("{0}: value too great for base")]
    InvalidNumber(String),

    #[error("{0}: attempted assignment to non-variable")]
    NotAssignable(String),

    #[error("{0}: expression recursion level exceeded")]
    Recursion(String),
}

type Result<T> = std::result::Result<T, ArithmeticError>;

/// Variable access used by the evaluator.
pub trait ArithmeticContext {
    /// Value of a scalar variable (or element 0 of an array).
    fn get_var(&self, name: &str) -> Option<String>;
    /// Assign a scalar variable.
    fn set_var(&mut self, name: &str, value: String);
    /// Value of `name[index]`.
    fn get_element(&self, name: &str, index: i64) -> Option<String>;
    /// Assign `name[index]`.
    fn set_element(&mut self, name: &str, index: i64, value: String);
    /// Next pseudo-random number in `0..=32767`.
    fn random(&mut self) -> i64;
    /// Reseed the generator.
    fn seed_random(&mut self, seed: u64);
}

/// Evaluate an expression string. An empty expression is `0`.
pub fn evaluate(expression: &str, ctx: &mut dyn ArithmeticContext) -> Result<i64> {
    evaluate_at_depth(expression, ctx, 0)
}

fn evaluate_at_depth(expression: &str, ctx: &mut dyn ArithmeticContext, depth: usize) -> Result<i64> {
    if expression.trim().is_empty() {
        return Ok(0);
    }
    let tokens = tokenize(expression)?;
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        source: expression,
    };
    let expr = parser.parse_comma()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.syntax_error("unexpected token"));
    }
    Evaluator { ctx, depth }.eval(&expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(i64),
    Ident(String),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Question,
    Colon,
}

const OPERATORS: &[&str] = &[
    "<<=", ">>=", "**", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "++", "--", "+=", "-=",
    "*=", "/=", "%=", "&=", "^=", "|=", "+", "-", "*", "/", "%", "<", ">", "=", "!", "~", "&",
    "|", "^",
];

fn tokenize(expression: &str) -> Result<Vec<Tok>> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => tokens.push(Tok::LParen),
            ')' => tokens.push(Tok::RParen),
            '[' => tokens.push(Tok::LBracket),
            ']' => tokens.push(Tok::RBracket),
            ',' => tokens.push(Tok::Comma),
            '?' => tokens.push(Tok::Question),
            ':' => tokens.push(Tok::Colon),
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| ArithmeticError::Syntax {
                        expression: expression.to_string(),
                        message: "unterminated string".to_string(),
                    })?;
                tokens.push(Tok::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
                continue;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '#' | '@'))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if c.is_ascii_digit() {
                    tokens.push(Tok::Num(parse_number(&text)?));
                } else {
                    tokens.push(Tok::Ident(text));
                }
                continue;
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
                    return Err(ArithmeticError::Syntax {
                        expression: expression.to_string(),
                        message: format!("invalid arithmetic operator (error token is \"{c}\")"),
                    });
                };
                tokens.push(Tok::Op(*op));
                i += op.chars().count();
                continue;
            }
        }
        i += 1;
    }
    Ok(tokens)
}

/// Parse an integer literal: decimal, `0x` hex, leading-zero octal, or
/// `base#digits` with bases 2 through 64.
pub fn parse_number(text: &str) -> Result<i64> {
    let invalid = || ArithmeticError::InvalidNumber(text.to_string());

    if let Some((base, digits)) = text.split_once('#') {
        let base: u32 = base.parse().map_err(|_| invalid())?;
        if !(2..=64).contains(&base) || digits.is_empty() {
            return Err(invalid());
        }
        let mut value: i64 = 0;
        for ch in digits.chars() {
            let digit = match ch {
                '0'..='9' => ch as u32 - '0' as u32,
                'a'..='z' => ch as u32 - 'a' as u32 + 10,
                'A'..='Z' if base <= 36 => ch as u32 - 'A' as u32 + 10,
                'A'..='Z' => ch as u32 - 'A' as u32 + 36,
                '@' => 62,
                '_' => 63,
                _ => return Err(invalid()),
            };
            if digit >= base {
                return Err(invalid());
            }
            value = value.wrapping_mul(base as i64).wrapping_add(digit as i64);
        }
        return Ok(value);
    }

    let (digits, radix) = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };
    u64::from_str_radix(digits, radix)
        .map(|v| v as i64)
        .map_err(|_| invalid())
}

#[derive(Debug, Clone)]
enum Expr {
    Num(i64),
    Str(String),
    Var(String),
    Element(String, Box<Expr>),
    Unary(&'static str, Box<Expr>),
    /// `++x` / `--x` (prefix) and `x++` / `x--` (postfix)
    Step {
        target: Box<Expr>,
        delta: i64,
        prefix: bool,
    },
    Binary(&'static str, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Plain or compound assignment; `op` is the binary operator for `+=` etc.
    Assign {
        target: Box<Expr>,
        op: Option<&'static str>,
        value: Box<Expr>,
    },
    Comma(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct ExprParser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    source: &'a str,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Tok::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn syntax_error(&self, message: &str) -> ArithmeticError {
        let detail = match self.peek() {
            Some(tok) => format!("{message} (error token is \"{}\")", describe(tok)),
            None => message.to_string(),
        };
        ArithmeticError::Syntax {
            expression: self.source.trim().to_string(),
            message: detail,
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<()> {
        if self.peek() == Some(&tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.syntax_error(&format!("expected `{}'", describe(&tok))))
        }
    }

    fn parse_comma(&mut self) -> Result<Expr> {
        let mut left = self.parse_assignment()?;
        while self.peek() == Some(&Tok::Comma) {
            self.pos += 1;
            let right = self.parse_assignment()?;
            left = Expr::Comma(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let left = self.parse_ternary()?;
        let op = match self.peek_op() {
            Some("=") => None,
            Some("+=") => Some("+"),
            Some("-=") => Some("-"),
            Some("*=") => Some("*"),
            Some("/=") => Some("/"),
            Some("%=") => Some("%"),
            Some("<<=") => Some("<<"),
            Some(">>=") => Some(">>"),
            Some("&=") => Some("&"),
            Some("^=") => Some("^"),
            Some("|=") => Some("|"),
            _ => return Ok(left),
        };
        if !matches!(left, Expr::Var(_) | Expr::Element(..)) {
            return Err(ArithmeticError::NotAssignable(self.source.trim().to_string()));
        }
        self.pos += 1;
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            target: Box::new(left),
            op,
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let cond = self.parse_or()?;
        if self.peek() != Some(&Tok::Question) {
            return Ok(cond);
        }
        self.pos += 1;
        let then = self.parse_comma()?;
        self.expect(Tok::Colon)?;
        let otherwise = self.parse_ternary()?;
        Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_op() == Some("||") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        while self.peek_op() == Some("&&") {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        self.parse_binary_level(&["==", "!=", "<", "<=", ">", ">="], Self::parse_bit_or)
    }

    fn parse_bit_or(&mut self) -> Result<Expr> {
        self.parse_binary_level(&["|"], Self::parse_bit_xor)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr> {
        self.parse_binary_level(&["^"], Self::parse_bit_and)
    }

    fn parse_bit_and(&mut self) -> Result<Expr> {
        self.parse_binary_level(&["&"], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        self.parse_binary_level(&["<<", ">>"], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        self.parse_binary_level(&["+", "-"], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        self.parse_binary_level(&["*", "/", "%"], Self::parse_power)
    }

    /// Left-associative level made of `ops` over `next`.
    fn parse_binary_level(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        while let Some(op) = self.peek_op().filter(|op| ops.contains(op)) {
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// `**` is right-associative.
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_unary()?;
        if self.peek_op() == Some("**") {
            self.pos += 1;
            let exponent = self.parse_power()?;
            return Ok(Expr::Binary("**", Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek_op() {
            Some(op @ ("+" | "-" | "~" | "!")) => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(op, Box::new(operand)))
            }
            Some(op @ ("++" | "--")) => {
                self.pos += 1;
                let target = self.parse_unary()?;
                if !matches!(target, Expr::Var(_) | Expr::Element(..)) {
                    return Err(ArithmeticError::NotAssignable(self.source.trim().to_string()));
                }
                Ok(Expr::Step {
                    target: Box::new(target),
                    delta: if op == "++" { 1 } else { -1 },
                    prefix: true,
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let expr = self.parse_primary()?;
        if matches!(expr, Expr::Var(_) | Expr::Element(..)) {
            if let Some(op @ ("++" | "--")) = self.peek_op() {
                self.pos += 1;
                return Ok(Expr::Step {
                    target: Box::new(expr),
                    delta: if op == "++" { 1 } else { -1 },
                    prefix: false,
                });
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Tok::Num(n)) => Ok(Expr::Num(n)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::LParen) => {
                let inner = self.parse_comma()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) => match self.peek() {
                Some(Tok::LParen) => {
                    self.pos += 1;
                    self.parse_call(name)
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_comma()?;
                    self.expect(Tok::RBracket)?;
                    Ok(Expr::Element(name, Box::new(index)))
                }
                _ => Ok(Expr::Var(name)),
            },
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.syntax_error("operand expected"))
            }
        }
    }

    /// Arguments after `name(`. `substr` and `index` take their string
    /// arguments raw: a quoted token or a variable name is passed through
    /// unevaluated.
    fn parse_call(&mut self, name: String) -> Result<Expr> {
        let mut args = Vec::new();
        if self.peek() == Some(&Tok::RParen) {
            self.pos += 1;
            return Ok(Expr::Call(name, args));
        }
        let string_aware = matches!(name.as_str(), "substr" | "index");
        loop {
            let position = args.len();
            let raw_string = string_aware && (position == 0 || (name == "index" && position == 1));
            let arg = if raw_string {
                match (self.peek().cloned(), self.tokens.get(self.pos + 1)) {
                    (Some(Tok::Str(s)), _) => {
                        self.pos += 1;
                        Expr::Str(s)
                    }
                    (Some(Tok::Ident(v)), Some(Tok::Comma | Tok::RParen)) => {
                        self.pos += 1;
                        Expr::Var(v)
                    }
                    _ => self.parse_assignment()?,
                }
            } else {
                self.parse_assignment()?
            };
            args.push(arg);
            match self.next() {
                Some(Tok::Comma) => continue,
                Some(Tok::RParen) => break,
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.syntax_error("expected `)'"));
                }
            }
        }
        Ok(Expr::Call(name, args))
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Num(n) => n.to_string(),
        Tok::Ident(s) => s.clone(),
        Tok::Str(s) => format!("\"{s}\""),
        Tok::Op(op) => (*op).to_string(),
        Tok::LParen => "(".to_string(),
        Tok::RParen => ")".to_string(),
        Tok::LBracket => "[".to_string(),
        Tok::RBracket => "]".to_string(),
        Tok::Comma => ",".to_string(),
        Tok::Question => "?".to_string(),
        Tok::Colon => ":".to_string(),
    }
}

struct Evaluator<'c> {
    ctx: &'c mut dyn ArithmeticContext,
    depth: usize,
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<i64> {
        match expr {
            Expr::Num(n) => Ok(*n),
            Expr::Str(s) => self.value_of_text(s, s),
            Expr::Var(name) => match self.ctx.get_var(name) {
                Some(value) => self.value_of_text(name, &value),
                None => Ok(0),
            },
            Expr::Element(name, index) => {
                let index = self.eval(index)?;
                match self.ctx.get_element(name, index) {
                    Some(value) => self.value_of_text(name, &value),
                    None => Ok(0),
                }
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                Ok(match *op {
                    "-" => v.wrapping_neg(),
                    "~" => !v,
                    "!" => i64::from(v == 0),
                    _ => v,
                })
            }
            Expr::Step {
                target,
                delta,
                prefix,
            } => {
                let old = self.eval(target)?;
                let new = old.wrapping_add(*delta);
                self.store(target, new)?;
                Ok(if *prefix { new } else { old })
            }
            Expr::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                apply_binary(op, l, r)
            }
            Expr::And(left, right) => {
                if self.eval(left)? == 0 {
                    return Ok(0);
                }
                Ok(i64::from(self.eval(right)? != 0))
            }
            Expr::Or(left, right) => {
                if self.eval(left)? != 0 {
                    return Ok(1);
                }
                Ok(i64::from(self.eval(right)? != 0))
            }
            Expr::Ternary(cond, then, otherwise) => {
                if self.eval(cond)? != 0 {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign { target, op, value } => {
                let rhs = self.eval(value)?;
                let result = match op {
                    Some(op) => {
                        let current = self.eval(target)?;
                        apply_binary(op, current, rhs)?
                    }
                    None => rhs,
                };
                self.store(target, result)?;
                Ok(result)
            }
            Expr::Comma(left, right) => {
                self.eval(left)?;
                self.eval(right)
            }
            Expr::Call(name, args) => self.call(name, args),
        }
    }

    /// A variable's text is itself an expression (`a=b+1; b=2; $((a))` is 3).
    fn value_of_text(&mut self, name: &str, text: &str) -> Result<i64> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Ok(n);
        }
        if self.depth >= MAX_VARIABLE_DEPTH {
            return Err(ArithmeticError::Recursion(name.to_string()));
        }
        evaluate_at_depth(trimmed, self.ctx, self.depth + 1)
    }

    fn store(&mut self, target: &Expr, value: i64) -> Result<()> {
        match target {
            Expr::Var(name) => {
                self.ctx.set_var(name, value.to_string());
                Ok(())
            }
            Expr::Element(name, index) => {
                let index = self.eval(index)?;
                self.ctx.set_element(name, index, value.to_string());
                Ok(())
            }
            _ => Err(ArithmeticError::NotAssignable(String::new())),
        }
    }

    /// Raw text of a string-aware argument.
    fn text_arg(&mut self, arg: &Expr) -> Result<String> {
        match arg {
            Expr::Str(s) => Ok(s.clone()),
            Expr::Var(name) => Ok(self.ctx.get_var(name).unwrap_or_default()),
            other => Ok(self.eval(other)?.to_string()),
        }
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<i64> {
        let arity = |min: usize, max: usize| -> Result<()> {
            if args.len() < min || args.len() > max {
                Err(ArithmeticError::Syntax {
                    expression: name.to_string(),
                    message: format!("wrong number of arguments ({})", args.len()),
                })
            } else {
                Ok(())
            }
        };

        match name {
            "abs" => {
                arity(1, 1)?;
                Ok(self.eval(&args[0])?.wrapping_abs())
            }
            "int" => {
                arity(1, 1)?;
                self.eval(&args[0])
            }
            "min" | "max" => {
                arity(1, usize::MAX)?;
                let mut best = self.eval(&args[0])?;
                for arg in &args[1..] {
                    let v = self.eval(arg)?;
                    best = if name == "min" { best.min(v) } else { best.max(v) };
                }
                Ok(best)
            }
            "length" => {
                arity(1, 1)?;
                let v = self.eval(&args[0])?;
                Ok(v.unsigned_abs().to_string().len() as i64)
            }
            "rand" => {
                arity(0, 0)?;
                Ok(self.ctx.random())
            }
            "srand" => {
                arity(1, 1)?;
                let seed = self.eval(&args[0])?;
                self.ctx.seed_random(seed as u64);
                Ok(seed)
            }
            "substr" => {
                arity(2, 3)?;
                let text = self.text_arg(&args[0])?;
                let start = self.eval(&args[1])?;
                let length = match args.get(2) {
                    Some(arg) => Some(self.eval(arg)?),
                    None => None,
                };
                let piece = awk_substr(&text, start, length);
                Ok(piece.trim().parse::<i64>().unwrap_or(0))
            }
            "index" => {
                arity(2, 2)?;
                let haystack = self.text_arg(&args[0])?;
                let needle = self.text_arg(&args[1])?;
                Ok(match haystack.find(&needle) {
                    Some(byte) => haystack[..byte].chars().count() as i64 + 1,
                    None => 0,
                })
            }
            _ => Err(ArithmeticError::UnknownFunction(name.to_string())),
        }
    }
}

/// awk-style `substr`: 1-based start, optional length, clamped to the text.
fn awk_substr(text: &str, start: i64, length: Option<i64>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len() as i64;
    let first = start.max(1);
    let last = match length {
        Some(n) => start.saturating_add(n).min(len + 1),
        None => len + 1,
    };
    if first >= last {
        return String::new();
    }
    chars[(first - 1) as usize..(last - 1) as usize].iter().collect()
}

fn apply_binary(op: &str, l: i64, r: i64) -> Result<i64> {
    Ok(match op {
        "+" => l.wrapping_add(r),
        "-" => l.wrapping_sub(r),
        "*" => l.wrapping_mul(r),
        "/" => {
            if r == 0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            l.wrapping_div(r)
        }
        "%" => {
            if r == 0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            l.wrapping_rem(r)
        }
        "**" => {
            if r < 0 {
                return Err(ArithmeticError::NegativeExponent);
            }
            let mut result: i64 = 1;
            let mut base = l;
            let mut exp = r as u64;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            result
        }
        "<<" => l.wrapping_shl((r & 63) as u32),
        ">>" => l.wrapping_shr((r & 63) as u32),
        "&" => l & r,
        "|" => l | r,
        "^" => l ^ r,
        "==" => i64::from(l == r),
        "!=" => i64::from(l != r),
        "<" => i64::from(l < r),
        "<=" => i64::from(l <= r),
        ">" => i64::from(l > r),
        ">=" => i64::from(l >= r),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Vars {
        scalars: HashMap<String, String>,
        arrays: HashMap<String, HashMap<i64, String>>,
        next_random: i64,
        seed: Option<u64>,
    }

    impl ArithmeticContext for Vars {
        fn get_var(&self, name: &str) -> Option<String> {
            self.scalars.get(name).cloned()
        }
        fn set_var(&mut self, name: &str, value: String) {
            self.scalars.insert(name.to_string(), value);
        }
        fn get_element(&self, name: &str, index: i64) -> Option<String> {
            self.arrays.get(name)?.get(&index).cloned()
        }
        fn set_element(&mut self, name: &str, index: i64, value: String) {
            self.arrays
                .entry(name.to_string())
                .or_default()
                .insert(index, value);
        }
        fn random(&mut self) -> i64 {
            self.next_random += 1;
            self.next_random
        }
        fn seed_random(&mut self, seed: u64) {
            self.seed = Some(seed);
        }
    }

    fn eval(expr: &str) -> i64 {
        evaluate(expr, &mut Vars::default()).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), 7);
        assert_eq!(eval("(1 + 2) * 3"), 9);
        assert_eq!(eval("2 ** 10"), 1024);
        assert_eq!(eval("2 ** 3 ** 2"), 512);
        assert_eq!(eval("10 - 4 - 3"), 3);
        assert_eq!(eval("-2 ** 2"), 4);
        assert_eq!(eval("1 << 4 + 1"), 32);
        assert_eq!(eval("7 & 3 == 3"), 1);
        assert_eq!(eval("1 | 2 == 3"), 1);
    }

    #[test]
    fn test_division_by_zero() {
        let mut vars = Vars::default();
        assert_eq!(evaluate("1 / 0", &mut vars), Err(ArithmeticError::DivisionByZero));
        assert_eq!(evaluate("5 % 0", &mut vars), Err(ArithmeticError::DivisionByZero));
        assert_eq!(
            evaluate("2 ** -1", &mut vars),
            Err(ArithmeticError::NegativeExponent)
        );
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(eval("3 > 2 && 2 > 1"), 1);
        assert_eq!(eval("0 || 0"), 0);
        assert_eq!(eval("!5"), 0);
        assert_eq!(eval("~0"), -1);
        assert_eq!(eval("5 >= 5"), 1);
        assert_eq!(eval("1 ? 10 : 20"), 10);
        assert_eq!(eval("0 ? 10 : 0 ? 20 : 30"), 30);
    }

    #[test]
    fn test_short_circuit_skips_side_effects() {
        let mut vars = Vars::default();
        evaluate("0 && (x = 5)", &mut vars).unwrap();
        assert_eq!(vars.get_var("x"), None);
        evaluate("1 || (y = 5)", &mut vars).unwrap();
        assert_eq!(vars.get_var("y"), None);
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("0x1F"), 31);
        assert_eq!(eval("010"), 8);
        assert_eq!(eval("2#1010"), 10);
        assert_eq!(eval("16#ff"), 255);
        assert!(evaluate("08", &mut Vars::default()).is_err());
        assert!(evaluate("2#102", &mut Vars::default()).is_err());
    }

    #[test]
    fn test_variables() {
        let mut vars = Vars::default();
        vars.set_var("x", "5".to_string());
        vars.set_var("expr", "x * 2".to_string());
        assert_eq!(evaluate("x + 1", &mut vars).unwrap(), 6);
        assert_eq!(evaluate("expr + 1", &mut vars).unwrap(), 11);
        assert_eq!(evaluate("missing + 1", &mut vars).unwrap(), 1);
    }

    #[test]
    fn test_self_referencing_variable_is_bounded() {
        let mut vars = Vars::default();
        vars.set_var("a", "a + 1".to_string());
        assert!(matches!(
            evaluate("a", &mut vars),
            Err(ArithmeticError::Recursion(_))
        ));
    }

    #[test]
    fn test_assignment_and_steps() {
        let mut vars = Vars::default();
        assert_eq!(evaluate("x = 3", &mut vars).unwrap(), 3);
        assert_eq!(evaluate("x += 4", &mut vars).unwrap(), 7);
        assert_eq!(evaluate("x++", &mut vars).unwrap(), 7);
        assert_eq!(vars.get_var("x").as_deref(), Some("8"));
        assert_eq!(evaluate("--x", &mut vars).unwrap(), 7);
        assert_eq!(evaluate("x <<= 1", &mut vars).unwrap(), 14);
        assert_eq!(evaluate("a = b = 2, a + b", &mut vars).unwrap(), 4);
        assert!(matches!(
            evaluate("1 = 2", &mut vars),
            Err(ArithmeticError::NotAssignable(_))
        ));
    }

    #[test]
    fn test_array_elements() {
        let mut vars = Vars::default();
        evaluate("arr[1] = 4, arr[2] = arr[1] * 2", &mut vars).unwrap();
        assert_eq!(evaluate("arr[2]", &mut vars).unwrap(), 8);
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("abs(-5)"), 5);
        assert_eq!(eval("min(4, 2, 8)"), 2);
        assert_eq!(eval("max(4, 2, 8)"), 8);
        assert_eq!(eval("length(12345)"), 5);
        assert_eq!(eval("length(-12)"), 2);
        assert_eq!(eval("int(7)"), 7);
        assert_eq!(eval("substr(\"12345\", 2, 3)"), 234);
        assert_eq!(eval("index(\"hello\", \"ll\")"), 3);
        assert_eq!(eval("index(\"hello\", \"z\")"), 0);
    }

    #[test]
    fn test_string_functions_read_variables_raw() {
        let mut vars = Vars::default();
        vars.set_var("s", "98765".to_string());
        vars.set_var("needle", "76".to_string());
        assert_eq!(evaluate("substr(s, 1, 2)", &mut vars).unwrap(), 98);
        assert_eq!(evaluate("index(s, needle)", &mut vars).unwrap(), 3);
    }

    #[test]
    fn test_rand_and_srand() {
        let mut vars = Vars::default();
        assert_eq!(evaluate("srand(42)", &mut vars).unwrap(), 42);
        assert_eq!(vars.seed, Some(42));
        assert_eq!(evaluate("rand()", &mut vars).unwrap(), 1);
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            evaluate("frob(1)", &mut Vars::default()),
            Err(ArithmeticError::UnknownFunction("frob".to_string()))
        );
    }

    #[test]
    fn test_syntax_errors() {
        let mut vars = Vars::default();
        assert!(matches!(evaluate("1 +", &mut vars), Err(ArithmeticError::Syntax { .. })));
        assert!(matches!(evaluate("(1", &mut vars), Err(ArithmeticError::Syntax { .. })));
        assert!(matches!(evaluate("1 2", &mut vars), Err(ArithmeticError::Syntax { .. })));
        assert!(matches!(evaluate("1 $ 2", &mut vars), Err(ArithmeticError::Syntax { .. })));
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(eval(""), 0);
        assert_eq!(eval("   "), 0);
    }

    #[test]
    fn test_wrapping_overflow() {
        assert_eq!(eval("9223372036854775807 + 1"), i64::MIN);
    }
}
