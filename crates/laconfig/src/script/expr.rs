//! expressions used by `_set`, `_if` and `_loop`
//!
//! Operands are numbers (`10`, `0.25`), booleans (`true`, `false`), bare words (`kozel`) and quoted strings.
//! Operators by increasing precedence:
//!
//! | operators             |                                                   |
//! |-----------------------|---------------------------------------------------|
//! | `\|\|`                | logical or                                        |
//! | `&&`                  | logical and                                       |
//! | `==` `!=`             | equality, numeric when both sides are numbers     |
//! | `<` `<=` `>` `>=`     | ordering, numbers only                            |
//! | `+` `-`               | `+` concatenates when one side is not a number    |
//! | `*` `/` `%`           |                                                   |
//! | `!` `-`               | unary                                             |
//!
//! `(?cond;then;else)` picks one of two expressions, only the picked one is evaluated.
//!
//! Integer arithmetic stays integer unless a division is not exact, mixing integers and floats gives a float. Floats
//! print with at most 15 significant digits.
//!
//! With [evaluate_with] an operand may contain `$(...)` markers (`$(/$i)`, `item_$(/$i)`). The whole operand is
//! expanded by the caller and its text classified like a literal, so `my-service` stays one string.
use crate::vars::marker_end;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    /// Interpret a literal the way an operand in an expression would be
    pub fn from_literal(text: &str) -> Value {
        let looks_numeric = text
            .strip_prefix('-')
            .unwrap_or(text)
            .starts_with(|c: char| c.is_ascii_digit());
        if looks_numeric {
            if let Ok(int) = text.parse() {
                return Value::Int(int);
            }
            if let Ok(float) = text.parse() {
                return Value::Float(float);
            }
        }
        if text.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        Value::Str(text.to_string())
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(int) => Some(*int as f64),
            Value::Float(float) => Some(*float),
            _ => None,
        }
    }

    fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Condition value, numbers are true when not zero
    pub fn truthy(&self) -> Result<bool, ExprError> {
        match self {
            Value::Bool(flag) => Ok(*flag),
            Value::Int(int) => Ok(*int != 0),
            Value::Float(float) => Ok(*float != 0.0),
            Value::Str(text) => Err(ExprError::NotBoolean(text.clone())),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(int) => write!(f, "{int}"),
            Value::Float(float) => {
                // round to 15 significant digits, drops noise like 0.6000000000000001
                let rounded: f64 = format!("{float:.14e}").parse().unwrap_or(*float);
                write!(f, "{rounded}")
            }
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::Str(text) => f.write_str(text),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("operator '{operator}' can not be applied to '{left}' and '{right}'")]
    Operands {
        operator: &'static str,
        left: String,
        right: String,
    },

    #[error("'{0}' is not a condition")]
    NotBoolean(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,
}

/// Expands the markers of one operand
pub type Expand<'a, E> = dyn FnMut(&str) -> Result<String, E> + 'a;

/// Parse and evaluate `text`, markers are taken as they are
pub fn evaluate(text: &str) -> Result<Value, ExprError> {
    evaluate_with::<ExprError>(text, &mut |operand: &str| Ok(operand.to_string()))
}

/// Evaluate `text` as a condition
pub fn condition(text: &str) -> Result<bool, ExprError> {
    evaluate(text)?.truthy()
}

/// Parse and evaluate `text`, operands with markers go through `expand`
///
/// An empty expression is the empty string.
pub fn evaluate_with<E>(text: &str, expand: &mut Expand<'_, E>) -> Result<Value, E>
where
    E: From<ExprError>,
{
    if text.trim().is_empty() {
        return Ok(Value::Str(String::new()));
    }
    parse(text)?.eval(expand)
}

/// Condition variant of [evaluate_with]
pub fn condition_with<E>(text: &str, expand: &mut Expand<'_, E>) -> Result<bool, E>
where
    E: From<ExprError>,
{
    Ok(evaluate_with(text, expand)?.truthy()?)
}

fn parse(text: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser {
        lexer: Lexer { text, pos: 0 },
    };
    let expr = parser.or()?;
    if let Some((token, at)) = parser.lexer.next()? {
        return Err(ExprError::Syntax {
            position: at,
            message: format!("unexpected {}", token.describe()),
        });
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(String),
    Word(String),
    /// operand containing markers
    Template(String),
    Quoted(String),
    Op(&'static str),
    Open,
    Close,
    Question,
    Semicolon,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(text) | Token::Word(text) | Token::Template(text) => format!("'{text}'"),
            Token::Quoted(text) => format!("string '{text}'"),
            Token::Op(op) => format!("'{op}'"),
            Token::Open => "'('".to_string(),
            Token::Close => "')'".to_string(),
            Token::Question => "'?'".to_string(),
            Token::Semicolon => "';'".to_string(),
        }
    }
}

const OPERATORS: [&str; 15] = [
    "<=", ">=", "==", "!=", "&&", "||", "<", ">", "!", "+", "-", "*", "/", "%", "=",
];

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl Lexer<'_> {
    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn syntax(&self, position: usize, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Length of the operand starting at `rest` when it contains a marker
    fn template_len(&self, at: usize) -> Result<Option<usize>, ExprError> {
        let rest = &self.text[at..];
        let mut len = 0;
        let mut has_marker = false;

        loop {
            let tail = &rest[len..];
            if let Some(inner) = tail.strip_prefix("$(") {
                let Some(end) = marker_end(inner) else {
                    return Err(self.syntax(at + len, "unterminated marker"));
                };
                len += 2 + end + 1;
                has_marker = true;
                continue;
            }
            match tail.chars().next() {
                Some(c) if c.is_alphanumeric() || matches!(c, '_' | '.') => len += c.len_utf8(),
                _ => break,
            }
        }

        Ok(has_marker.then_some(len))
    }

    fn peek(&mut self) -> Result<Option<Token>, ExprError> {
        let pos = self.pos;
        let token = self.next()?.map(|(token, _)| token);
        self.pos = pos;
        Ok(token)
    }

    fn next(&mut self) -> Result<Option<(Token, usize)>, ExprError> {
        let skipped = self.rest().len() - self.rest().trim_start().len();
        self.pos += skipped;
        let at = self.pos;
        let text = self.text;
        let rest = &text[at..];

        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        if first == '$' || first.is_alphanumeric() || first == '_' {
            if let Some(len) = self.template_len(at)? {
                self.pos += len;
                return Ok(Some((Token::Template(rest[..len].to_string()), at)));
            }
        }

        let token = match first {
            '(' => Token::Open,
            ')' => Token::Close,
            '?' => Token::Question,
            ';' => Token::Semicolon,
            '"' | '\'' => {
                let Some(len) = rest[1..].find(first) else {
                    return Err(self.syntax(at, "unterminated string"));
                };
                self.pos += len + 2;
                return Ok(Some((Token::Quoted(rest[1..=len].to_string()), at)));
            }
            c if c.is_ascii_digit() => {
                let len = rest
                    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                    .unwrap_or(rest.len());
                self.pos += len;
                return Ok(Some((Token::Number(rest[..len].to_string()), at)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = rest
                    .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '.')))
                    .unwrap_or(rest.len());
                self.pos += len;
                return Ok(Some((Token::Word(rest[..len].to_string()), at)));
            }
            _ => {
                let Some(op) = OPERATORS.into_iter().find(|op| rest.starts_with(op)) else {
                    return Err(self.syntax(at, format!("unexpected character '{first}'")));
                };
                if op == "=" {
                    return Err(self.syntax(at, "unexpected '=', use '==' to compare"));
                }
                self.pos += op.len();
                return Ok(Some((Token::Op(op), at)));
            }
        };

        self.pos += first.len_utf8();
        Ok(Some((token, at)))
    }
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Template(String),
    /// quoted string containing markers
    Text(String),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl Parser<'_> {
    fn eat_op(&mut self, ops: &[&'static str]) -> Result<Option<&'static str>, ExprError> {
        match self.lexer.peek()? {
            Some(Token::Op(op)) if ops.contains(&op) => {
                self.lexer.next()?;
                Ok(Some(op))
            }
            _ => Ok(None),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.lexer.next()? {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, at)) => Err(self.lexer.syntax(
                at,
                format!("{} expected, found {}", expected.describe(), token.describe()),
            )),
            None => Err(self.lexer.syntax(
                self.lexer.pos,
                format!("{} expected, found end of input", expected.describe()),
            )),
        }
    }

    /// left associative binary level
    fn binary(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut left = next(self)?;
        while let Some(op) = self.eat_op(ops)? {
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        self.binary(&["||"], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        self.binary(&["&&"], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        self.binary(&["==", "!="], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        self.binary(&["<", "<=", ">", ">="], Self::additive)
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        self.binary(&["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.binary(&["*", "/", "%"], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        match self.eat_op(&["!", "-"])? {
            Some(op) => Ok(Expr::Unary(op, Box::new(self.unary()?))),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let Some((token, at)) = self.lexer.next()? else {
            return Err(self
                .lexer
                .syntax(self.lexer.pos, "operand expected, found end of input"));
        };

        match token {
            Token::Number(text) => match Value::from_literal(&text) {
                Value::Str(_) => Err(self.lexer.syntax(at, format!("invalid number '{text}'"))),
                number => Ok(Expr::Literal(number)),
            },
            Token::Word(text) => Ok(Expr::Literal(Value::from_literal(&text))),
            Token::Template(text) => Ok(Expr::Template(text)),
            Token::Quoted(text) if text.contains("$(") => Ok(Expr::Text(text)),
            Token::Quoted(text) => Ok(Expr::Literal(Value::Str(text))),
            Token::Open if self.lexer.peek()? == Some(Token::Question) => {
                self.lexer.next()?;
                let cond = self.or()?;
                self.expect(Token::Semicolon)?;
                let then = self.or()?;
                self.expect(Token::Semicolon)?;
                let otherwise = self.or()?;
                self.expect(Token::Close)?;
                Ok(Expr::Ternary(
                    Box::new(cond),
                    Box::new(then),
                    Box::new(otherwise),
                ))
            }
            Token::Open => {
                let inner = self.or()?;
                self.expect(Token::Close)?;
                Ok(inner)
            }
            token => Err(self
                .lexer
                .syntax(at, format!("operand expected, found {}", token.describe()))),
        }
    }
}

impl Expr {
    fn eval<E: From<ExprError>>(&self, expand: &mut Expand<'_, E>) -> Result<Value, E> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Template(text) => Ok(Value::from_literal(&expand(text)?)),
            Expr::Text(text) => Ok(Value::Str(expand(text)?)),
            Expr::Ternary(cond, then, otherwise) => {
                if cond.eval(expand)?.truthy()? {
                    then.eval(expand)
                } else {
                    otherwise.eval(expand)
                }
            }
            Expr::Unary("!", operand) => Ok(Value::Bool(!operand.eval(expand)?.truthy()?)),
            Expr::Unary(op, operand) => Ok(negate(*op, operand.eval(expand)?)?),
            Expr::Binary("&&", left, right) => Ok(Value::Bool(
                left.eval(expand)?.truthy()? && right.eval(expand)?.truthy()?,
            )),
            Expr::Binary("||", left, right) => Ok(Value::Bool(
                left.eval(expand)?.truthy()? || right.eval(expand)?.truthy()?,
            )),
            Expr::Binary(op, left, right) => {
                let left = left.eval(expand)?;
                let right = right.eval(expand)?;
                Ok(binary(*op, left, right)?)
            }
        }
    }
}

fn negate(op: &'static str, operand: Value) -> Result<Value, ExprError> {
    match operand {
        Value::Int(int) => int.checked_neg().map(Value::Int).ok_or(ExprError::Overflow),
        Value::Float(float) => Ok(Value::Float(-float)),
        other => Err(ExprError::Operands {
            operator: op,
            left: String::new(),
            right: other.to_string(),
        }),
    }
}

fn binary(op: &'static str, left: Value, right: Value) -> Result<Value, ExprError> {
    let mismatch = |left: &Value, right: &Value| ExprError::Operands {
        operator: op,
        left: left.to_string(),
        right: right.to_string(),
    };

    match op {
        "+" if !(left.is_number() && right.is_number()) => Ok(Value::Str(format!("{left}{right}"))),
        "==" | "!=" => {
            let equal = match (left.as_float(), right.as_float()) {
                (Some(a), Some(b)) => a == b,
                _ => left.to_string() == right.to_string(),
            };
            Ok(Value::Bool(equal == (op == "==")))
        }
        "<" | "<=" | ">" | ">=" => {
            let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
                return Err(mismatch(&left, &right));
            };
            Ok(Value::Bool(match op {
                "<" => a < b,
                "<=" => a <= b,
                ">" => a > b,
                _ => a >= b,
            }))
        }
        _ => arithmetic(op, &left, &right).ok_or_else(|| mismatch(&left, &right))?,
    }
}

/// `None` when an operand is not a number
fn arithmetic(op: &'static str, left: &Value, right: &Value) -> Option<Result<Value, ExprError>> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let result = match op {
            "+" => a.checked_add(b),
            "-" => a.checked_sub(b),
            "*" => a.checked_mul(b),
            "/" | "%" if b == 0 => return Some(Err(ExprError::DivisionByZero)),
            "/" if a.checked_rem(b) != Some(0) => {
                return Some(Ok(Value::Float(a as f64 / b as f64)))
            }
            "/" => a.checked_div(b),
            _ => a.checked_rem(b),
        };
        return Some(result.map(Value::Int).ok_or(ExprError::Overflow));
    }

    let (a, b) = (left.as_float()?, right.as_float()?);
    Some(match op {
        "+" => Ok(Value::Float(a + b)),
        "-" => Ok(Value::Float(a - b)),
        "*" => Ok(Value::Float(a * b)),
        "/" | "%" if b == 0.0 => Err(ExprError::DivisionByZero),
        "/" => Ok(Value::Float(a / b)),
        _ => Ok(Value::Float(a % b)),
    })
}
