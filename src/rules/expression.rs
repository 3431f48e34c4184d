//! Metric extraction expressions.
//!
//! A small, side-effect-free expression language evaluated against the
//! fetched payload, which is bound to the name `r`.
//!
//! # Grammar
//! ```text
//! expr    := term (("+" | "-") term)*
//! term    := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | postfix
//! postfix := primary ("[" expr "]" | "." ident)*
//! primary := number | string | "r" | func "(" expr ("," expr)* ")" | "(" expr ")"
//! func    := float | int | abs | min | max | len
//! ```
//!
//! # Design Decisions
//! - Expressions are compiled once at configuration load
//! - There are no variables besides `r` and no way to call anything but
//!   the fixed builtins, so a configuration file cannot run code
//! - Numeric strings are accepted wherever a number is expected

use std::borrow::Cow;

use serde_json::Value;
use thiserror::Error;

/// Errors raised while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("value {0} is not numeric")]
    NotNumeric(String),

    #[error("result is not a finite number")]
    NonFinite,
}

impl ExpressionError {
    fn syntax(offset: usize, message: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Builtin {
    Float,
    Int,
    Abs,
    Min,
    Max,
    Len,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "float" => Some(Builtin::Float),
            "int" => Some(Builtin::Int),
            "abs" => Some(Builtin::Abs),
            "min" => Some(Builtin::Min),
            "max" => Some(Builtin::Max),
            "len" => Some(Builtin::Len),
            _ => None,
        }
    }

    fn accepts(&self, argc: usize) -> bool {
        match self {
            Builtin::Min | Builtin::Max => argc >= 1,
            _ => argc == 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Root,
    Number(f64),
    Text(String),
    Index(Box<Node>, Box<Node>),
    Field(Box<Node>, String),
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Builtin, Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Dot,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let single = match c {
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push((offset, token));
            i += 1;
            continue;
        }

        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
            // Only treat '.' as a decimal point when a digit follows.
            if i + 1 < chars.len() && chars[i].1 == '.' && chars[i + 1].1.is_ascii_digit() {
                i += 1;
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExpressionError::syntax(offset, format!("bad number '{}'", text)))?;
            tokens.push((offset, Token::Number(value)));
        } else if c == '\'' || c == '"' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(ExpressionError::syntax(offset, "unterminated string")),
                    Some((_, '\\')) => {
                        let (_, escaped) = chars
                            .get(i + 1)
                            .copied()
                            .ok_or_else(|| ExpressionError::syntax(offset, "unterminated string"))?;
                        text.push(escaped);
                        i += 2;
                    }
                    Some((_, ch)) if *ch == quote => {
                        i += 1;
                        break;
                    }
                    Some((_, ch)) => {
                        text.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push((offset, Token::Text(text)));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().map(|(_, c)| *c).collect();
            tokens.push((offset, Token::Ident(ident)));
        } else {
            return Err(ExpressionError::syntax(
                offset,
                format!("unexpected character '{}'", c),
            ));
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ExpressionError> {
        let offset = self.offset();
        match self.next() {
            Some(token) if token == expected => Ok(()),
            _ => Err(ExpressionError::syntax(offset, format!("expected {}", what))),
        }
    }

    fn expr(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(node),
            };
            self.pos += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => return Ok(node),
            };
            self.pos += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    node = Node::Index(Box::new(node), Box::new(index));
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    let offset = self.offset();
                    match self.next() {
                        Some(Token::Ident(name)) => node = Node::Field(Box::new(node), name),
                        _ => return Err(ExpressionError::syntax(offset, "expected field name after '.'")),
                    }
                }
                _ => return Ok(node),
            }
        }
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Number(n)) => Ok(Node::Number(n)),
            Some(Token::Text(s)) => Ok(Node::Text(s)),
            Some(Token::LParen) => {
                let node = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(node)
            }
            Some(Token::Ident(name)) if name == "r" => Ok(Node::Root),
            Some(Token::Ident(name)) => {
                let builtin = Builtin::lookup(&name).ok_or_else(|| {
                    ExpressionError::syntax(offset, format!("unknown name '{}'", name))
                })?;
                self.expect(Token::LParen, "'(' after function name")?;
                let mut args = vec![self.expr()?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    args.push(self.expr()?);
                }
                self.expect(Token::RParen, "')'")?;
                if !builtin.accepts(args.len()) {
                    return Err(ExpressionError::syntax(
                        offset,
                        format!("wrong number of arguments to '{}'", name),
                    ));
                }
                Ok(Node::Call(builtin, args))
            }
            Some(_) => Err(ExpressionError::syntax(offset, "unexpected token")),
            None => Err(ExpressionError::syntax(offset, "unexpected end of expression")),
        }
    }
}

/// Coerce a JSON value into a number.
pub fn to_number(value: &Value) -> Result<f64, ExpressionError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExpressionError::NotNumeric(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| ExpressionError::NotNumeric(format!("{:?}", s))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(ExpressionError::NotNumeric(other.to_string())),
    }
}

/// Render a JSON value as the text seen by pattern rules.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number<'a>(n: f64) -> Result<Cow<'a, Value>, ExpressionError> {
    serde_json::Number::from_f64(n)
        .map(|n| Cow::Owned(Value::Number(n)))
        .ok_or(ExpressionError::NonFinite)
}

/// A compiled extraction expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    ast: Node,
}

impl Expression {
    /// The expression that yields the whole payload.
    pub fn identity() -> Self {
        Self { ast: Node::Root }
    }

    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        };
        let ast = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(ExpressionError::syntax(parser.offset(), "unexpected trailing input"));
        }
        Ok(Self { ast })
    }

    pub fn evaluate(&self, root: &Value) -> Result<Value, ExpressionError> {
        eval(&self.ast, root).map(Cow::into_owned)
    }

    /// Evaluate and coerce the result into a finite number.
    pub fn evaluate_number(&self, root: &Value) -> Result<f64, ExpressionError> {
        let n = to_number(&*eval(&self.ast, root)?)?;
        if n.is_finite() {
            Ok(n)
        } else {
            Err(ExpressionError::NonFinite)
        }
    }

    pub fn evaluate_text(&self, root: &Value) -> Result<String, ExpressionError> {
        Ok(to_text(&*eval(&self.ast, root)?))
    }
}

/// Lookups borrow from `root`; only computed values are owned.
fn eval<'a>(node: &Node, root: &'a Value) -> Result<Cow<'a, Value>, ExpressionError> {
    match node {
        Node::Root => Ok(Cow::Borrowed(root)),
        Node::Number(n) => number(*n),
        Node::Text(s) => Ok(Cow::Owned(Value::String(s.clone()))),
        Node::Field(base, name) => lookup_field(eval(base, root)?, name),
        Node::Index(base, index) => {
            let base = eval(base, root)?;
            let index = eval(index, root)?;
            match &*index {
                Value::String(key) => lookup_field(base, key),
                other => lookup_index(base, to_number(other)?),
            }
        }
        Node::Neg(inner) => number(-to_number(&*eval(inner, root)?)?),
        Node::Binary(op, lhs, rhs) => {
            let a = to_number(&*eval(lhs, root)?)?;
            let b = to_number(&*eval(rhs, root)?)?;
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div if b == 0.0 => return Err(ExpressionError::DivisionByZero),
                BinOp::Div => a / b,
                BinOp::Rem if b == 0.0 => return Err(ExpressionError::DivisionByZero),
                // Floored modulo: the result takes the sign of the divisor.
                BinOp::Rem => a - b * (a / b).floor(),
            };
            number(result)
        }
        Node::Call(builtin, args) => call(*builtin, args, root),
    }
}

fn call<'a>(builtin: Builtin, args: &[Node], root: &'a Value) -> Result<Cow<'a, Value>, ExpressionError> {
    let first = eval(&args[0], root)?;
    match builtin {
        Builtin::Float => number(to_number(&first)?),
        Builtin::Int => number(to_number(&first)?.trunc()),
        Builtin::Abs => number(to_number(&first)?.abs()),
        Builtin::Len => match &*first {
            Value::String(s) => number(s.chars().count() as f64),
            Value::Array(items) => number(items.len() as f64),
            Value::Object(map) => number(map.len() as f64),
            other => Err(ExpressionError::Type(format!("len() of {}", other))),
        },
        Builtin::Min | Builtin::Max => {
            let values: Vec<Cow<'a, Value>> = if args.len() == 1 {
                match first {
                    Cow::Borrowed(Value::Array(items)) => items.iter().map(Cow::Borrowed).collect(),
                    Cow::Owned(Value::Array(items)) => items.into_iter().map(Cow::Owned).collect(),
                    other => vec![other],
                }
            } else {
                let mut values = vec![first];
                for arg in &args[1..] {
                    values.push(eval(arg, root)?);
                }
                values
            };

            let mut best: Option<f64> = None;
            for value in &values {
                let n = to_number(value)?;
                best = Some(match (best, builtin) {
                    (None, _) => n,
                    (Some(b), Builtin::Min) => b.min(n),
                    (Some(b), _) => b.max(n),
                });
            }
            best.map(number)
                .unwrap_or_else(|| Err(ExpressionError::Type("min()/max() of empty array".into())))
        }
    }
}

fn lookup_field<'a>(base: Cow<'a, Value>, name: &str) -> Result<Cow<'a, Value>, ExpressionError> {
    let found = match base {
        Cow::Borrowed(Value::Object(map)) => map.get(name).map(Cow::Borrowed),
        Cow::Owned(Value::Object(mut map)) => map.remove(name).map(Cow::Owned),
        other => {
            return Err(ExpressionError::Type(format!(
                "cannot look up field '{}' in {}",
                name,
                kind_of(&other)
            )))
        }
    };
    found.ok_or_else(|| ExpressionError::MissingField(name.to_string()))
}

fn lookup_index<'a>(base: Cow<'a, Value>, index: f64) -> Result<Cow<'a, Value>, ExpressionError> {
    if index.fract() != 0.0 {
        return Err(ExpressionError::Type(format!("array index {} is not an integer", index)));
    }
    let index = index as i64;
    let len = match &*base {
        Value::Array(items) => items.len(),
        other => {
            return Err(ExpressionError::Type(format!(
                "cannot index {} with a number",
                kind_of(other)
            )))
        }
    };
    let resolved = if index < 0 { len as i64 + index } else { index };
    if resolved < 0 || resolved as usize >= len {
        return Err(ExpressionError::IndexOutOfRange { index, len });
    }
    let resolved = resolved as usize;
    Ok(match base {
        Cow::Borrowed(Value::Array(items)) => Cow::Borrowed(&items[resolved]),
        Cow::Owned(Value::Array(mut items)) => Cow::Owned(items.swap_remove(resolved)),
        other => other,
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_num(source: &str, root: &Value) -> f64 {
        Expression::compile(source).unwrap().evaluate_number(root).unwrap()
    }

    #[test]
    fn field_access_forms() {
        let root = json!({"requests_per_second": 42, "msg-rate": 3.5, "nested": {"list": [1, 2, 7]}});
        assert_eq!(eval_num("r['requests_per_second']", &root), 42.0);
        assert_eq!(eval_num("r.requests_per_second", &root), 42.0);
        assert_eq!(eval_num("r[\"msg-rate\"]", &root), 3.5);
        assert_eq!(eval_num("r['nested']['list'][2]", &root), 7.0);
        assert_eq!(eval_num("r.nested.list[-1]", &root), 7.0);
    }

    #[test]
    fn arithmetic_and_precedence() {
        let root = json!({"a": 10, "b": 4});
        assert_eq!(eval_num("r['a'] * 2 + r['b']", &root), 24.0);
        assert_eq!(eval_num("r['a'] * (2 + r['b'])", &root), 60.0);
        assert_eq!(eval_num("-r['b'] + 1", &root), -3.0);
        assert_eq!(eval_num("r['a'] / r['b']", &root), 2.5);
        assert_eq!(eval_num("-7 % 3", &root), 2.0);
    }

    #[test]
    fn builtins() {
        let root = json!({"xs": [5, 3, 9], "name": "web-1", "v": "12.7"});
        assert_eq!(eval_num("max(r.xs)", &root), 9.0);
        assert_eq!(eval_num("min(r.xs[0], r.xs[1])", &root), 3.0);
        assert_eq!(eval_num("len(r.name)", &root), 5.0);
        assert_eq!(eval_num("int(r.v)", &root), 12.0);
        assert_eq!(eval_num("abs(0 - 4)", &root), 4.0);
    }

    #[test]
    fn lookups_leave_the_document_untouched() {
        let root = json!({"a": {"x": 2, "big": [0, 1, 2, 3]}, "b": {"y": [3, 4]}});
        let before = root.clone();
        assert_eq!(eval_num("r['a']['x'] + r.b.y[1]", &root), 6.0);
        assert_eq!(eval_num("len(r.a.big) * max(r.b.y)", &root), 16.0);
        assert_eq!(
            Expression::compile("r.b").unwrap().evaluate(&root).unwrap(),
            json!({"y": [3, 4]})
        );
        assert_eq!(root, before);
    }

    #[test]
    fn plain_text_payload_is_numeric() {
        let root = Value::String("42\n".to_string());
        assert_eq!(Expression::identity().evaluate_number(&root).unwrap(), 42.0);
        assert_eq!(eval_num("r * 2", &root), 84.0);
    }

    #[test]
    fn evaluation_failures() {
        let root = json!({"a": "busy", "b": 0});
        let missing = Expression::compile("r['missing']").unwrap();
        assert_eq!(
            missing.evaluate_number(&root),
            Err(ExpressionError::MissingField("missing".into()))
        );

        let not_numeric = Expression::compile("r.a").unwrap();
        assert!(matches!(
            not_numeric.evaluate_number(&root),
            Err(ExpressionError::NotNumeric(_))
        ));

        let div = Expression::compile("1 / r.b").unwrap();
        assert_eq!(div.evaluate(&root), Err(ExpressionError::DivisionByZero));

        let out_of_range = Expression::compile("r[3]").unwrap();
        assert_eq!(
            out_of_range.evaluate(&json!([1])),
            Err(ExpressionError::IndexOutOfRange { index: 3, len: 1 })
        );
    }

    #[test]
    fn rejects_anything_outside_the_grammar() {
        for source in [
            "",
            "r[",
            "r['a'",
            "__import__('os').system('true')",
            "open('/etc/passwd')",
            "r; r",
            "len(r, r)",
            "r.",
            "x",
        ] {
            assert!(
                matches!(Expression::compile(source), Err(ExpressionError::Syntax { .. })),
                "expected syntax error for {:?}",
                source
            );
        }
    }

    #[test]
    fn text_rendering() {
        let root = json!({"status": "healthy", "code": 200});
        let status = Expression::compile("r.status").unwrap();
        assert_eq!(status.evaluate_text(&root).unwrap(), "healthy");
        let code = Expression::compile("r.code").unwrap();
        assert_eq!(code.evaluate_text(&root).unwrap(), "200");
    }
}
