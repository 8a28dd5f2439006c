// Condition expressions for action gating and exit rules
//
// A deliberately small grammar: literals, identifiers looked up in a fixed
// context, map lookups, comparisons, boolean and arithmetic operators.
// There are no calls and no way to reach anything outside the context.
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Values an expression can produce or read from the context
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
    Map(BTreeMap<String, Value>),
}

/// Names visible to an expression
pub type Context = BTreeMap<String, Value>;

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::Text(s) => !s.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Numeric view; booleans count as 0/1
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Text(_) => "string",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Map(m) => write!(f, "<map of {} entries>", m.len()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("key '{0}' not found")]
    MissingKey(String),
    #[error("unsupported operand types for {op}: {left} and {right}")]
    Type {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Name(String),
    Symbol(&'static str),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Text(s) => write!(f, "'{s}'"),
            Token::Name(s) => write!(f, "{s}"),
            Token::Symbol(s) => write!(f, "{s}"),
        }
    }
}

// Longest first so "<=" wins over "<"
const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "(", ")", "[",
    "]", ".",
];

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let starts_number =
            c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()));
        if starts_number {
            let start = i;
            let mut seen_dot = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || (chars[i] == '.' && !seen_dot)) {
                seen_dot |= chars[i] == '.';
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let number = text
                .parse::<f64>()
                .map_err(|_| ExprError::UnexpectedToken(text.clone()))?;
            tokens.push(Token::Number(number));
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(ExprError::UnterminatedString),
                    Some('\\') if i + 1 < chars.len() => {
                        text.push(chars[i + 1]);
                        i += 2;
                    }
                    Some(&ch) if ch == quote => {
                        i += 1;
                        break;
                    }
                    Some(&ch) => {
                        text.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Text(text));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Name(chars[start..i].iter().collect()));
            continue;
        }
        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
            Some(symbol) => {
                tokens.push(Token::Symbol(*symbol));
                i += symbol.len();
            }
            None => return Err(ExprError::UnexpectedChar(c, i)),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn at_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == keyword)
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), ExprError> {
        match self.next()? {
            Token::Symbol(s) if s == symbol => Ok(()),
            other => Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and_expr()?;
        while self.at_keyword("or") || self.at_symbol("||") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.not_expr()?;
        while self.at_keyword("and") || self.at_symbol("&&") {
            self.pos += 1;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ExprError> {
        if self.at_keyword("not") || self.at_symbol("!") {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison_op(&self) -> Option<(CmpOp, usize)> {
        match self.peek()? {
            Token::Symbol("==") => Some((CmpOp::Eq, 1)),
            Token::Symbol("!=") => Some((CmpOp::Ne, 1)),
            Token::Symbol("<") => Some((CmpOp::Lt, 1)),
            Token::Symbol("<=") => Some((CmpOp::Le, 1)),
            Token::Symbol(">") => Some((CmpOp::Gt, 1)),
            Token::Symbol(">=") => Some((CmpOp::Ge, 1)),
            Token::Name(n) if n == "in" => Some((CmpOp::In, 1)),
            Token::Name(n) if n == "not" => match self.peek_at(1) {
                Some(Token::Name(m)) if m == "in" => Some((CmpOp::NotIn, 2)),
                _ => None,
            },
            _ => None,
        }
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.additive()?;
        let mut chain = Vec::new();
        while let Some((op, width)) = self.comparison_op() {
            self.pos += width;
            chain.push((op, self.additive()?));
        }
        if chain.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), chain))
        }
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol("+")) => BinOp::Add,
                Some(Token::Symbol("-")) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol("*")) => BinOp::Mul,
                Some(Token::Symbol("/")) => BinOp::Div,
                Some(Token::Symbol("%")) => BinOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.at_symbol("-") {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.at_symbol("+") {
            self.pos += 1;
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            if self.at_symbol(".") {
                self.pos += 1;
                let key = match self.next()? {
                    Token::Name(name) => name,
                    other => return Err(ExprError::UnexpectedToken(other.to_string())),
                };
                expr = Expr::Index(Box::new(expr), Box::new(Expr::Literal(Value::Text(key))));
            } else if self.at_symbol("[") {
                self.pos += 1;
                let key = self.or_expr()?;
                self.expect_symbol("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next()? {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Text(s) => Ok(Expr::Literal(Value::Text(s))),
            Token::Name(name) => match name.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "and" | "or" | "not" | "in" => Err(ExprError::UnexpectedToken(name)),
                _ => Ok(Expr::Name(name)),
            },
            Token::Symbol("(") => {
                let inner = self.or_expr()?;
                self.expect_symbol(")")?;
                Ok(inner)
            }
            other => Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }
}

/// Parse an expression without evaluating it.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let expr = parser.or_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
    }
}

fn type_error(op: &'static str, left: &Value, right: &Value) -> ExprError {
    ExprError::Type {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExprError> {
    use std::cmp::Ordering;
    let ordering = |symbol: &'static str| -> Result<Ordering, ExprError> {
        match (left.as_number(), right.as_number(), left, right) {
            (Some(a), Some(b), _, _) => a.partial_cmp(&b).ok_or_else(|| type_error(symbol, left, right)),
            (_, _, Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            _ => Err(type_error(symbol, left, right)),
        }
    };
    let equal = || match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    };
    let contains = |symbol: &'static str| -> Result<bool, ExprError> {
        match (left, right) {
            (Value::Text(needle), Value::Text(haystack)) => Ok(haystack.contains(needle.as_str())),
            (Value::Text(key), Value::Map(map)) => Ok(map.contains_key(key)),
            _ => Err(type_error(symbol, left, right)),
        }
    };
    Ok(match op {
        CmpOp::Eq => equal(),
        CmpOp::Ne => !equal(),
        CmpOp::Lt => ordering("<")?.is_lt(),
        CmpOp::Le => ordering("<=")?.is_le(),
        CmpOp::Gt => ordering(">")?.is_gt(),
        CmpOp::Ge => ordering(">=")?.is_ge(),
        CmpOp::In => contains("in")?,
        CmpOp::NotIn => !contains("not in")?,
    })
}

fn arithmetic(op: BinOp, left: Value, right: Value) -> Result<Value, ExprError> {
    if let (BinOp::Add, Value::Text(a), Value::Text(b)) = (op, &left, &right) {
        return Ok(Value::Text(format!("{a}{b}")));
    }
    let symbol = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
    };
    let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
        return Err(type_error(symbol, &left, &right));
    };
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div if b == 0.0 => return Err(ExprError::DivisionByZero),
        BinOp::Div => a / b,
        BinOp::Rem if b == 0.0 => return Err(ExprError::DivisionByZero),
        // Result takes the sign of the divisor
        BinOp::Rem => ((a % b) + b) % b,
    };
    Ok(Value::Number(result))
}

fn eval(expr: &Expr, context: &Context) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => context
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownName(name.clone())),
        Expr::Index(base, key) => {
            let base = eval(base, context)?;
            let key = eval(key, context)?;
            match (&base, &key) {
                (Value::Map(map), Value::Text(k)) => {
                    map.get(k).cloned().ok_or_else(|| ExprError::MissingKey(k.clone()))
                }
                _ => Err(type_error("[]", &base, &key)),
            }
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, context)?.is_truthy())),
        Expr::Neg(inner) => {
            let value = eval(inner, context)?;
            match value.as_number() {
                Some(n) => Ok(Value::Number(-n)),
                None => Err(type_error("unary -", &value, &value)),
            }
        }
        Expr::And(left, right) => {
            let left = eval(left, context)?;
            if left.is_truthy() { eval(right, context) } else { Ok(left) }
        }
        Expr::Or(left, right) => {
            let left = eval(left, context)?;
            if left.is_truthy() { Ok(left) } else { eval(right, context) }
        }
        Expr::Binary(op, left, right) => {
            arithmetic(*op, eval(left, context)?, eval(right, context)?)
        }
        Expr::Compare(first, chain) => {
            let mut left = eval(first, context)?;
            for (op, operand) in chain {
                let right = eval(operand, context)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
    }
}

/// Evaluate `input` and return its value, or the first error encountered.
pub fn try_evaluate(input: &str, context: &Context) -> Result<Value, ExprError> {
    eval(&parse(input)?, context)
}

/// Evaluate a condition. `"true"` always holds; any error makes it false.
pub fn evaluate(input: &str, context: &Context) -> bool {
    if input.trim().eq_ignore_ascii_case("true") {
        return true;
    }
    match try_evaluate(input, context) {
        Ok(value) => value.is_truthy(),
        Err(e) => {
            log::debug!("Condition '{}' evaluated to false: {}", input, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, Value)]) -> Context {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn vars() -> Context {
        let mut map = BTreeMap::new();
        map.insert("mode".to_string(), Value::from("fast"));
        map.insert("name".to_string(), Value::from("login button"));
        ctx(&[
            ("vars", Value::Map(map)),
            ("attempts", Value::from(4u32)),
            ("last_match_score", Value::from(0.82)),
            ("target_found", Value::from(true)),
        ])
    }

    #[test]
    fn test_literal_true_ignores_context() {
        assert!(evaluate("true", &Context::new()));
        assert!(evaluate("  TRUE ", &Context::new()));
        assert!(evaluate("True", &Context::new()));
    }

    #[test]
    fn test_malformed_is_false() {
        let empty = Context::new();
        for bad in ["", "attempts >", "(1 + 2", "'open", "1 ? 2", "and", "a b", "x[", "import os"] {
            assert!(!evaluate(bad, &empty), "'{bad}' should be false");
        }
    }

    #[test]
    fn test_basic_comparisons() {
        assert!(evaluate("attempts > 2", &ctx(&[("attempts", Value::from(3u32))])));
        assert!(evaluate(
            "last_match_score >= 0.5",
            &ctx(&[("last_match_score", Value::from(0.6))])
        ));
        assert!(!evaluate(
            "last_match_score >= 0.5",
            &ctx(&[("last_match_score", Value::from(0.4))])
        ));
    }

    #[test]
    fn test_unknown_name_is_false() {
        assert!(!evaluate("missing > 1", &Context::new()));
        assert!(!evaluate("not missing", &Context::new()));
    }

    #[test]
    fn test_boolean_operators() {
        let c = vars();
        assert!(evaluate("target_found and attempts >= 4", &c));
        assert!(evaluate("target_found && !(attempts < 4)", &c));
        assert!(evaluate("attempts > 10 or last_match_score > 0.8", &c));
        assert!(evaluate("not attempts > 10 || false", &c));
        assert!(!evaluate("target_found and attempts > 10", &c));
        // right side is never evaluated once the left decides
        assert!(evaluate("target_found or missing", &c));
        assert!(!evaluate("False and missing", &c));
    }

    #[test]
    fn test_chained_comparison() {
        let c = vars();
        assert!(evaluate("0.5 < last_match_score <= 1", &c));
        assert!(!evaluate("0.9 < last_match_score <= 1", &c));
    }

    #[test]
    fn test_arithmetic() {
        let c = vars();
        assert!(evaluate("attempts % 2 == 0", &c));
        assert!(evaluate("attempts * 2 - 1 == 7", &c));
        assert!(evaluate("-attempts + 5 == 1", &c));
        assert!(evaluate("-7 % 3 == 2", &c));
        assert!(!evaluate("attempts / 0 > 1", &c));
        assert_eq!(
            try_evaluate("attempts / 0", &c),
            Err(ExprError::DivisionByZero)
        );
    }

    #[test]
    fn test_variable_lookup() {
        let c = vars();
        assert!(evaluate("vars.mode == 'fast'", &c));
        assert!(evaluate("vars['mode'] == \"fast\"", &c));
        assert!(evaluate("'login' in vars.name", &c));
        assert!(evaluate("'mode' in vars", &c));
        assert!(evaluate("'speed' not in vars", &c));
        assert!(!evaluate("vars.speed == 'fast'", &c));
    }

    #[test]
    fn test_type_errors_are_false() {
        let c = vars();
        assert!(!evaluate("vars.mode > 3", &c));
        assert!(!evaluate("attempts in vars.mode", &c));
        assert!(matches!(
            try_evaluate("vars.mode - 1", &c),
            Err(ExprError::Type { op: "-", .. })
        ));
    }

    #[test]
    fn test_mixed_equality_does_not_error() {
        let c = vars();
        assert!(evaluate("vars.mode != 3", &c));
        assert!(evaluate("target_found == 1", &c));
    }

    #[test]
    fn test_parse_reports_trailing_tokens() {
        assert_eq!(
            parse("attempts 3"),
            Err(ExprError::UnexpectedToken("3".to_string()))
        );
        assert!(parse("elapsed_seconds >= timeout_seconds").is_ok());
    }
}
