//! Tokenizer and recursive-descent parser for the derived-column
//! sub-language: infix arithmetic, unary minus, a closed function table,
//! numeric literals and `[column]` references. Nothing else parses.

use std::fmt;

/// Binary arithmetic operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// The closed function table. `Log` is the natural logarithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Log,
    Log10,
    Exp,
    Sqrt,
    Abs,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Func::Sin),
            "cos" => Some(Func::Cos),
            "tan" => Some(Func::Tan),
            "asin" => Some(Func::Asin),
            "acos" => Some(Func::Acos),
            "atan" => Some(Func::Atan),
            "log" => Some(Func::Log),
            "log10" => Some(Func::Log10),
            "exp" => Some(Func::Exp),
            "sqrt" => Some(Func::Sqrt),
            "abs" => Some(Func::Abs),
            _ => None,
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Asin => x.asin(),
            Func::Acos => x.acos(),
            Func::Atan => x.atan(),
            Func::Log => x.ln(),
            Func::Log10 => x.log10(),
            Func::Exp => x.exp(),
            Func::Sqrt => x.sqrt(),
            Func::Abs => x.abs(),
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Ref(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        arg: Box<Expr>,
    },
}

impl Expr {
    /// Column references in left-to-right source order, with duplicates.
    pub fn refs(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ref(name) => out.push(name.clone()),
            Expr::Neg(inner) => inner.collect_refs(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_refs(out);
                rhs.collect_refs(out);
            }
            Expr::Call { arg, .. } => arg.collect_refs(out),
        }
    }
}

/// Parse failure with a byte position into the expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprError {
    pub position: usize,
    pub kind: ExprErrorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprErrorKind {
    Syntax(String),
    UnknownFunction(String),
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprErrorKind::Syntax(detail) => write!(f, "{detail}"),
            ExprErrorKind::UnknownFunction(name) => write!(f, "unknown function '{name}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    ColumnRef(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '+' => {
                tokens.push((i, Token::Plus));
                i += 1;
            }
            '-' => {
                tokens.push((i, Token::Minus));
                i += 1;
            }
            '*' => {
                tokens.push((i, Token::Star));
                i += 1;
            }
            '/' => {
                tokens.push((i, Token::Slash));
                i += 1;
            }
            '(' => {
                tokens.push((i, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((i, Token::RParen));
                i += 1;
            }
            '[' => {
                let start = i + 1;
                let end = input[start..]
                    .find(']')
                    .map(|off| start + off)
                    .ok_or_else(|| ExprError {
                        position: i,
                        kind: ExprErrorKind::Syntax("unterminated column reference".to_string()),
                    })?;
                let name = input[start..end].trim();
                if name.is_empty() {
                    return Err(ExprError {
                        position: i,
                        kind: ExprErrorKind::Syntax("empty column reference".to_string()),
                    });
                }
                tokens.push((i, Token::ColumnRef(name.to_string())));
                i = end + 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < bytes.len() && matches!(bytes[i] as char, '0'..='9' | '.') {
                    i += 1;
                }
                // Scientific exponent.
                if i < bytes.len() && matches!(bytes[i] as char, 'e' | 'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && matches!(bytes[j] as char, '+' | '-') {
                        j += 1;
                    }
                    if j < bytes.len() && (bytes[j] as char).is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = &input[start..i];
                let value = text.parse::<f64>().map_err(|_| ExprError {
                    position: start,
                    kind: ExprErrorKind::Syntax(format!("invalid number '{text}'")),
                })?;
                tokens.push((start, Token::Number(value)));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && matches!(bytes[i] as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
                {
                    i += 1;
                }
                tokens.push((start, Token::Ident(input[start..i].to_string())));
            }
            other => {
                return Err(ExprError {
                    position: i,
                    kind: ExprErrorKind::Syntax(format!("unexpected character '{other}'")),
                });
            }
        }
    }

    Ok(tokens)
}

/// Parse an expression into an [`Expr`] tree.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        input_len: input.len(),
    };
    let expr = parser.expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(ExprError {
            position: parser.tokens[parser.pos].0,
            kind: ExprErrorKind::Syntax("unexpected trailing input".to_string()),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    input_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn advance(&mut self) -> Option<(usize, Token)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(p, _)| *p)
            .unwrap_or(self.input_len)
    }

    fn expect_rparen(&mut self) -> Result<(), ExprError> {
        match self.advance() {
            Some((_, Token::RParen)) => Ok(()),
            _ => Err(ExprError {
                position: self.position(),
                kind: ExprErrorKind::Syntax("expected ')'".to_string()),
            }),
        }
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // factor := ('-' | '+') factor | primary
    fn factor(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.factor()?)))
            }
            Some(Token::Plus) => {
                self.advance();
                self.factor()
            }
            _ => self.primary(),
        }
    }

    // primary := number | columnref | ident '(' expression ')' | '(' expression ')'
    fn primary(&mut self) -> Result<Expr, ExprError> {
        let position = self.position();
        match self.advance() {
            Some((_, Token::Number(value))) => Ok(Expr::Literal(value)),
            Some((_, Token::ColumnRef(name))) => Ok(Expr::Ref(name)),
            Some((pos, Token::Ident(name))) => {
                let func = Func::from_name(&name).ok_or(ExprError {
                    position: pos,
                    kind: ExprErrorKind::UnknownFunction(name),
                })?;
                match self.advance() {
                    Some((_, Token::LParen)) => {}
                    _ => {
                        return Err(ExprError {
                            position: self.position(),
                            kind: ExprErrorKind::Syntax("expected '(' after function".to_string()),
                        });
                    }
                }
                let arg = self.expression()?;
                self.expect_rparen()?;
                Ok(Expr::Call {
                    func,
                    arg: Box::new(arg),
                })
            }
            Some((_, Token::LParen)) => {
                let inner = self.expression()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            _ => Err(ExprError {
                position,
                kind: ExprErrorKind::Syntax("expected a value".to_string()),
            }),
        }
    }
}
