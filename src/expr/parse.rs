//! Pratt parser for the expression language.
//!
//! Produces an [`Expr`] tree from the token stream. Precedence, loosest
//! first: ternary, `??`, `||`, `&&`, equality, comparison, additive,
//! multiplicative, unary, postfix (member/index/call), primary.

use super::token::{SpannedToken, Token, lex};

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    /// `base.field`
    Member(Box<Expr>, String),
    /// `base[index]`
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `cond ? a : b`
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `name(args…)`: functions are a fixed registry, so the callee is a
    /// bare name rather than an arbitrary expression.
    Call(String, Vec<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Coalesce,
}

/// A parse failure: message plus byte offset in the expression source.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprParseError {
    pub message: String,
    pub pos: usize,
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

/// Parse a full expression; trailing tokens are an error.
pub fn parse(src: &str) -> Result<Expr, ExprParseError> {
    let tokens = lex(src).map_err(|e| ExprParseError {
        message: e.message,
        pos: e.pos,
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.ternary()?;
    if let Some(tok) = parser.peek() {
        return Err(ExprParseError {
            message: format!("unexpected token `{}`", tok.token),
            pos: tok.pos,
        });
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<SpannedToken> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().map(|t| &t.token) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprParseError> {
        match self.advance() {
            Some(tok) if tok.token == expected => Ok(()),
            Some(tok) => Err(ExprParseError {
                message: format!("expected `{expected}`, found `{}`", tok.token),
                pos: tok.pos,
            }),
            None => Err(ExprParseError {
                message: format!("expected `{expected}`, found end of expression"),
                pos: usize::MAX,
            }),
        }
    }

    fn ternary(&mut self) -> Result<Expr, ExprParseError> {
        let cond = self.coalesce()?;
        if self.eat(&Token::Question) {
            let then = self.ternary()?;
            self.expect(Token::Colon)?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn coalesce(&mut self) -> Result<Expr, ExprParseError> {
        let mut left = self.logical_or()?;
        while self.eat(&Token::Coalesce) {
            let right = self.logical_or()?;
            left = Expr::Binary(BinaryOp::Coalesce, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn logical_or(&mut self) -> Result<Expr, ExprParseError> {
        let mut left = self.logical_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.logical_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ExprParseError> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExprParseError> {
        let mut left = self.comparison()?;
        loop {
            let op = if self.eat(&Token::EqEq) {
                BinaryOp::Eq
            } else if self.eat(&Token::NotEq) {
                BinaryOp::Ne
            } else {
                break;
            };
            let right = self.comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ExprParseError> {
        let mut left = self.additive()?;
        loop {
            let op = if self.eat(&Token::Le) {
                BinaryOp::Le
            } else if self.eat(&Token::Lt) {
                BinaryOp::Lt
            } else if self.eat(&Token::Ge) {
                BinaryOp::Ge
            } else if self.eat(&Token::Gt) {
                BinaryOp::Gt
            } else {
                break;
            };
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ExprParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinaryOp::Add
            } else if self.eat(&Token::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprParseError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinaryOp::Mul
            } else if self.eat(&Token::Slash) {
                BinaryOp::Div
            } else if self.eat(&Token::Percent) {
                BinaryOp::Rem
            } else {
                break;
            };
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExprParseError> {
        if self.eat(&Token::Bang) {
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Some(SpannedToken {
                        token: Token::Ident(name),
                        ..
                    }) => {
                        expr = Expr::Member(Box::new(expr), name);
                    }
                    Some(tok) => {
                        return Err(ExprParseError {
                            message: format!("expected property name after `.`, found `{}`", tok.token),
                            pos: tok.pos,
                        });
                    }
                    None => {
                        return Err(ExprParseError {
                            message: "expected property name after `.`".to_string(),
                            pos: usize::MAX,
                        });
                    }
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.ternary()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ExprParseError> {
        match self.advance() {
            Some(SpannedToken {
                token: Token::Number(n),
                ..
            }) => Ok(Expr::Number(n)),
            Some(SpannedToken {
                token: Token::Str(s),
                ..
            }) => Ok(Expr::Str(s)),
            Some(SpannedToken {
                token: Token::True, ..
            }) => Ok(Expr::Bool(true)),
            Some(SpannedToken {
                token: Token::False,
                ..
            }) => Ok(Expr::Bool(false)),
            Some(SpannedToken {
                token: Token::Null, ..
            }) => Ok(Expr::Null),
            Some(SpannedToken {
                token: Token::Ident(name),
                ..
            }) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.ternary()?);
                            if self.eat(&Token::Comma) {
                                continue;
                            }
                            self.expect(Token::RParen)?;
                            break;
                        }
                    }
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(SpannedToken {
                token: Token::LParen,
                ..
            }) => {
                let inner = self.ternary()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(tok) => Err(ExprParseError {
                message: format!("unexpected token `{}`", tok.token),
                pos: tok.pos,
            }),
            None => Err(ExprParseError {
                message: "empty expression".to_string(),
                pos: 0,
            }),
        }
    }
}

impl Expr {
    /// Root identifiers referenced by this expression, with whether each is
    /// accessed through a property path (`root.field…`). The validator uses
    /// this for node-reference checks.
    pub fn collect_roots(&self, out: &mut Vec<(String, Vec<String>)>) {
        match self {
            Expr::Ident(name) => out.push((name.clone(), Vec::new())),
            Expr::Member(base, field) => {
                let mut path = vec![field.clone()];
                let mut cursor: &Expr = base;
                loop {
                    match cursor {
                        Expr::Member(inner, f) => {
                            path.push(f.clone());
                            cursor = inner;
                        }
                        Expr::Ident(name) => {
                            path.reverse();
                            out.push((name.clone(), path));
                            return;
                        }
                        other => {
                            other.collect_roots(out);
                            return;
                        }
                    }
                }
            }
            Expr::Index(base, index) => {
                base.collect_roots(out);
                index.collect_roots(out);
            }
            Expr::Unary(_, inner) => inner.collect_roots(out),
            Expr::Binary(_, left, right) => {
                left.collect_roots(out);
                right.collect_roots(out);
            }
            Expr::Ternary(cond, then, otherwise) => {
                cond.collect_roots(out);
                then.collect_roots(out);
                otherwise.collect_roots(out);
            }
            Expr::Call(_, args) => {
                for arg in args {
                    arg.collect_roots(out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Number(2.0)),
                    Box::new(Expr::Number(3.0)),
                )),
            )
        );
    }

    #[test]
    fn member_chain_roots() {
        let expr = parse("ai.output.items[0].name").unwrap();
        let mut roots = Vec::new();
        expr.collect_roots(&mut roots);
        assert_eq!(roots[0].0, "ai");
        assert_eq!(roots[0].1, vec!["output".to_string(), "items".to_string()]);
    }

    #[test]
    fn call_with_args() {
        let expr = parse("clamp(x, 0, 10)").unwrap();
        match expr {
            Expr::Call(name, args) => {
                assert_eq!(name, "clamp");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn ternary_and_coalesce() {
        assert!(parse("a ? b : c ?? d").is_ok());
        assert!(parse("a ?").is_err());
        assert!(parse("1 +").is_err());
    }
}
