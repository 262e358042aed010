use std::rc::Rc;

use gba_asm_types::SourcePos;

use crate::ast::{BinaryOp, Expr, Path, PathSegment, UnaryOp};
use crate::error::ExprError;
use crate::lexer::{lex, Token, TokenKind};

/// Parses one expression from source text (spec §6's "expression layer";
/// no fixed grammar is specified, so this is the precedence table a
/// gbadev-style dialect conventionally uses — C-like, loosest to tightest:
/// `?:`, `||`, `&&`, `|`, `^`, `&`, `==`/`!=`, relational, shift, `+`/`-`,
/// `*`/`/`/`%`, unary, then primaries).
///
/// `use_id_seed` lets the caller hand out stable per-occurrence ids for
/// forward-label references (`+name`) parsed out of this one source string;
/// callers that re-parse the same statement text must pass the same seed to
/// preserve forward-reference identity (spec §4.7).
pub fn parse(src: &str, file: impl Into<Rc<str>>, line: u32, use_id_seed: u64) -> Result<Expr, ExprError> {
    let tokens = lex(src, file, line)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        next_use_id: use_id_seed,
    };
    let expr = p.parse_ternary()?;
    p.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_use_id: u64,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        self.tokens.get(self.pos).map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    fn peek_pos(&self) -> SourcePos {
        self.tokens
            .get(self.pos)
            .map(|t| t.pos.clone())
            .unwrap_or_else(|| SourcePos::synthetic("<expr-eof>"))
    }

    fn advance(&mut self) -> TokenKind {
        let tok = self.tokens.get(self.pos).map(|t| t.kind.clone()).unwrap_or(TokenKind::Eof);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect_eof(&self) -> Result<(), ExprError> {
        if matches!(self.peek(), TokenKind::Eof) {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                pos: self.peek_pos(),
                expected: "end of expression",
                found: format!("{:?}", self.peek()),
            })
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &'static str) -> Result<(), ExprError> {
        if self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                pos: self.peek_pos(),
                expected: what,
                found: format!("{:?}", self.peek()),
            })
        }
    }

    fn fresh_use_id(&mut self) -> u64 {
        let id = self.next_use_id;
        self.next_use_id += 1;
        id
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_logical_or()?;
        if matches!(self.peek(), TokenKind::Question) {
            self.advance();
            let t = self.parse_ternary()?;
            self.expect(&TokenKind::Colon, "':' in ternary expression")?;
            let f = self.parse_ternary()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(t), Box::new(f)))
        } else {
            Ok(cond)
        }
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_logical_and()?;
        while matches!(self.peek(), TokenKind::PipePipe) {
            self.advance();
            let rhs = self.parse_logical_and()?;
            lhs = Expr::Binary(BinaryOp::LogOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_bit_or()?;
        while matches!(self.peek(), TokenKind::AmpAmp) {
            self.advance();
            let rhs = self.parse_bit_or()?;
            lhs = Expr::Binary(BinaryOp::LogAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_bit_xor()?;
        while matches!(self.peek(), TokenKind::Pipe) {
            self.advance();
            let rhs = self.parse_bit_xor()?;
            lhs = Expr::Binary(BinaryOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_bit_and()?;
        while matches!(self.peek(), TokenKind::Caret) {
            self.advance();
            let rhs = self.parse_bit_and()?;
            lhs = Expr::Binary(BinaryOp::BitXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_equality()?;
        while matches!(self.peek(), TokenKind::Amp) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinaryOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)))
            }
            TokenKind::Bang => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)))
            }
            TokenKind::Tilde => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::BitNot, Box::new(self.parse_unary()?)))
            }
            TokenKind::Plus => {
                // Unary `+` is a no-op in this grammar; `+name` as a bare
                // primary is a forward relative label, handled in `lex`.
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Dollar => Ok(Expr::CurrentAddr),
            TokenKind::RelativeLabel { name, forward, count } => Ok(Expr::RelativeLabel {
                name,
                forward,
                count,
                use_id: self.fresh_use_id(),
            }),
            TokenKind::Ident(name) => {
                let mut segments = vec![PathSegment::Name(name)];
                self.parse_path_tail(&mut segments)?;
                Ok(Expr::Ident(Path(segments)))
            }
            TokenKind::LParen => {
                let inner = self.parse_ternary()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(ExprError::UnexpectedToken {
                pos: self.peek_pos(),
                expected: "number, identifier, '(', or relative label",
                found: format!("{:?}", other),
            }),
        }
    }

    fn parse_path_tail(&mut self, segments: &mut Vec<PathSegment>) -> Result<(), ExprError> {
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    match self.advance() {
                        TokenKind::Ident(name) => segments.push(PathSegment::Name(name)),
                        other => {
                            return Err(ExprError::UnexpectedToken {
                                pos: self.peek_pos(),
                                expected: "identifier after '.'",
                                found: format!("{:?}", other),
                            })
                        }
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_ternary()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    segments.push(PathSegment::Index(Box::new(index)));
                }
                _ => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_with_precedence() {
        let expr = parse("1 + 2 * 3", "test.s", 1, 0).unwrap();
        match expr {
            Expr::Binary(BinaryOp::Add, lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Number(1)));
                assert!(matches!(*rhs, Expr::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_dotted_path_with_index() {
        let expr = parse("foo.bar[1 + 1]", "test.s", 1, 0).unwrap();
        match expr {
            Expr::Ident(Path(segments)) => {
                assert_eq!(segments.len(), 3);
                assert!(matches!(&segments[0], PathSegment::Name(n) if n == "foo"));
                assert!(matches!(&segments[1], PathSegment::Name(n) if n == "bar"));
                assert!(matches!(&segments[2], PathSegment::Index(_)));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_reverse_label_reference() {
        let expr = parse("--loop", "test.s", 1, 0).unwrap();
        match expr {
            Expr::RelativeLabel { name, forward, count, .. } => {
                assert_eq!(name, "loop");
                assert!(!forward);
                assert_eq!(count, 2);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_ternary_and_current_addr() {
        let expr = parse("$ > 0 ? 1 : 2", "test.s", 1, 0).unwrap();
        assert!(matches!(expr, Expr::Ternary(..)));
    }
}
