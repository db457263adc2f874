//! The parser: a classical top-down recursive-descent parser over BX's LL
//! grammar, with a precedence-climbing expression parser.

use std::fmt::Debug;

use derive_more::derive::Display;

use crate::common::Id;

use super::ast::*;
use super::lex::*;

#[derive(Display)]
#[display("Parse error: {}", self.0)]
pub struct ParseError(String);

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

fn err<T>(msg: impl Into<String>) -> Result<T, ParseError> {
    Err(ParseError(msg.into()))
}

struct Parser<'input> {
    toks: Vec<Token<'input>>,
    pos: usize,
}

impl<'input> Parser<'input> {
    fn peek(&self) -> Option<TokenKind> {
        self.toks.get(self.pos).map(|t| t.kind)
    }

    fn peek_text(&self) -> Option<&'input str> {
        self.toks.get(self.pos).map(|t| t.text)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == Some(kind)
    }

    fn advance(&mut self) -> Option<Token<'input>> {
        let t = self.toks.get(self.pos).copied();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'input>, ParseError> {
        match self.advance() {
            Some(t) if t.kind == kind => Ok(t),
            Some(t) => err(format!("expected {kind:?}, found {:?} ('{}')", t.kind, t.text)),
            None => err(format!("expected {kind:?}, found end of input")),
        }
    }

    fn id(&mut self) -> Result<Id, ParseError> {
        let t = self.expect(TokenKind::Id)?;
        Ok(internment::Intern::new(t.text.to_string()))
    }

    // ---- types ----

    fn base_type(&mut self) -> Result<TypeExpr, ParseError> {
        match self.peek() {
            Some(TokenKind::Int64) => {
                self.advance();
                Ok(TypeExpr::Int64)
            }
            Some(TokenKind::Bool) => {
                self.advance();
                Ok(TypeExpr::Bool)
            }
            other => err(format!("expected a type, found {other:?}")),
        }
    }

    /// Parses a type including any number of trailing `*` (pointer) and
    /// `[n]` (fixed-length list) suffixes, e.g. `int64**[3]`.
    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let mut ty = self.base_type()?;
        loop {
            match self.peek() {
                Some(TokenKind::Star) => {
                    self.advance();
                    ty = TypeExpr::Pointer(Box::new(ty));
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let n = self.expect(TokenKind::Num)?;
                    let n: usize = n
                        .text
                        .parse()
                        .map_err(|_| ParseError(format!("bad list length '{}'", n.text)))?;
                    self.expect(TokenKind::RBracket)?;
                    ty = TypeExpr::List(Box::new(ty), n);
                }
                _ => break,
            }
        }
        Ok(ty)
    }

    // ---- top level ----

    fn program(&mut self) -> Result<Program, ParseError> {
        let mut globals = vec![];
        let mut callables = vec![];
        while self.peek().is_some() {
            match self.peek() {
                Some(TokenKind::Var) => globals.push(self.global_decl()?),
                Some(TokenKind::Proc) | Some(TokenKind::Fun) => callables.push(self.callable_decl()?),
                other => return err(format!("expected a declaration, found {other:?}")),
            }
        }
        Ok(Program { globals, callables })
    }

    fn global_decl(&mut self) -> Result<GlobalDecl, ParseError> {
        self.expect(TokenKind::Var)?;
        let name = self.id()?;
        self.expect(TokenKind::Assign)?;
        let init = self.expr()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        self.expect(TokenKind::Semi)?;
        Ok(GlobalDecl { name, ty, init })
    }

    fn params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut params = vec![];
        if !self.at(TokenKind::RParen) {
            loop {
                let name = self.id()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                params.push(Param { name, ty });
                if self.at(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn callable_decl(&mut self) -> Result<CallableDecl, ParseError> {
        let is_fun = self.at(TokenKind::Fun);
        self.advance(); // `proc` or `fun`
        let name = self.id()?;
        let params = self.params()?;
        let ret = if is_fun {
            self.expect(TokenKind::Colon)?;
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(CallableDecl {
            name,
            params,
            ret,
            body,
        })
    }

    // ---- statements ----

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = vec![];
        while !self.at(TokenKind::RBrace) {
            stmts.push(self.stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Some(TokenKind::Var) => {
                self.advance();
                let name = self.id()?;
                // `var x = e : T;` gives x a literal initializer; `var x : T;`
                // (only meaningful for list types) leaves it zero-initialized.
                let init = if self.at(TokenKind::Assign) {
                    self.advance();
                    Some(self.expr()?)
                } else {
                    None
                };
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Declare { name, ty, init })
            }
            Some(TokenKind::If) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let tt = self.block()?;
                let ff = if self.at(TokenKind::Else) {
                    self.advance();
                    if self.at(TokenKind::If) {
                        vec![self.stmt()?]
                    } else {
                        self.block()?
                    }
                } else {
                    vec![]
                };
                Ok(Stmt::If { cond, tt, ff })
            }
            Some(TokenKind::While) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            Some(TokenKind::Print) => {
                self.advance();
                let e = self.expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Print(e))
            }
            Some(TokenKind::Return) => {
                self.advance();
                let e = if self.at(TokenKind::Semi) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return(e))
            }
            Some(TokenKind::LBrace) => Ok(Stmt::Block(self.block()?)),
            _ => {
                let e = self.expr()?;
                if self.at(TokenKind::Assign) {
                    self.advance();
                    let rhs = self.expr()?;
                    self.expect(TokenKind::Semi)?;
                    Ok(Stmt::Assign { lhs: e, rhs })
                } else {
                    self.expect(TokenKind::Semi)?;
                    Ok(Stmt::Eval(e))
                }
            }
        }
    }

    // ---- expressions, precedence climbing, loosest first ----

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.at(TokenKind::PipePipe) {
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.eq_expr()?;
        while self.at(TokenKind::AmpAmp) {
            self.advance();
            let rhs = self.eq_expr()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn eq_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.rel_expr()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::EqEq) => BinOp::Eq,
                Some(TokenKind::Ne) => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.rel_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn rel_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.bitor_expr()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Lt) => BinOp::Lt,
                Some(TokenKind::Le) => BinOp::Le,
                Some(TokenKind::Gt) => BinOp::Gt,
                Some(TokenKind::Ge) => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.bitor_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bitor_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.bitxor_expr()?;
        while self.at(TokenKind::Pipe) {
            self.advance();
            let rhs = self.bitxor_expr()?;
            lhs = Expr::Binary(BinOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bitxor_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.bitand_expr()?;
        while self.at(TokenKind::Caret) {
            self.advance();
            let rhs = self.bitand_expr()?;
            lhs = Expr::Binary(BinOp::BitXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bitand_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.shift_expr()?;
        while self.at(TokenKind::Amp) {
            self.advance();
            let rhs = self.shift_expr()?;
            lhs = Expr::Binary(BinOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn shift_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.add_expr()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Shl) => BinOp::Shl,
                Some(TokenKind::Shr) => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.add_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn add_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.mul_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Percent) => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(TokenKind::Minus) => {
                self.advance();
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.unary_expr()?)))
            }
            Some(TokenKind::Bang) => {
                self.advance();
                Ok(Expr::Unary(UnOp::Not, Box::new(self.unary_expr()?)))
            }
            Some(TokenKind::Tilde) => {
                self.advance();
                Ok(Expr::Unary(UnOp::BitNot, Box::new(self.unary_expr()?)))
            }
            Some(TokenKind::Amp) => {
                self.advance();
                Ok(Expr::AddressOf(Box::new(self.unary_expr()?)))
            }
            Some(TokenKind::Star) => {
                self.advance();
                Ok(Expr::Deref(Box::new(self.unary_expr()?)))
            }
            _ => self.postfix_expr(),
        }
    }

    fn postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.primary_expr()?;
        loop {
            match self.peek() {
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let idx = self.expr()?;
                    self.expect(TokenKind::RBracket)?;
                    e = Expr::Index(Box::new(e), Box::new(idx));
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn primary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(TokenKind::Num) => {
                let t = self.advance().unwrap();
                let v: i64 = t
                    .text
                    .parse()
                    .map_err(|_| ParseError(format!("bad integer literal '{}'", t.text)))?;
                Ok(Expr::IntConst(v))
            }
            Some(TokenKind::True) => {
                self.advance();
                Ok(Expr::BoolConst(true))
            }
            Some(TokenKind::False) => {
                self.advance();
                Ok(Expr::BoolConst(false))
            }
            Some(TokenKind::Null) => {
                self.advance();
                Ok(Expr::Null)
            }
            Some(TokenKind::Alloc) => {
                self.advance();
                let ty = self.base_type()?;
                self.expect(TokenKind::LBracket)?;
                let n = self.expr()?;
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Alloc(ty, Box::new(n)))
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let e = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            Some(TokenKind::Id) => {
                let name_text = self.peek_text().unwrap();
                let name: Id = internment::Intern::new(name_text.to_string());
                self.advance();
                if self.at(TokenKind::LParen) {
                    self.advance();
                    let mut args = vec![];
                    if !self.at(TokenKind::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.at(TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            other => err(format!("expected an expression, found {other:?}")),
        }
    }
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let toks = Lexer::new(input)
        .tokenize()
        .map_err(|e| ParseError(e.to_string()))?;
    let mut p = Parser { toks, pos: 0 };
    let prog = p.program()?;
    if p.pos != p.toks.len() {
        return err(format!(
            "unexpected trailing input at token {}: {:?}",
            p.pos,
            p.toks.get(p.pos).map(|t| t.kind)
        ));
    }
    Ok(prog)
}
