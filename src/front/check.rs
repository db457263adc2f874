//! Type checking: a straightforward bidirectional pass over the untyped
//! AST, producing a typed AST the middle-end's lowerer consumes. As with
//! the rest of the front-end, this is a collaborator (spec §1) kept
//! complete enough to drive the middle-end with real programs, not the
//! focus of this crate.

use crate::common::{Id, Map, Ty};
use crate::errors::{BxError, Result};

use super::ast;

#[derive(Debug)]
pub struct Program {
    pub globals: Vec<GlobalDecl>,
    pub callables: Vec<CallableDecl>,
}

#[derive(Debug)]
pub struct GlobalDecl {
    pub name: Id,
    pub ty: Ty,
    pub init: Expr,
}

#[derive(Debug)]
pub struct CallableDecl {
    pub name: Id,
    pub params: Vec<(Id, Ty)>,
    pub ret: Option<Ty>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub enum Stmt {
    Declare { name: Id, ty: Ty, init: Option<Expr> },
    Assign { lhs: Expr, rhs: Expr },
    If { cond: Expr, tt: Vec<Stmt>, ff: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    Print(Expr),
    Return(Option<Expr>),
    Eval(Expr),
    Block(Vec<Stmt>),
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Ty,
}

#[derive(Debug)]
pub enum ExprKind {
    IntConst(i64),
    BoolConst(bool),
    Null,
    Var(Id),
    Unary(ast::UnOp, Box<Expr>),
    Binary(ast::BinOp, Box<Expr>, Box<Expr>),
    AddressOf(Box<Expr>),
    Deref(Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Alloc(Ty, Box<Expr>),
    Call(Id, Vec<Expr>),
}

struct Signature {
    params: Vec<Ty>,
    ret: Option<Ty>,
}

struct Checker<'a> {
    globals: &'a Map<Id, Ty>,
    signatures: &'a Map<Id, Signature>,
    scopes: Vec<Map<Id, Ty>>,
    current_ret: Option<Ty>,
}

fn lower_ty(t: &ast::TypeExpr) -> Ty {
    match t {
        ast::TypeExpr::Int64 => Ty::Int64,
        ast::TypeExpr::Bool => Ty::Bool,
        ast::TypeExpr::Pointer(inner) => Ty::Pointer(Box::new(lower_ty(inner))),
        ast::TypeExpr::List(inner, n) => Ty::List(Box::new(lower_ty(inner)), *n),
    }
}

impl<'a> Checker<'a> {
    fn lookup(&self, name: Id) -> Result<Ty> {
        for scope in self.scopes.iter().rev() {
            if let Some(ty) = scope.get(&name) {
                return Ok(ty.clone());
            }
        }
        if let Some(ty) = self.globals.get(&name) {
            return Ok(ty.clone());
        }
        Err(BxError::UndefinedVariable(name))
    }

    fn declare(&mut self, name: Id, ty: Ty) {
        self.scopes.last_mut().unwrap().insert(name, ty);
    }

    fn is_lvalue(e: &ast::Expr) -> bool {
        matches!(e, ast::Expr::Var(_) | ast::Expr::Index(..) | ast::Expr::Deref(_))
    }

    fn expr(&mut self, e: &ast::Expr) -> Result<Expr> {
        use ast::Expr as E;
        let (kind, ty) = match e {
            E::IntConst(v) => (ExprKind::IntConst(*v), Ty::Int64),
            E::BoolConst(v) => (ExprKind::BoolConst(*v), Ty::Bool),
            E::Null => (ExprKind::Null, Ty::Pointer(Box::new(Ty::Int64))),
            E::Var(name) => {
                let ty = self.lookup(*name)?;
                (ExprKind::Var(*name), ty)
            }
            E::Unary(op, inner) => {
                let inner = self.expr(inner)?;
                let ty = match op {
                    ast::UnOp::Neg | ast::UnOp::BitNot => {
                        if inner.ty != Ty::Int64 {
                            return Err(BxError::Type(format!(
                                "unary {op:?} expects int64, found {}",
                                inner.ty
                            )));
                        }
                        Ty::Int64
                    }
                    ast::UnOp::Not => {
                        if inner.ty != Ty::Bool {
                            return Err(BxError::Type(format!(
                                "unary ! expects bool, found {}",
                                inner.ty
                            )));
                        }
                        Ty::Bool
                    }
                };
                (ExprKind::Unary(*op, Box::new(inner)), ty)
            }
            E::Binary(op, l, r) => {
                let l = self.expr(l)?;
                let r = self.expr(r)?;
                let ty = self.binop_ty(*op, &l.ty, &r.ty)?;
                (ExprKind::Binary(*op, Box::new(l), Box::new(r)), ty)
            }
            E::AddressOf(inner) => {
                if !Self::is_lvalue(inner) {
                    return Err(BxError::UnresolvableLValue);
                }
                let inner = self.expr(inner)?;
                let ty = Ty::Pointer(Box::new(inner.ty.clone()));
                (ExprKind::AddressOf(Box::new(inner)), ty)
            }
            E::Deref(inner) => {
                let inner = self.expr(inner)?;
                let ty = match &inner.ty {
                    Ty::Pointer(elem) => (*elem.clone()),
                    other => {
                        return Err(BxError::Type(format!("cannot dereference non-pointer {other}")))
                    }
                };
                (ExprKind::Deref(Box::new(inner)), ty)
            }
            E::Index(base, idx) => {
                let base = self.expr(base)?;
                let idx = self.expr(idx)?;
                if idx.ty != Ty::Int64 {
                    return Err(BxError::Type(format!("index expects int64, found {}", idx.ty)));
                }
                let ty = match &base.ty {
                    Ty::List(elem, _) | Ty::Pointer(elem) => (*elem.clone()),
                    other => return Err(BxError::Type(format!("cannot index into {other}"))),
                };
                (ExprKind::Index(Box::new(base), Box::new(idx)), ty)
            }
            E::Alloc(ty, n) => {
                let elem = lower_ty(ty);
                let n = self.expr(n)?;
                if n.ty != Ty::Int64 {
                    return Err(BxError::Type(format!(
                        "alloc count expects int64, found {}",
                        n.ty
                    )));
                }
                let result_ty = Ty::Pointer(Box::new(elem.clone()));
                (ExprKind::Alloc(elem, Box::new(n)), result_ty)
            }
            E::Call(name, args) => {
                let sig = self
                    .signatures
                    .get(name)
                    .ok_or(BxError::UndefinedCallable(*name))?;
                if sig.params.len() != args.len() {
                    return Err(BxError::ArityMismatch {
                        callee: *name,
                        expected: sig.params.len(),
                        got: args.len(),
                    });
                }
                let ret = sig.ret.clone().ok_or_else(|| {
                    BxError::Type(format!("`{name}` is a proc and has no value to call with"))
                })?;
                let mut checked_args = vec![];
                for a in args {
                    checked_args.push(self.expr(a)?);
                }
                (ExprKind::Call(*name, checked_args), ret)
            }
        };
        Ok(Expr { kind, ty })
    }

    fn binop_ty(&self, op: ast::BinOp, l: &Ty, r: &Ty) -> Result<Ty> {
        use ast::BinOp::*;
        match op {
            Add | Sub | Mul | Div | Rem | Shl | Shr | BitAnd | BitOr | BitXor => {
                if *l == Ty::Int64 && *r == Ty::Int64 {
                    Ok(Ty::Int64)
                } else {
                    Err(BxError::Type(format!("{op:?} expects int64 operands, found {l} and {r}")))
                }
            }
            Lt | Le | Gt | Ge => {
                if *l == Ty::Int64 && *r == Ty::Int64 {
                    Ok(Ty::Bool)
                } else {
                    Err(BxError::Type(format!(
                        "{op:?} expects int64 operands, found {l} and {r}"
                    )))
                }
            }
            Eq | Ne => {
                if l == r {
                    Ok(Ty::Bool)
                } else {
                    Err(BxError::Type(format!("{op:?} expects matching types, found {l} and {r}")))
                }
            }
            And | Or => {
                if *l == Ty::Bool && *r == Ty::Bool {
                    Ok(Ty::Bool)
                } else {
                    Err(BxError::Type(format!("{op:?} expects bool operands, found {l} and {r}")))
                }
            }
        }
    }

    fn stmt(&mut self, s: &ast::Stmt) -> Result<Stmt> {
        use ast::Stmt as S;
        Ok(match s {
            S::Declare { name, ty, init } => {
                let ty = lower_ty(ty);
                let init = match (init, &ty) {
                    (None, Ty::List(..)) => None,
                    (None, other) => {
                        return Err(BxError::Type(format!(
                            "`{name}` of type {other} needs an initializer"
                        )))
                    }
                    (Some(_), Ty::List(..)) => {
                        return Err(BxError::Type(format!(
                            "list `{name}` cannot have a literal initializer"
                        )))
                    }
                    (Some(init), ty) => {
                        let init = self.expr(init)?;
                        if init.ty != *ty {
                            return Err(BxError::Type(format!(
                                "cannot initialize `{name}` of type {ty} with value of type {}",
                                init.ty
                            )));
                        }
                        Some(init)
                    }
                };
                self.declare(*name, ty.clone());
                Stmt::Declare { name: *name, ty, init }
            }
            S::Assign { lhs, rhs } => {
                if !Self::is_lvalue(lhs) {
                    return Err(BxError::UnresolvableLValue);
                }
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                if lhs.ty != rhs.ty {
                    return Err(BxError::Type(format!(
                        "cannot assign value of type {} to l-value of type {}",
                        rhs.ty, lhs.ty
                    )));
                }
                Stmt::Assign { lhs, rhs }
            }
            S::If { cond, tt, ff } => {
                let cond = self.expr(cond)?;
                if cond.ty != Ty::Bool {
                    return Err(BxError::Type(format!("if condition must be bool, found {}", cond.ty)));
                }
                self.scopes.push(Map::new());
                let tt = tt.iter().map(|s| self.stmt(s)).collect::<Result<_>>()?;
                self.scopes.pop();
                self.scopes.push(Map::new());
                let ff = ff.iter().map(|s| self.stmt(s)).collect::<Result<_>>()?;
                self.scopes.pop();
                Stmt::If { cond, tt, ff }
            }
            S::While { cond, body } => {
                let cond = self.expr(cond)?;
                if cond.ty != Ty::Bool {
                    return Err(BxError::Type(format!(
                        "while condition must be bool, found {}",
                        cond.ty
                    )));
                }
                self.scopes.push(Map::new());
                let body = body.iter().map(|s| self.stmt(s)).collect::<Result<_>>()?;
                self.scopes.pop();
                Stmt::While { cond, body }
            }
            S::Print(e) => Stmt::Print(self.expr(e)?),
            S::Return(e) => {
                let e = e.as_ref().map(|e| self.expr(e)).transpose()?;
                let found = e.as_ref().map(|e| e.ty.clone());
                if found != self.current_ret {
                    return Err(BxError::Type(format!(
                        "return type mismatch: expected {:?}, found {:?}",
                        self.current_ret, found
                    )));
                }
                Stmt::Return(e)
            }
            S::Eval(e) => Stmt::Eval(self.expr(e)?),
            S::Block(stmts) => {
                self.scopes.push(Map::new());
                let stmts = stmts.iter().map(|s| self.stmt(s)).collect::<Result<_>>()?;
                self.scopes.pop();
                Stmt::Block(stmts)
            }
        })
    }
}

pub fn check_program(ast: &ast::Program) -> Result<Program> {
    let mut globals = Map::new();
    for g in &ast.globals {
        globals.insert(g.name, lower_ty(&g.ty));
    }

    let mut signatures = Map::new();
    for c in &ast.callables {
        signatures.insert(
            c.name,
            Signature {
                params: c.params.iter().map(|p| lower_ty(&p.ty)).collect(),
                ret: c.ret.as_ref().map(lower_ty),
            },
        );
    }

    if !signatures.contains_key(&internment::Intern::new("main".to_string())) {
        return Err(BxError::MissingMain);
    }

    let mut checked_globals = vec![];
    for g in &ast.globals {
        let mut checker = Checker {
            globals: &globals,
            signatures: &signatures,
            scopes: vec![Map::new()],
            current_ret: None,
        };
        let init = checker.expr(&g.init)?;
        let ty = lower_ty(&g.ty);
        if init.ty != ty {
            return Err(BxError::Type(format!(
                "cannot initialize global `{}` of type {ty} with value of type {}",
                g.name, init.ty
            )));
        }
        checked_globals.push(GlobalDecl {
            name: g.name,
            ty,
            init,
        });
    }

    let mut checked_callables = vec![];
    for c in &ast.callables {
        let sig = &signatures[&c.name];
        let mut scope = Map::new();
        for (p, ty) in c.params.iter().zip(sig.params.iter()) {
            scope.insert(p.name, ty.clone());
        }
        let mut checker = Checker {
            globals: &globals,
            signatures: &signatures,
            scopes: vec![scope],
            current_ret: sig.ret.clone(),
        };
        let body = c
            .body
            .iter()
            .map(|s| checker.stmt(s))
            .collect::<Result<_>>()?;
        checked_callables.push(CallableDecl {
            name: c.name,
            params: c
                .params
                .iter()
                .zip(sig.params.iter())
                .map(|(p, ty)| (p.name, ty.clone()))
                .collect(),
            ret: sig.ret.clone(),
            body,
        });
    }

    Ok(Program {
        globals: checked_globals,
        callables: checked_callables,
    })
}
