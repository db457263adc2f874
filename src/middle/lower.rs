//! Source-to-RTL lowering (spec §4.1): a tree-walking generator that
//! consumes one type-checked `Callable` at a time and produces one RTL
//! `Callable`, using a *label-cursor* discipline instead of building an
//! expression tree of basic blocks up front.
//!
//! The cursor is `in_label`: the label at which the next instruction must
//! be installed. Integer-valued expressions return the pseudo holding
//! their value and leave `in_label` at the point just after it; boolean
//! expressions are lowered short-circuit, returning only the *false*
//! label and leaving `in_label` at the *true* entry — no pseudo is
//! materialized unless something forces it (`intify`).
//!
//! Every local variable is read and written through a single pseudo
//! (`get_pseudo`, mirroring the register file a later allocator would
//! assign) unless its address is taken somewhere in the callable, or it
//! is a list — those instead get a frame offset and go through
//! `Load`/`Store`/`CopyAP`. A pre-pass (`collect_addr_taken`) decides
//! which locals need the frame path before any instruction is emitted.

use crate::common::{Id, Map, Set, Ty};
use crate::errors::Result;
use crate::front::{ast, check};
use crate::middle::globals::layout_globals;
use crate::middle::pseudo::{
    Label, LabelAlloc, MachineReg, Pseudo, PseudoAlloc, ARG_REGISTERS, CALLEE_SAVED,
};
use crate::middle::rtl::{self, BbranchOp, BinopKind, Instr, UbranchOp, UnopKind};

fn runtime_symbol(name: &str) -> Id {
    internment::Intern::new(name.to_string())
}

struct CallableSig {
    returns: bool,
}

#[derive(Clone, Copy)]
enum VarStorage {
    /// Read and written directly, no memory ever involved.
    Pseudo(Pseudo),
    /// Lives in the current frame at this offset from `%rbp`. Used for
    /// any local whose address is taken, and unconditionally for lists
    /// (which have no single scalar value to hold in a pseudo).
    Frame { offset: i64 },
}

struct VarInfo {
    storage: VarStorage,
}

/// Walks a callable's body collecting the names directly address-taken
/// (`&v`, not `&v[i]` or `&*p`) — those need a frame slot instead of a
/// bare pseudo so `CopyAP` has somewhere to point.
fn collect_addr_taken(body: &[check::Stmt]) -> Set<Id> {
    let mut set = Set::new();

    fn walk_expr(e: &check::Expr, set: &mut Set<Id>) {
        use check::ExprKind as K;
        match &e.kind {
            K::AddressOf(inner) => {
                if let K::Var(name) = &inner.kind {
                    set.insert(*name);
                }
                walk_expr(inner, set);
            }
            K::Unary(_, inner) | K::Deref(inner) => walk_expr(inner, set),
            K::Binary(_, l, r) | K::Index(l, r) => {
                walk_expr(l, set);
                walk_expr(r, set);
            }
            K::Alloc(_, n) => walk_expr(n, set),
            K::Call(_, args) => {
                for a in args {
                    walk_expr(a, set);
                }
            }
            K::IntConst(_) | K::BoolConst(_) | K::Null | K::Var(_) => {}
        }
    }

    fn walk_stmt(s: &check::Stmt, set: &mut Set<Id>) {
        use check::Stmt as S;
        match s {
            S::Declare { init, .. } => {
                if let Some(e) = init {
                    walk_expr(e, set);
                }
            }
            S::Assign { lhs, rhs } => {
                walk_expr(lhs, set);
                walk_expr(rhs, set);
            }
            S::If { cond, tt, ff } => {
                walk_expr(cond, set);
                tt.iter().for_each(|s| walk_stmt(s, set));
                ff.iter().for_each(|s| walk_stmt(s, set));
            }
            S::While { cond, body } => {
                walk_expr(cond, set);
                body.iter().for_each(|s| walk_stmt(s, set));
            }
            S::Print(e) | S::Eval(e) => walk_expr(e, set),
            S::Return(e) => {
                if let Some(e) = e {
                    walk_expr(e, set);
                }
            }
            S::Block(stmts) => stmts.iter().for_each(|s| walk_stmt(s, set)),
        }
    }

    body.iter().for_each(|s| walk_stmt(s, &mut set));
    set
}

struct CallableLowerer<'a> {
    globals: &'a Map<Id, Ty>,
    signatures: &'a Map<Id, CallableSig>,
    labels: LabelAlloc,
    pseudos: PseudoAlloc,
    callable: rtl::Callable,
    in_label: Label,
    vars: Map<Id, VarInfo>,
    addr_taken: Set<Id>,
    next_offset: i64,
}

impl<'a> CallableLowerer<'a> {
    fn new(name: Id, globals: &'a Map<Id, Ty>, signatures: &'a Map<Id, CallableSig>) -> Self {
        let mut labels = LabelAlloc::new();
        let enter = labels.fresh();
        let leave = labels.fresh();
        CallableLowerer {
            globals,
            signatures,
            pseudos: PseudoAlloc::new(),
            callable: rtl::Callable::new(name, enter, leave),
            in_label: enter,
            vars: Map::new(),
            addr_taken: Set::new(),
            next_offset: 0,
        }
    }

    fn fresh_label(&mut self) -> Label {
        self.labels.fresh()
    }

    fn fresh_pseudo(&mut self) -> Pseudo {
        self.pseudos.fresh()
    }

    fn install(&mut self, label: Label, instr: Instr) {
        self.callable.install(label, instr);
    }

    /// Installs `make(L')` at the current cursor and advances it to `L'`.
    fn add_sequential(&mut self, make: impl FnOnce(Label) -> Instr) {
        let next = self.fresh_label();
        let here = self.in_label;
        self.install(here, make(next));
        self.in_label = next;
    }

    fn alloc_frame_slot(&mut self, size: i64) -> i64 {
        self.next_offset += size;
        self.next_offset
    }

    // ---- l-values ----

    fn var_address(&mut self, name: Id) -> Pseudo {
        if self.globals.contains_key(&name) {
            let dst = self.fresh_pseudo();
            self.add_sequential(|succ| Instr::CopyAP {
                symbol: Some(name),
                offset: 0,
                base: MachineReg::Rip,
                dst,
                succ,
            });
            return dst;
        }
        let offset = match self.vars[&name].storage {
            VarStorage::Frame { offset } => offset,
            VarStorage::Pseudo(_) => {
                unreachable!("address taken of `{name}`, which has no frame slot")
            }
        };
        let dst = self.fresh_pseudo();
        self.add_sequential(|succ| Instr::CopyAP {
            symbol: None,
            offset,
            base: MachineReg::Rbp,
            dst,
            succ,
        });
        dst
    }

    fn lower_index_address(&mut self, base: &check::Expr, idx: &check::Expr) -> Pseudo {
        let base_addr = match &base.ty {
            Ty::List(..) => self.lower_address(base),
            Ty::Pointer(..) => self.lower_int(base),
            other => unreachable!("index base must be list or pointer, found {other}"),
        };
        let elem_ty = base
            .ty
            .element_ty()
            .expect("index base must be list or pointer");
        let elem_size = elem_ty.size_of();
        let idx_val = self.lower_int(idx);
        let scaled = self.fresh_pseudo();
        self.add_sequential(|succ| Instr::Move {
            imm: elem_size,
            dst: scaled,
            succ,
        });
        self.add_sequential(|succ| Instr::Binop {
            op: BinopKind::Mul,
            src: idx_val,
            dst: scaled,
            succ,
        });
        let addr = self.fresh_pseudo();
        self.add_sequential(|succ| Instr::Copy {
            src: base_addr,
            dst: addr,
            succ,
        });
        // List storage grows downward from the base address.
        self.add_sequential(|succ| Instr::Binop {
            op: BinopKind::Sub,
            src: scaled,
            dst: addr,
            succ,
        });
        addr
    }

    /// Computes the address of an l-value expression (spec §4.1.3, the
    /// "Addressor" role).
    fn lower_address(&mut self, e: &check::Expr) -> Pseudo {
        use check::ExprKind as K;
        match &e.kind {
            K::Var(name) => self.var_address(*name),
            K::Index(base, idx) => self.lower_index_address(base, idx),
            // The address denoted by `*p` is simply `p`'s value.
            K::Deref(inner) => self.lower_int(inner),
            _ => unreachable!("checker guarantees only l-values reach the Addressor"),
        }
    }

    fn raw_deref_value(&mut self, e: &check::Expr) -> Pseudo {
        let addr = self.lower_address(e);
        let dst = self.fresh_pseudo();
        self.add_sequential(|succ| Instr::Load {
            symbol: None,
            offset: 0,
            base: addr,
            dst,
            succ,
        });
        dst
    }

    fn raw_index_value(&mut self, base: &check::Expr, idx: &check::Expr) -> Pseudo {
        let addr = self.lower_index_address(base, idx);
        let dst = self.fresh_pseudo();
        self.add_sequential(|succ| Instr::Load {
            symbol: None,
            offset: 0,
            base: addr,
            dst,
            succ,
        });
        dst
    }

    fn get_var_value(&mut self, name: Id) -> Pseudo {
        if self.globals.contains_key(&name) {
            let dst = self.fresh_pseudo();
            self.add_sequential(|succ| Instr::Load {
                symbol: Some(name),
                offset: 0,
                base: Pseudo::DISCARD,
                dst,
                succ,
            });
            return dst;
        }
        match self.vars[&name].storage {
            VarStorage::Pseudo(p) => p,
            VarStorage::Frame { offset } => {
                let addr = self.fresh_pseudo();
                self.add_sequential(|succ| Instr::CopyAP {
                    symbol: None,
                    offset,
                    base: MachineReg::Rbp,
                    dst: addr,
                    succ,
                });
                let dst = self.fresh_pseudo();
                self.add_sequential(|succ| Instr::Load {
                    symbol: None,
                    offset: 0,
                    base: addr,
                    dst,
                    succ,
                });
                dst
            }
        }
    }

    // ---- expressions ----

    fn branch_on(&mut self, val: Pseudo) -> Label {
        let taken = self.fresh_label();
        let fallthrough = self.fresh_label();
        let here = self.in_label;
        self.install(
            here,
            Instr::Ubranch {
                op: UbranchOp::Jnz,
                arg: val,
                taken,
                fallthrough,
            },
        );
        self.in_label = taken;
        fallthrough
    }

    /// Materializes a bool cursor state (`in_label` = true entry,
    /// `false_label` = false entry) into a 0/1 int pseudo.
    fn intify(&mut self, false_label: Label) -> Pseudo {
        let p = self.fresh_pseudo();
        let true_label = self.in_label;
        let merge = self.fresh_label();
        self.install(
            true_label,
            Instr::Move {
                imm: 1,
                dst: p,
                succ: merge,
            },
        );
        self.install(
            false_label,
            Instr::Move {
                imm: 0,
                dst: p,
                succ: merge,
            },
        );
        self.in_label = merge;
        p
    }

    fn lower_call(&mut self, name: Id, args: &[check::Expr]) -> Pseudo {
        let vals: Vec<Pseudo> = args.iter().map(|a| self.lower_int(a)).collect();
        let nargs = vals.len();
        for (reg, val) in ARG_REGISTERS.iter().zip(vals.iter()) {
            let reg = *reg;
            let val = *val;
            self.add_sequential(|succ| Instr::CopyPM {
                src: val,
                dst: reg,
                succ,
            });
        }
        for val in vals.iter().skip(ARG_REGISTERS.len()).rev() {
            let val = *val;
            self.add_sequential(|succ| Instr::Push { src: val, succ });
        }
        self.add_sequential(|succ| Instr::Call {
            func: name,
            nargs,
            succ,
        });
        if self.signatures[&name].returns {
            let dst = self.fresh_pseudo();
            self.add_sequential(|succ| Instr::CopyMP {
                src: MachineReg::Rax,
                dst,
                succ,
            });
            dst
        } else {
            Pseudo::DISCARD
        }
    }

    fn lower_alloc(&mut self, elem_ty: &Ty, n: &check::Expr) -> Pseudo {
        let count = self.lower_int(n);
        let size_p = self.fresh_pseudo();
        let elem_size = elem_ty.size_of();
        self.add_sequential(|succ| Instr::Move {
            imm: elem_size,
            dst: size_p,
            succ,
        });
        self.add_sequential(|succ| Instr::Binop {
            op: BinopKind::Mul,
            src: count,
            dst: size_p,
            succ,
        });
        self.add_sequential(|succ| Instr::CopyPM {
            src: size_p,
            dst: MachineReg::Rdi,
            succ,
        });
        self.add_sequential(|succ| Instr::Call {
            func: runtime_symbol("malloc"),
            nargs: 1,
            succ,
        });
        let dst = self.fresh_pseudo();
        self.add_sequential(|succ| Instr::CopyMP {
            src: MachineReg::Rax,
            dst,
            succ,
        });
        dst
    }

    /// Lowers any expression to an int-valued pseudo, intifying
    /// short-circuit boolean results on demand.
    fn lower_int(&mut self, e: &check::Expr) -> Pseudo {
        if e.ty == Ty::Bool {
            let false_label = self.lower_bool(e);
            return self.intify(false_label);
        }
        use check::ExprKind as K;
        match &e.kind {
            K::IntConst(v) => {
                let p = self.fresh_pseudo();
                let v = *v;
                self.add_sequential(|succ| Instr::Move { imm: v, dst: p, succ });
                p
            }
            K::Null => {
                let p = self.fresh_pseudo();
                self.add_sequential(|succ| Instr::Move { imm: 0, dst: p, succ });
                p
            }
            K::BoolConst(_) => unreachable!("bool-typed expressions are handled above"),
            K::Var(name) => self.get_var_value(*name),
            K::Unary(op, inner) => {
                let v = self.lower_int(inner);
                let dst = self.fresh_pseudo();
                self.add_sequential(|succ| Instr::Copy { src: v, dst, succ });
                let kind = match op {
                    ast::UnOp::Neg => UnopKind::Neg,
                    ast::UnOp::BitNot => UnopKind::Not,
                    ast::UnOp::Not => unreachable!("bool-typed expressions are handled above"),
                };
                self.add_sequential(|succ| Instr::Unop { op: kind, arg: dst, succ });
                dst
            }
            K::Binary(op, l, r) => {
                use ast::BinOp::*;
                let kind = match op {
                    Add => BinopKind::Add,
                    Sub => BinopKind::Sub,
                    Mul => BinopKind::Mul,
                    Div => BinopKind::Div,
                    Rem => BinopKind::Rem,
                    Shl => BinopKind::Sal,
                    Shr => BinopKind::Sar,
                    BitAnd => BinopKind::And,
                    BitOr => BinopKind::Or,
                    BitXor => BinopKind::Xor,
                    Lt | Le | Gt | Ge | Eq | Ne | And | Or => {
                        unreachable!("bool-typed expressions are handled above")
                    }
                };
                let lv = self.lower_int(l);
                let dst = self.fresh_pseudo();
                self.add_sequential(|succ| Instr::Copy { src: lv, dst, succ });
                let rv = self.lower_int(r);
                self.add_sequential(|succ| Instr::Binop { op: kind, src: rv, dst, succ });
                dst
            }
            K::AddressOf(inner) => self.lower_address(inner),
            K::Deref(_) => self.raw_deref_value(e),
            K::Index(base, idx) => self.raw_index_value(base, idx),
            K::Alloc(elem_ty, n) => self.lower_alloc(elem_ty, n),
            K::Call(name, args) => self.lower_call(*name, args),
        }
    }

    /// Lowers a bool-typed expression short-circuit; returns the false
    /// label and leaves `in_label` at the true entry.
    fn lower_bool(&mut self, e: &check::Expr) -> Label {
        use check::ExprKind as K;
        match &e.kind {
            K::BoolConst(true) => self.fresh_label(),
            K::BoolConst(false) => {
                let false_label = self.in_label;
                self.in_label = self.fresh_label();
                false_label
            }
            K::Var(name) => {
                let val = self.get_var_value(*name);
                self.branch_on(val)
            }
            K::Deref(_) => {
                let v = self.raw_deref_value(e);
                self.branch_on(v)
            }
            K::Index(base, idx) => {
                let v = self.raw_index_value(base, idx);
                self.branch_on(v)
            }
            K::Call(name, args) => {
                let v = self.lower_call(*name, args);
                self.branch_on(v)
            }
            K::Unary(ast::UnOp::Not, inner) => {
                let inner_false = self.lower_bool(inner);
                let inner_true = self.in_label;
                self.in_label = inner_false;
                inner_true
            }
            K::Binary(op, l, r) => {
                use ast::BinOp::*;
                match op {
                    Lt | Le | Gt | Ge | Eq | Ne => {
                        let lv = self.lower_int(l);
                        let rv = self.lower_int(r);
                        let bop = match op {
                            Lt => BbranchOp::Jl,
                            Le => BbranchOp::Jle,
                            Gt => BbranchOp::Jg,
                            Ge => BbranchOp::Jge,
                            Eq => BbranchOp::Je,
                            Ne => BbranchOp::Jne,
                            _ => unreachable!(),
                        };
                        let taken = self.fresh_label();
                        let fallthrough = self.fresh_label();
                        let here = self.in_label;
                        self.install(
                            here,
                            Instr::Bbranch {
                                op: bop,
                                a: lv,
                                b: rv,
                                taken,
                                fallthrough,
                            },
                        );
                        self.in_label = taken;
                        fallthrough
                    }
                    And => {
                        let left_false = self.lower_bool(l);
                        let right_false = self.lower_bool(r);
                        self.install(right_false, Instr::Goto { succ: left_false });
                        left_false
                    }
                    Or => {
                        let left_false = self.lower_bool(l);
                        let left_true = self.in_label;
                        self.in_label = left_false;
                        let right_false = self.lower_bool(r);
                        let right_true = self.in_label;
                        self.install(right_true, Instr::Goto { succ: left_true });
                        self.in_label = left_true;
                        right_false
                    }
                    _ => unreachable!("non-bool binop reached lower_bool"),
                }
            }
            _ => unreachable!("non-bool-typed expression reached lower_bool"),
        }
    }

    // ---- statements ----

    fn lower_declare(&mut self, name: Id, ty: &Ty, init: &Option<check::Expr>) {
        match ty {
            Ty::List(_, _) => {
                let size = ty.size_of();
                let offset = self.alloc_frame_slot(size);
                self.vars
                    .insert(name, VarInfo { storage: VarStorage::Frame { offset } });
                let addr = self.fresh_pseudo();
                self.add_sequential(|succ| Instr::CopyAP {
                    symbol: None,
                    offset,
                    base: MachineReg::Rbp,
                    dst: addr,
                    succ,
                });
                self.add_sequential(|succ| Instr::CopyPM {
                    src: addr,
                    dst: MachineReg::Rdi,
                    succ,
                });
                let zero = self.fresh_pseudo();
                self.add_sequential(|succ| Instr::Move { imm: 0, dst: zero, succ });
                self.add_sequential(|succ| Instr::CopyPM {
                    src: zero,
                    dst: MachineReg::Rsi,
                    succ,
                });
                let size_p = self.fresh_pseudo();
                self.add_sequential(|succ| Instr::Move { imm: size, dst: size_p, succ });
                self.add_sequential(|succ| Instr::CopyPM {
                    src: size_p,
                    dst: MachineReg::Rdx,
                    succ,
                });
                self.add_sequential(|succ| Instr::Call {
                    func: runtime_symbol("memset"),
                    nargs: 3,
                    succ,
                });
            }
            _ => {
                let needs_frame = self.addr_taken.contains(&name);
                let storage = if needs_frame {
                    let offset = self.alloc_frame_slot(ty.size_of());
                    VarStorage::Frame { offset }
                } else {
                    VarStorage::Pseudo(self.fresh_pseudo())
                };
                self.vars.insert(name, VarInfo { storage });
                let init_expr = init
                    .as_ref()
                    .expect("checker guarantees a scalar declare has an initializer");
                let v = self.lower_int(init_expr);
                match storage {
                    VarStorage::Pseudo(dst) => {
                        self.add_sequential(|succ| Instr::Copy { src: v, dst, succ })
                    }
                    VarStorage::Frame { offset } => {
                        let addr = self.fresh_pseudo();
                        self.add_sequential(|succ| Instr::CopyAP {
                            symbol: None,
                            offset,
                            base: MachineReg::Rbp,
                            dst: addr,
                            succ,
                        });
                        self.add_sequential(|succ| Instr::Store {
                            src: v,
                            symbol: None,
                            offset: 0,
                            base: addr,
                            succ,
                        });
                    }
                }
            }
        }
    }

    fn lower_assign(&mut self, lhs: &check::Expr, rhs: &check::Expr) {
        if let check::ExprKind::Var(name) = &lhs.kind {
            if !self.globals.contains_key(name) {
                if let VarStorage::Pseudo(dst) = self.vars[name].storage {
                    let v = self.lower_int(rhs);
                    self.add_sequential(|succ| Instr::Copy { src: v, dst, succ });
                    return;
                }
            }
        }
        let addr = self.lower_address(lhs);
        let v = self.lower_int(rhs);
        self.add_sequential(|succ| Instr::Store {
            src: v,
            symbol: None,
            offset: 0,
            base: addr,
            succ,
        });
    }

    fn lower_if(&mut self, cond: &check::Expr, tt: &[check::Stmt], ff: &[check::Stmt]) {
        let false_label = self.lower_bool(cond);
        for s in tt {
            self.lower_stmt(s);
        }
        let merge = self.fresh_label();
        let after_then = self.in_label;
        self.install(after_then, Instr::Goto { succ: merge });
        self.in_label = false_label;
        for s in ff {
            self.lower_stmt(s);
        }
        let after_else = self.in_label;
        self.install(after_else, Instr::Goto { succ: merge });
        self.in_label = merge;
    }

    fn lower_while(&mut self, cond: &check::Expr, body: &[check::Stmt]) {
        let cond_entry = self.in_label;
        let false_label = self.lower_bool(cond);
        for s in body {
            self.lower_stmt(s);
        }
        let after_body = self.in_label;
        self.install(after_body, Instr::Goto { succ: cond_entry });
        self.in_label = false_label;
    }

    fn lower_return(&mut self, e: &Option<check::Expr>) {
        if let Some(e) = e {
            let v = self.lower_int(e);
            if let Some(out) = self.callable.output {
                self.add_sequential(|succ| Instr::Copy { src: v, dst: out, succ });
            }
        }
        let leave = self.callable.leave;
        let here = self.in_label;
        self.install(here, Instr::Goto { succ: leave });
        // Anything textually following `return` is unreachable, but still
        // needs a label to install into.
        self.in_label = self.fresh_label();
    }

    fn lower_print(&mut self, e: &check::Expr) {
        let is_bool = e.ty == Ty::Bool;
        let v = self.lower_int(e);
        self.add_sequential(|succ| Instr::CopyPM {
            src: v,
            dst: MachineReg::Rdi,
            succ,
        });
        let func = runtime_symbol(if is_bool { "bx_print_bool" } else { "bx_print_int" });
        self.add_sequential(|succ| Instr::Call { func, nargs: 1, succ });
    }

    fn lower_stmt(&mut self, s: &check::Stmt) {
        use check::Stmt as S;
        match s {
            S::Declare { name, ty, init } => self.lower_declare(*name, ty, init),
            S::Assign { lhs, rhs } => self.lower_assign(lhs, rhs),
            S::If { cond, tt, ff } => self.lower_if(cond, tt, ff),
            S::While { cond, body } => self.lower_while(cond, body),
            S::Print(e) => self.lower_print(e),
            S::Return(e) => self.lower_return(e),
            S::Eval(e) => {
                self.lower_int(e);
            }
            S::Block(stmts) => stmts.iter().for_each(|s| self.lower_stmt(s)),
        }
    }

    fn run(mut self, c: &check::CallableDecl) -> rtl::Callable {
        let body_start = self.fresh_label();
        self.in_label = body_start;
        self.addr_taken = collect_addr_taken(&c.body);

        let mut saved = vec![];
        for reg in CALLEE_SAVED {
            let p = self.fresh_pseudo();
            self.add_sequential(|succ| Instr::CopyMP { src: reg, dst: p, succ });
            saved.push(p);
        }

        self.callable.output = c.ret.as_ref().map(|_| self.fresh_pseudo());

        let mut inputs = vec![];
        for (i, (pname, pty)) in c.params.iter().enumerate() {
            let incoming = if i < ARG_REGISTERS.len() {
                let p = self.fresh_pseudo();
                let reg = ARG_REGISTERS[i];
                self.add_sequential(|succ| Instr::CopyMP { src: reg, dst: p, succ });
                p
            } else {
                let p = self.fresh_pseudo();
                let slot = (i - ARG_REGISTERS.len() + 1) as i64;
                self.add_sequential(|succ| Instr::LoadParam { slot, dst: p, succ });
                p
            };
            let needs_frame = self.addr_taken.contains(pname) || matches!(pty, Ty::List(..));
            let storage = if needs_frame {
                let offset = self.alloc_frame_slot(pty.size_of());
                let addr = self.fresh_pseudo();
                self.add_sequential(|succ| Instr::CopyAP {
                    symbol: None,
                    offset,
                    base: MachineReg::Rbp,
                    dst: addr,
                    succ,
                });
                self.add_sequential(|succ| Instr::Store {
                    src: incoming,
                    symbol: None,
                    offset: 0,
                    base: addr,
                    succ,
                });
                VarStorage::Frame { offset }
            } else {
                VarStorage::Pseudo(incoming)
            };
            self.vars.insert(*pname, VarInfo { storage });
            inputs.push(incoming);
        }

        for s in &c.body {
            self.lower_stmt(s);
        }

        if let Some(out) = self.callable.output {
            self.add_sequential(|succ| Instr::CopyPM {
                src: out,
                dst: MachineReg::Rax,
                succ,
            });
        }

        let leave = self.callable.leave;
        let before_leave = self.in_label;
        self.install(before_leave, Instr::Goto { succ: leave });
        self.in_label = leave;

        for (reg, p) in CALLEE_SAVED.iter().zip(saved.iter()).rev() {
            let reg = *reg;
            let p = *p;
            self.add_sequential(|succ| Instr::CopyPM { src: p, dst: reg, succ });
        }
        self.add_sequential(|succ| Instr::DelFrame { succ });
        let ret_label = self.in_label;
        self.install(ret_label, Instr::Return);

        let enter = self.callable.enter;
        let frame_size = self.next_offset;
        self.install(
            enter,
            Instr::NewFrame { size: frame_size, succ: body_start },
        );
        // `enter`'s instruction can only be installed once `next_offset`
        // is final, so it lands at the end of the schedule above; move it
        // to the front, since `schedule` is the linear emission order and
        // execution always starts at `enter` (spec §3, "schedule").
        let enter_pos = self
            .callable
            .schedule
            .iter()
            .position(|&l| l == enter)
            .expect("enter label just installed");
        self.callable.schedule.remove(enter_pos);
        self.callable.schedule.insert(0, enter);

        self.callable.inputs = inputs;
        self.callable
    }
}

pub fn lower_program(checked: &check::Program) -> Result<rtl::Program> {
    let layout = layout_globals(checked)?;

    let globals: Map<Id, Ty> = checked
        .globals
        .iter()
        .map(|g| (g.name, g.ty.clone()))
        .collect();

    let signatures: Map<Id, CallableSig> = checked
        .callables
        .iter()
        .map(|c| (c.name, CallableSig { returns: c.ret.is_some() }))
        .collect();

    let callables = checked
        .callables
        .iter()
        .map(|c| CallableLowerer::new(c.name, &globals, &signatures).run(c))
        .collect();

    Ok(rtl::Program { callables, globals: layout.initializers })
}
