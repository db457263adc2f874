//! The RTL instruction set, `Callable` container, and `Program` (spec §3).
//!
//! Each `Instr` carries the successor label(s) that make up its CFG edges
//! directly as fields (`succ`, or `taken`/`fallthrough` for the two
//! branching shapes), the same way the teacher's `middle/tir.rs`
//! `Terminator` carried jump targets alongside instructions, generalized
//! to one instruction set instead of separate instruction/terminator
//! lists (RTL's branches are themselves instructions with successors,
//! spec §3).

use crate::common::Id;
use crate::middle::pseudo::{Label, MachineReg, Pseudo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnopKind {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinopKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Sal,
    Sar,
    And,
    Or,
    Xor,
}

/// `Ubranch` compares its argument against zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UbranchOp {
    Jz,
    Jnz,
}

/// `Bbranch` compares two pseudos. Each has a negation, used by the
/// assembly translator to turn "jump if true" into "jump to the false
/// label unless" (spec §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BbranchOp {
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
}

impl BbranchOp {
    pub fn negate(self) -> BbranchOp {
        use BbranchOp::*;
        match self {
            Je => Jne,
            Jne => Je,
            Jl => Jge,
            Jle => Jg,
            Jg => Jle,
            Jge => Jl,
        }
    }
}

/// One RTL instruction. Every variant but `Return` carries the label(s) of
/// its successor(s) in the CFG.
#[derive(Clone, Debug)]
pub enum Instr {
    Move {
        imm: i64,
        dst: Pseudo,
        succ: Label,
    },
    Copy {
        src: Pseudo,
        dst: Pseudo,
        succ: Label,
    },
    CopyMP {
        src: MachineReg,
        dst: Pseudo,
        succ: Label,
    },
    CopyPM {
        src: Pseudo,
        dst: MachineReg,
        succ: Label,
    },
    /// Computes an effective address into `dst`. When `symbol` is present
    /// this is `symbol(%rip)`, naming a global; otherwise it is
    /// `offset(%base)`, naming a location in the current frame (`base` is
    /// `rbp` for every local the lowerer emits, spec §9 open question
    /// resolved in DESIGN.md).
    CopyAP {
        symbol: Option<Id>,
        offset: i64,
        base: MachineReg,
        dst: Pseudo,
        succ: Label,
    },
    /// Reads memory into `dst`: `symbol(%rip)+offset` when `symbol` is
    /// present (a global), otherwise `offset(base)` where `base` is a
    /// pseudo already holding a computed address (list elements,
    /// dereferences).
    Load {
        symbol: Option<Id>,
        offset: i64,
        base: Pseudo,
        dst: Pseudo,
        succ: Label,
    },
    /// Symmetric to `Load`: writes `src` to `symbol(%rip)+offset` or
    /// `offset(base)`.
    Store {
        src: Pseudo,
        symbol: Option<Id>,
        offset: i64,
        base: Pseudo,
        succ: Label,
    },
    Unop {
        op: UnopKind,
        arg: Pseudo,
        succ: Label,
    },
    Binop {
        op: BinopKind,
        src: Pseudo,
        dst: Pseudo,
        succ: Label,
    },
    Ubranch {
        op: UbranchOp,
        arg: Pseudo,
        taken: Label,
        fallthrough: Label,
    },
    Bbranch {
        op: BbranchOp,
        a: Pseudo,
        b: Pseudo,
        taken: Label,
        fallthrough: Label,
    },
    Goto {
        succ: Label,
    },
    Call {
        func: Id,
        nargs: usize,
        succ: Label,
    },
    Return,
    NewFrame {
        size: i64,
        succ: Label,
    },
    DelFrame {
        succ: Label,
    },
    LoadParam {
        slot: i64,
        dst: Pseudo,
        succ: Label,
    },
    Push {
        src: Pseudo,
        succ: Label,
    },
    Pop {
        dst: Pseudo,
        succ: Label,
    },
}

impl Instr {
    /// The successor labels this instruction's CFG edges point to.
    pub fn successors(&self) -> Vec<Label> {
        use Instr::*;
        match self {
            Move { succ, .. }
            | Copy { succ, .. }
            | CopyMP { succ, .. }
            | CopyPM { succ, .. }
            | CopyAP { succ, .. }
            | Load { succ, .. }
            | Store { succ, .. }
            | Unop { succ, .. }
            | Binop { succ, .. }
            | Goto { succ }
            | Call { succ, .. }
            | NewFrame { succ, .. }
            | DelFrame { succ }
            | LoadParam { succ, .. }
            | Push { succ, .. }
            | Pop { succ, .. } => vec![*succ],
            Ubranch { taken, fallthrough, .. } | Bbranch { taken, fallthrough, .. } => {
                vec![*taken, *fallthrough]
            }
            Return => vec![],
        }
    }
}

/// A procedure or function unit: prologue/body/epilogue plus a
/// linearization schedule (spec §3, "Callable").
pub struct Callable {
    pub name: Id,
    pub enter: Label,
    pub leave: Label,
    pub inputs: Vec<Pseudo>,
    /// `None` for a `proc`; `Some` for a `fun`, naming the pseudo its
    /// `Return` statements copy their value into.
    pub output: Option<Pseudo>,
    pub body: crate::common::Map<Label, Instr>,
    pub schedule: Vec<Label>,
}

impl Callable {
    pub fn new(name: Id, enter: Label, leave: Label) -> Self {
        Callable {
            name,
            enter,
            leave,
            inputs: vec![],
            output: None,
            body: crate::common::Map::new(),
            schedule: vec![],
        }
    }

    /// Install an instruction at `label`. Installing two instructions at
    /// the same label is a bug in the lowerer, not a user-facing error
    /// (spec §7), so it is an assertion rather than a `Result`.
    pub fn install(&mut self, label: Label, instr: Instr) {
        assert!(
            self.body.insert(label, instr).is_none(),
            "duplicate label installation: {label:?} in `{}`",
            self.name
        );
        self.schedule.push(label);
    }

    /// Checks the CFG invariants spec §3/§8 calls out. Used by tests and
    /// by the driver in debug builds after lowering each callable.
    pub fn validate(&self) -> Result<(), String> {
        if !self.body.contains_key(&self.enter) {
            return Err(format!("enter label {:?} not in body", self.enter));
        }
        match self.body.get(&self.leave) {
            Some(Instr::Return) => {}
            Some(other) => {
                return Err(format!(
                    "leave label {:?} does not terminate in Return (found {other:?})",
                    self.leave
                ))
            }
            None => return Err(format!("leave label {:?} missing from body", self.leave)),
        }
        for (label, instr) in &self.body {
            for succ in instr.successors() {
                if !self.body.contains_key(&succ) {
                    return Err(format!(
                        "instruction at {label:?} references undefined successor {succ:?}"
                    ));
                }
            }
        }
        let body_keys: crate::common::Set<Label> = self.body.keys().copied().collect();
        let schedule_keys: crate::common::Set<Label> = self.schedule.iter().copied().collect();
        if self.schedule.len() != body_keys.len() || schedule_keys != body_keys {
            return Err("schedule is not a permutation of body's keys".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{}({}) -> {} [enter={:?} leave={:?}]",
            self.name,
            self.inputs
                .iter()
                .map(|p| format!("{p:?}"))
                .collect::<Vec<_>>()
                .join(", "),
            self.output
                .map(|p| format!("{p:?}"))
                .unwrap_or_else(|| "void".to_string()),
            self.enter,
            self.leave
        )?;
        for label in &self.schedule {
            writeln!(f, "  {:?}: {:?}", label, self.body[label])?;
        }
        Ok(())
    }
}

/// An ordered sequence of `Callable`s plus the process's global variables,
/// each mapped to its 32-bit integer initializer (booleans as 0/1).
pub struct Program {
    pub callables: Vec<Callable>,
    pub globals: crate::common::Map<Id, i32>,
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, init) in &self.globals {
            writeln!(f, "global {name} = {init}")?;
        }
        for c in &self.callables {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
