//! Identity types for RTL: labels (CFG program points) and pseudo
//! registers (virtual registers), plus the disjoint universe of named
//! machine registers used to thread the calling convention through RTL.
//!
//! Per the design notes, fresh ids come from a per-compilation-unit
//! allocator passed by reference rather than a process-global counter, so
//! that lowering one callable can't perturb the numbering of another and
//! tests stay reproducible.

use derive_more::Display;

/// An opaque identity for a point in the control-flow graph. Equality and
/// hashing are by identity; labels carry no further structure.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("L{_0}")]
pub struct Label(u32);

/// An opaque identity for an RTL virtual register.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("%{_0}")]
pub struct Pseudo(u32);

impl Pseudo {
    /// The sentinel meaning "no destination", e.g. a procedure's output.
    pub const DISCARD: Pseudo = Pseudo(u32::MAX);

    pub fn is_discard(self) -> bool {
        self == Pseudo::DISCARD
    }
}

/// Allocates fresh, unique labels for one compilation unit (one `Callable`).
#[derive(Default)]
pub struct LabelAlloc {
    next: u32,
}

impl LabelAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Label {
        let l = Label(self.next);
        self.next += 1;
        l
    }
}

/// Allocates fresh, unique pseudos for one compilation unit (one `Callable`).
#[derive(Default)]
pub struct PseudoAlloc {
    next: u32,
}

impl PseudoAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Pseudo {
        let p = Pseudo(self.next);
        self.next += 1;
        p
    }
}

/// The closed set of AMD64 machine register names RTL instructions can
/// name directly, disjoint from the `Pseudo` universe.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum MachineReg {
    #[display("rax")]
    Rax,
    #[display("rbx")]
    Rbx,
    #[display("rcx")]
    Rcx,
    #[display("rdx")]
    Rdx,
    #[display("rbp")]
    Rbp,
    #[display("rsi")]
    Rsi,
    #[display("rdi")]
    Rdi,
    #[display("rsp")]
    Rsp,
    #[display("r8")]
    R8,
    #[display("r9")]
    R9,
    #[display("r10")]
    R10,
    #[display("r11")]
    R11,
    #[display("r12")]
    R12,
    #[display("r13")]
    R13,
    #[display("r14")]
    R14,
    #[display("r15")]
    R15,
    #[display("rip")]
    Rip,
    #[display("rflags")]
    Rflags,
}

/// The System V AMD64 integer argument registers, in passing order.
pub const ARG_REGISTERS: [MachineReg; 6] = [
    MachineReg::Rdi,
    MachineReg::Rsi,
    MachineReg::Rdx,
    MachineReg::Rcx,
    MachineReg::R8,
    MachineReg::R9,
];

/// Callee-saved registers, in the order the prologue saves them (and the
/// epilogue must restore them in reverse).
pub const CALLEE_SAVED: [MachineReg; 6] = [
    MachineReg::Rbx,
    MachineReg::Rbp,
    MachineReg::R12,
    MachineReg::R13,
    MachineReg::R14,
    MachineReg::R15,
];
