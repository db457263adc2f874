//! The assembly-level pseudo-register universe (spec §3).
//!
//! RTL pseudos and assembly pseudos are deliberately two separate
//! identity spaces: RTL's `Pseudo` names a value in the middle-end's
//! virtual register file, while an assembly `Pseudo` additionally knows
//! *where* that value lives once the back-end decides — a named machine
//! register, or a stack slot, since this compiler never runs a register
//! allocator (spec Non-goals). `PseudoMap` is the one-way, lazy,
//! one-to-one bridge between the two: the first time an RTL pseudo is
//! seen, it gets a fresh assembly pseudo; afterwards the same RTL pseudo
//! always maps to the same assembly pseudo.

use derive_more::Display;

use crate::middle::pseudo::MachineReg;

/// Where an assembly pseudo's value lives. `PseudoMap` only ever hands
/// out `Stack` bindings (no allocator exists to assign `Register`, spec
/// Non-goals), but the variant is kept so a later register allocator has
/// somewhere to put its answer without changing this type's shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Register(MachineReg),
    /// A positive stack-slot index, rendered as `-8·slot(%rbp)`.
    Stack(u32),
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Unbound => write!(f, "<unbound>"),
            Binding::Register(r) => write!(f, "%{r}"),
            Binding::Stack(slot) => write!(f, "-{}(%rbp)", 8 * (*slot as i64 + 1)),
        }
    }
}

/// An assembly-level pseudo register: an opaque id plus its binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AsmPseudo(u32);

/// Lazily, one-to-one maps RTL pseudos into assembly pseudos, each bound
/// to its own stack slot (spec §3, "RTL pseudos are mapped into assembly
/// pseudos lazily and one-to-one").
#[derive(Default)]
pub struct PseudoMap {
    map: crate::common::Map<crate::middle::pseudo::Pseudo, AsmPseudo>,
    bindings: Vec<Binding>,
}

impl PseudoMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, rtl: crate::middle::pseudo::Pseudo) -> AsmPseudo {
        if let Some(p) = self.map.get(&rtl) {
            return *p;
        }
        let slot = self.bindings.len() as u32;
        self.bindings.push(Binding::Stack(slot));
        let asm = AsmPseudo(slot);
        self.map.insert(rtl, asm);
        asm
    }

    pub fn binding(&self, p: AsmPseudo) -> Binding {
        self.bindings[p.0 as usize]
    }

    /// Count of distinct assembly pseudos handed out so far — the
    /// back-end's `8·nPseudos` stack reservation (spec §4.2).
    pub fn len(&self) -> u32 {
        self.bindings.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl std::fmt::Display for AsmPseudo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "-{}(%rbp)", 8 * (self.0 as i64 + 1))
    }
}
