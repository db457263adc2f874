//! The middle-end: lowering from a type-checked source AST into RTL
//! (Register Transfer Language), a label-addressed control-flow-graph IR
//! over pseudo-registers. This is the core of the compiler (see the
//! crate-root docs).

pub mod globals;
pub mod lower;
pub mod pseudo;
pub mod rtl;

pub use pseudo::{Label, MachineReg, Pseudo};
pub use rtl::{Callable, Program};
