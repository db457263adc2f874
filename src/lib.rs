//! BX: a small C-like procedural language with integer, boolean, pointer,
//! and fixed-length list types, compiled to AMD64 assembly.
//!
//! This is the compiler as a library. See `src/bin` for the driver that
//! wires these phases together into a CLI.

pub mod back;
pub mod common;
pub mod errors;
pub mod front;
pub mod middle;

pub use errors::BxError;

/// Parse and type-check a source file, returning the typed AST.
pub fn parse_and_check(source: &str) -> errors::Result<front::check::Program> {
    let ast = front::parse(source).map_err(|e| errors::BxError::Parse(e.to_string()))?;
    front::check::check_program(&ast)
}

/// Lower a type-checked program to RTL.
pub fn lower_program(checked: &front::check::Program) -> errors::Result<middle::rtl::Program> {
    middle::lower::lower_program(checked)
}

/// Translate an RTL program into an abstract AMD64 assembly program.
pub fn translate_program(rtl: &middle::rtl::Program) -> back::asm::Program {
    back::codegen::translate_program(rtl)
}
