//! Diagnostics surfaced by the compiler (spec §7).
//!
//! Every error kind here aborts compilation at the phase where it is
//! detected; there is no recovery or partial compilation. Duplicate label
//! installation is deliberately *not* a variant of this enum: it indicates
//! a bug in the lowerer itself, not a malformed source file, so it is
//! reported with `assert!` inside `middle::rtl::Callable::install` instead.

use thiserror::Error;

use crate::common::Id;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BxError {
    #[error("lexer error: unexpected character {0:?} at byte offset {1}")]
    Lex(char, usize),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("undefined variable `{0}`")]
    UndefinedVariable(Id),

    #[error("call to undefined callable `{0}`")]
    UndefinedCallable(Id),

    #[error("no `main` procedure found")]
    MissingMain,

    #[error("cannot take the address of this expression: it is not an l-value")]
    UnresolvableLValue,

    #[error("global `{0}` has a non-constant initializer")]
    NonConstantInitializer(Id),

    #[error("wrong number of arguments calling `{callee}`: expected {expected}, got {got}")]
    ArityMismatch {
        callee: Id,
        expected: usize,
        got: usize,
    },
}

pub type Result<T> = std::result::Result<T, BxError>;
