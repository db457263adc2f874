//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers: variable, procedure, and function names.
pub type Id = internment::Intern<String>;

/// Source types. Shared between the front-end checker (which produces
/// typed nodes) and the middle-end (which needs `sizeOf` to assign stack
/// offsets and compute list/element strides).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ty {
    Int64,
    Bool,
    Pointer(Box<Ty>),
    List(Box<Ty>, usize),
}

impl Ty {
    /// Size in bytes, per spec §4.1 "sizeOf".
    ///
    /// int64 and bool are both stored widened to 64 bits; pointers are
    /// 8 bytes; a fixed-length list is its element stride times its length.
    pub fn size_of(&self) -> i64 {
        match self {
            Ty::Int64 | Ty::Bool => 8,
            Ty::Pointer(_) => 8,
            Ty::List(elem, n) => elem.size_of() * (*n as i64),
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Ty::Bool)
    }

    pub fn element_ty(&self) -> Option<&Ty> {
        match self {
            Ty::List(elem, _) => Some(elem),
            Ty::Pointer(elem) => Some(elem),
            _ => None,
        }
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Int64 => write!(f, "int64"),
            Ty::Bool => write!(f, "bool"),
            Ty::Pointer(t) => write!(f, "{t}*"),
            Ty::List(t, n) => write!(f, "{t}[{n}]"),
        }
    }
}
