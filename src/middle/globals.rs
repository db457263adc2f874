//! Global-variable layout (spec §4.1, "Global variable layout").
//!
//! Walked once, before any callable is lowered: each global gets a
//! monotonically increasing byte offset (`sizeOf(type)` wide) and its
//! initializer is folded to a constant. A non-constant initializer is a
//! user-facing diagnostic (spec §7), not an internal assertion — unlike
//! duplicate label installation, this is something a BX program can
//! actually get wrong.

use crate::common::{Id, Map};
use crate::errors::{BxError, Result};
use crate::front::check;

/// The result of laying out a program's globals: each name's initializer
/// value (as the `rtl::Program` representation expects, spec §3 — 32-bit,
/// bools as 0/1) and its assigned frame-independent offset.
///
/// The offsets are not consumed elsewhere in this compiler (each global is
/// addressed by its own linker symbol, spec §4.2's `CopyAP`/`Load`
/// `symbol(%rip)` form, not by indexing into one combined blob) — they are
/// kept because the spec names them as part of this pass's contract and a
/// linker-script-based backend could use them to place globals in a single
/// section.
pub struct GlobalLayout {
    pub initializers: Map<Id, i32>,
    pub offsets: Map<Id, i64>,
    pub total_size: i64,
}

fn const_value(e: &check::Expr) -> Option<i64> {
    match &e.kind {
        check::ExprKind::IntConst(v) => Some(*v),
        check::ExprKind::BoolConst(b) => Some(if *b { 1 } else { 0 }),
        _ => None,
    }
}

pub fn layout_globals(program: &check::Program) -> Result<GlobalLayout> {
    let mut initializers = Map::new();
    let mut offsets = Map::new();
    let mut next_offset = 0i64;

    for g in &program.globals {
        let value = const_value(&g.init).ok_or(BxError::NonConstantInitializer(g.name))?;
        initializers.insert(g.name, value as i32);
        offsets.insert(g.name, next_offset);
        next_offset += g.ty.size_of();
    }

    Ok(GlobalLayout {
        initializers,
        offsets,
        total_size: next_offset,
    })
}
