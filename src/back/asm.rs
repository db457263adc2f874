//! The abstract AMD64 assembly model (spec §3, "Assembly line").
//!
//! Each instruction is a textual template plus three parallel vectors of
//! operand identities (`uses`, `defs`, `jump_dests`) rather than a fully
//! rendered string. The template carries `{s0}`, `{d0}`, `{j0}`-style
//! placeholders (substituted for the corresponding vector's entry at
//! render time) so operand identity stays queryable — a later register
//! allocator could rewrite `uses`/`defs` in place — without re-parsing
//! assembly text.

use crate::back::pseudo::{AsmPseudo, PseudoMap};
use crate::common::Id;
use crate::middle::pseudo::Label;

/// One assembly instruction, still carrying placeholder operands.
#[derive(Clone, Debug)]
pub struct Line {
    pub template: String,
    pub uses: Vec<AsmPseudo>,
    pub defs: Vec<AsmPseudo>,
    pub jump_dests: Vec<Label>,
    /// Set only for a plain unconditional jump, so the printer can elide
    /// it when it immediately precedes the label it targets.
    elidable_goto: Option<Label>,
}

impl Line {
    pub fn new(
        template: impl Into<String>,
        uses: Vec<AsmPseudo>,
        defs: Vec<AsmPseudo>,
        jump_dests: Vec<Label>,
    ) -> Self {
        Line { template: template.into(), uses, defs, jump_dests, elidable_goto: None }
    }

    /// A line with no operands at all — directives, register-to-register
    /// prologue/epilogue instructions, bare `ret`, etc.
    pub fn literal(template: impl Into<String>) -> Self {
        Line::new(template, vec![], vec![], vec![])
    }

    pub fn jump(template: impl Into<String>, target: Label) -> Self {
        Line {
            template: template.into(),
            uses: vec![],
            defs: vec![],
            jump_dests: vec![target],
            elidable_goto: Some(target),
        }
    }

    fn render(&self, pseudos: &PseudoMap, label_name: &dyn Fn(Label) -> String) -> String {
        let mut s = self.template.clone();
        for (i, u) in self.uses.iter().enumerate() {
            s = s.replace(&format!("{{s{i}}}"), &pseudos.binding(*u).to_string());
        }
        for (i, d) in self.defs.iter().enumerate() {
            s = s.replace(&format!("{{d{i}}}"), &pseudos.binding(*d).to_string());
        }
        for (i, j) in self.jump_dests.iter().enumerate() {
            s = s.replace(&format!("{{j{i}}}"), &label_name(*j));
        }
        s
    }
}

/// An item in a function's linear instruction stream: either a real
/// instruction, or a label marking a point other instructions jump to.
#[derive(Clone, Debug)]
pub enum Item {
    Insn(Line),
    Mark(Label),
}

/// One callable's assembly: a name plus its linear instruction stream
/// (already scheduled — this is not a CFG any more) and its pseudo
/// bindings.
pub struct Function {
    pub name: Id,
    pub items: Vec<Item>,
    pub pseudos: PseudoMap,
}

impl Function {
    pub fn new(name: Id) -> Self {
        Function { name, items: vec![], pseudos: PseudoMap::new() }
    }

    pub fn push(&mut self, line: Line) {
        self.items.push(Item::Insn(line));
    }

    pub fn mark(&mut self, label: Label) {
        self.items.push(Item::Mark(label));
    }

    fn label_name(&self, label: Label) -> String {
        format!(".{}_{}", self.name, label)
    }

    /// Drops a `jmp` immediately followed by the label it targets (spec
    /// §4.2, "jump elision"), then renders every remaining line.
    fn render_lines(&self) -> Vec<String> {
        let mut out = vec![];
        for (i, item) in self.items.iter().enumerate() {
            match item {
                Item::Mark(label) => out.push(format!("{}:", self.label_name(*label))),
                Item::Insn(line) => {
                    if let Some(target) = line.elidable_goto {
                        if let Some(Item::Mark(next)) = self.items.get(i + 1) {
                            if *next == target {
                                continue;
                            }
                        }
                    }
                    let rendered = line.render(&self.pseudos, &|l| self.label_name(l));
                    out.push(format!("    {rendered}"));
                }
            }
        }
        out
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, ".globl {}", self.name)?;
        writeln!(f, "{}:", self.name)?;
        for line in self.render_lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// The full translated program: a `.text` section of functions plus the
/// `.data` globals the middle-end laid out.
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: crate::common::Map<Id, i32>,
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.globals.is_empty() {
            writeln!(f, ".section .data")?;
            for (name, init) in &self.globals {
                writeln!(f, "{name}: .quad {init}")?;
            }
        }
        writeln!(f, ".section .text")?;
        for func in &self.functions {
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
