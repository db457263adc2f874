//! RTL-to-assembly translation (spec §4.2): walks a `Callable`'s
//! schedule in order, translating each instruction into one or more
//! [`Line`]s and mapping every RTL `Pseudo` it touches into its assembly
//! [`AsmPseudo`] through a fresh [`PseudoMap`], lazily, one-to-one.
//!
//! The schedule order is preserved exactly — this pass never reorders
//! instructions — so the only thing that can shrink the output is jump
//! elision, applied later while rendering (`Function::render_lines`).

use crate::back::asm::{Function, Item, Line, Program};
use crate::back::pseudo::AsmPseudo;
use crate::middle::pseudo::{MachineReg, Pseudo};
use crate::middle::rtl::{self, BbranchOp, BinopKind, Instr, UbranchOp, UnopKind};

fn regname(r: MachineReg) -> String {
    format!("%{r}")
}

/// Translates one `Callable`'s RTL body into its assembly `Function`.
struct FunctionCodegen {
    func: Function,
    /// Byte count of this callable's frame-resident locals (`NewFrame.size`),
    /// set once `NewFrame` is translated and folded into the stack
    /// reservation alongside the pseudo-spill bytes once the whole body has
    /// been walked.
    frame_size: i64,
}

impl FunctionCodegen {
    fn new(callable: &rtl::Callable) -> Self {
        FunctionCodegen { func: Function::new(callable.name), frame_size: 0 }
    }

    fn asm(&mut self, p: Pseudo) -> AsmPseudo {
        self.func.pseudos.get(p)
    }

    fn translate_instr(&mut self, instr: &Instr) {
        use Instr::*;
        match instr {
            Move { imm, dst, .. } => {
                let dst = self.asm(*dst);
                // `movq $imm, mem` only accepts a 32-bit sign-extended
                // immediate; `movabsq` is the only AMD64 form that loads a
                // full 64-bit immediate, and it only targets a register.
                self.func
                    .push(Line::literal(format!("movabsq ${imm}, %r11")));
                self.func.push(Line::new("movq %r11, {d0}", vec![], vec![dst], vec![]));
            }
            Copy { src, dst, .. } => {
                let src = self.asm(*src);
                let dst = self.asm(*dst);
                self.func.push(Line::new(
                    "movq {s0}, %r11",
                    vec![src],
                    vec![],
                    vec![],
                ));
                self.func.push(Line::new("movq %r11, {d0}", vec![], vec![dst], vec![]));
            }
            CopyMP { src, dst, .. } => {
                let dst = self.asm(*dst);
                self.func.push(Line::new(
                    format!("movq {}, {{d0}}", regname(*src)),
                    vec![],
                    vec![dst],
                    vec![],
                ));
            }
            CopyPM { src, dst, .. } => {
                let src = self.asm(*src);
                self.func.push(Line::new(
                    format!("movq {{s0}}, {}", regname(*dst)),
                    vec![src],
                    vec![],
                    vec![],
                ));
            }
            CopyAP { symbol, offset, base, dst, .. } => {
                let dst = self.asm(*dst);
                let addr = match symbol {
                    Some(name) => format!("{name}+{offset}({})", regname(*base)),
                    // A symbol-less `CopyAP` always addresses this frame's
                    // own locals (spec §9 open question, resolved in
                    // DESIGN.md); `alloc_frame_slot` hands out positive
                    // magnitudes growing down from `%rbp`, so the actual
                    // displacement is negative.
                    None => format!("{}({})", -offset, regname(*base)),
                };
                self.func.push(Line::new(format!("leaq {addr}, {{d0}}"), vec![], vec![dst], vec![]));
            }
            Load { symbol, offset, base, dst, .. } => {
                let dst = self.asm(*dst);
                match symbol {
                    Some(name) => {
                        self.func.push(Line::new(
                            format!("movq {name}+{offset}(%rip), {{d0}}"),
                            vec![],
                            vec![dst],
                            vec![],
                        ));
                    }
                    None => {
                        let base = self.asm(*base);
                        self.func.push(Line::new(
                            "movq {s0}, %r11",
                            vec![base],
                            vec![],
                            vec![],
                        ));
                        self.func.push(Line::new(
                            format!("movq {offset}(%r11), {{d0}}"),
                            vec![],
                            vec![dst],
                            vec![],
                        ));
                    }
                }
            }
            Store { src, symbol, offset, base, .. } => {
                let src = self.asm(*src);
                match symbol {
                    Some(name) => {
                        self.func.push(Line::new(
                            format!("movq {{s0}}, {name}+{offset}(%rip)"),
                            vec![src],
                            vec![],
                            vec![],
                        ));
                    }
                    None => {
                        let base = self.asm(*base);
                        self.func.push(Line::new(
                            "movq {s0}, %r11",
                            vec![base],
                            vec![],
                            vec![],
                        ));
                        self.func.push(Line::new(
                            format!("movq {{s0}}, {offset}(%r11)"),
                            vec![src],
                            vec![],
                            vec![],
                        ));
                    }
                }
            }
            Unop { op, arg, .. } => {
                let arg = self.asm(*arg);
                let mnem = match op {
                    UnopKind::Neg => "negq",
                    UnopKind::Not => "notq",
                };
                self.func.push(Line::new(
                    format!("{mnem} {{d0}}"),
                    vec![arg],
                    vec![arg],
                    vec![],
                ));
            }
            Binop { op, src, dst, .. } => self.translate_binop(*op, *src, *dst),
            Ubranch { op, arg, taken, fallthrough } => {
                let arg = self.asm(*arg);
                self.func.push(Line::new("cmpq $0, {s0}", vec![arg], vec![], vec![]));
                let mnem = match op {
                    UbranchOp::Jz => "je",
                    UbranchOp::Jnz => "jne",
                };
                self.func.push(Line::jump(format!("{mnem} {{j0}}"), *taken));
                self.func.mark(*fallthrough);
            }
            Bbranch { op, a, b, taken, fallthrough } => {
                let a = self.asm(*a);
                let b = self.asm(*b);
                self.func.push(Line::new(
                    "cmpq {s1}, {s0}",
                    vec![a, b],
                    vec![],
                    vec![],
                ));
                let mnem = bbranch_mnemonic(*op);
                self.func.push(Line::jump(format!("{mnem} {{j0}}"), *taken));
                self.func.mark(*fallthrough);
            }
            Goto { succ } => {
                self.func.push(Line::jump("jmp {j0}", *succ));
            }
            Call { func, nargs, .. } => {
                self.func.push(Line::literal(format!("call {func}")));
                let stack_args = nargs.saturating_sub(6);
                if stack_args > 0 {
                    self.func
                        .push(Line::literal(format!("addq ${}, %rsp", 8 * stack_args)));
                }
            }
            Return => unreachable!("Return has no successor, handled by the schedule walker"),
            NewFrame { size, .. } => {
                // `size` is the frame-resident-variable byte total (spec
                // §4.1); folded into the stack reservation alongside the
                // pseudo-spill bytes once every pseudo in this callable has
                // been seen (`translate_callable`/`prepend_stack_reservation`).
                self.func.push(Line::literal("pushq %rbp"));
                self.func.push(Line::literal("movq %rsp, %rbp"));
                self.frame_size = *size;
            }
            DelFrame { .. } => {
                self.func.push(Line::literal("movq %rbp, %rsp"));
                self.func.push(Line::literal("popq %rbp"));
            }
            LoadParam { slot, dst, .. } => {
                let dst = self.asm(*dst);
                // Slot 1 is the first stack argument, at `16(%rbp)`: 8
                // bytes for the saved return address, 8 for the saved
                // `%rbp` itself, pushed by `call`/this prologue.
                let offset = 8 * (slot + 1);
                self.func.push(Line::new(
                    format!("movq {offset}(%rbp), {{d0}}"),
                    vec![],
                    vec![dst],
                    vec![],
                ));
            }
            Push { src, .. } => {
                let src = self.asm(*src);
                self.func.push(Line::new("pushq {s0}", vec![src], vec![], vec![]));
            }
            Pop { dst, .. } => {
                let dst = self.asm(*dst);
                self.func.push(Line::new("popq {d0}", vec![], vec![dst], vec![]));
            }
        }
    }

    fn translate_binop(&mut self, op: BinopKind, src: Pseudo, dst: Pseudo) {
        let src = self.asm(src);
        let dst = self.asm(dst);
        match op {
            BinopKind::Add | BinopKind::Sub | BinopKind::And | BinopKind::Or | BinopKind::Xor
            | BinopKind::Mul => {
                let mnem = match op {
                    BinopKind::Add => "addq",
                    BinopKind::Sub => "subq",
                    BinopKind::And => "andq",
                    BinopKind::Or => "orq",
                    BinopKind::Xor => "xorq",
                    BinopKind::Mul => "imulq",
                    _ => unreachable!(),
                };
                self.func.push(Line::new("movq {s0}, %r11", vec![src], vec![], vec![]));
                self.func
                    .push(Line::new(format!("{mnem} %r11, {{d0}}"), vec![], vec![dst], vec![]));
            }
            BinopKind::Div | BinopKind::Rem => {
                // Dividend in rax:rdx, divisor in an arbitrary register
                // (never rax/rdx), quotient lands in rax, remainder rdx.
                self.func.push(Line::new(
                    "movq {s0}, %r11",
                    vec![dst],
                    vec![],
                    vec![],
                ));
                self.func.push(Line::literal("movq %r11, %rax"));
                self.func.push(Line::literal("cqto"));
                self.func.push(Line::new("movq {s0}, %r11", vec![src], vec![], vec![]));
                self.func.push(Line::literal("idivq %r11"));
                let result_reg = if matches!(op, BinopKind::Div) { "%rax" } else { "%rdx" };
                self.func
                    .push(Line::new(format!("movq {result_reg}, {{d0}}"), vec![], vec![dst], vec![]));
            }
            BinopKind::Sal | BinopKind::Sar => {
                let mnem = if matches!(op, BinopKind::Sal) { "salq" } else { "sarq" };
                self.func.push(Line::new("movq {s0}, %rcx", vec![src], vec![], vec![]));
                self.func
                    .push(Line::new(format!("{mnem} %cl, {{d0}}"), vec![], vec![dst], vec![]));
            }
        }
    }
}

fn bbranch_mnemonic(op: BbranchOp) -> &'static str {
    match op {
        BbranchOp::Je => "je",
        BbranchOp::Jne => "jne",
        BbranchOp::Jl => "jl",
        BbranchOp::Jle => "jle",
        BbranchOp::Jg => "jg",
        BbranchOp::Jge => "jge",
    }
}

/// Translates one RTL `Callable` into its assembly `Function`, walking
/// the schedule in order and marking every label the schedule visits
/// (whether or not anything jumps to it — the printer only ever elides a
/// jump, never a label, spec §4.2).
fn translate_callable(callable: &rtl::Callable) -> Function {
    let mut cg = FunctionCodegen::new(callable);
    for label in &callable.schedule {
        // Every label in the schedule gets a `Mark` so jumps can target
        // it; `Function::render_lines` is what actually drops the
        // redundant ones (a `Mark` immediately following an elided
        // `jmp` is simply unused).
        cg.func.mark(*label);
        let instr = &callable.body[label];
        if matches!(instr, Instr::Return) {
            cg.func.push(Line::literal("ret"));
            continue;
        }
        cg.translate_instr(instr);
    }
    let stack_bytes = cg.frame_size + 8 * cg.func.pseudos.len() as i64;
    prepend_stack_reservation(&mut cg.func, stack_bytes);
    cg.func
}

/// `NewFrame`'s own lines only push `%rbp`/move `%rsp`; the `subq` that
/// reserves this callable's frame-resident locals *and* its pseudo stack
/// has to come right after, once every pseudo the body uses has been
/// counted and `NewFrame.size` has been seen. Spliced in right after the
/// two prologue lines `translate_instr` already emitted for `NewFrame`
/// (always items 0 and 1 — `NewFrame` is always this callable's `enter`
/// instruction, spec §4.1).
fn prepend_stack_reservation(func: &mut Function, stack_bytes: i64) {
    if stack_bytes == 0 {
        return;
    }
    // Layout is always `Mark(enter), pushq %rbp, movq %rsp, %rbp, ...`
    // (the two lines `NewFrame` itself emits) — insert right after them.
    let line = Line::literal(format!("subq ${stack_bytes}, %rsp"));
    func.items.insert(3, Item::Insn(line));
}

/// Translates a whole RTL program into its assembly form (spec §4.2).
pub fn translate_program(rtl: &rtl::Program) -> Program {
    let functions = rtl.callables.iter().map(translate_callable).collect();
    Program { functions, globals: rtl.globals.clone() }
}
