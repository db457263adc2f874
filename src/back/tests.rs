use crate::back::asm::{Function, Line, Program};
use crate::back::codegen::translate_program;
use crate::back::pseudo::{Binding, PseudoMap};
use crate::common::Map;
use crate::middle::pseudo::{LabelAlloc, PseudoAlloc};
use crate::middle::rtl::{Callable, Instr, Program as RtlProgram};

fn id(name: &str) -> crate::common::Id {
    internment::Intern::new(name.to_string())
}

#[test]
fn pseudo_map_is_lazy_and_one_to_one() {
    let mut pseudos = PseudoAlloc::new();
    let a = pseudos.fresh();
    let b = pseudos.fresh();

    let mut map = PseudoMap::new();
    let asm_a1 = map.get(a);
    let asm_a2 = map.get(a);
    let asm_b = map.get(b);

    assert_eq!(asm_a1, asm_a2, "same RTL pseudo must map to the same assembly pseudo");
    assert_ne!(asm_a1, asm_b);
    assert_eq!(map.len(), 2);
    assert!(matches!(map.binding(asm_a1), Binding::Stack(0)));
    assert!(matches!(map.binding(asm_b), Binding::Stack(1)));
}

#[test]
fn line_render_substitutes_every_placeholder_kind() {
    let mut labels = LabelAlloc::new();
    let target = labels.fresh();
    let mut pseudos = PseudoAlloc::new();
    let src_rtl = pseudos.fresh();
    let dst_rtl = pseudos.fresh();

    let mut func = Function::new(id("f"));
    let src = func.pseudos.get(src_rtl);
    let dst = func.pseudos.get(dst_rtl);
    func.push(Line::new("movq {s0}, {d0} # -> {j0}", vec![src], vec![dst], vec![target]));
    func.mark(target);

    let text = func.to_string();
    assert!(!text.contains('{'), "every placeholder should have been substituted: {text}");
    assert!(text.contains("-8(%rbp)"), "src should render as its stack slot: {text}");
    assert!(text.contains("-16(%rbp)"), "dst should render as its stack slot: {text}");
}

#[test]
fn jump_elision_drops_a_jump_immediately_preceding_its_own_target() {
    let mut labels = LabelAlloc::new();
    let target = labels.fresh();
    let other = labels.fresh();

    let mut func = Function::new(id("f"));
    func.push(Line::jump("jmp {j0}", target));
    func.mark(target);
    func.push(Line::literal("nop"));

    let text = func.to_string();
    assert_eq!(text.matches("jmp").count(), 0, "elidable jump should vanish: {text}");

    let mut func2 = Function::new(id("g"));
    func2.push(Line::jump("jmp {j0}", target));
    func2.mark(other);
    func2.mark(target);
    let text2 = func2.to_string();
    assert_eq!(text2.matches("jmp").count(), 1, "jump to a non-adjacent label must survive: {text2}");
}

/// Builds the RTL for `proc main() { return; }` by hand, bypassing the
/// lowerer, to check the translator's own prologue/epilogue shape in
/// isolation.
#[test]
fn translate_program_emits_prologue_and_epilogue() {
    let mut labels = LabelAlloc::new();
    let enter = labels.fresh();
    let body = labels.fresh();
    let leave = labels.fresh();
    let ret = labels.fresh();

    let mut callable = Callable::new(id("main"), enter, leave);
    callable.install(enter, Instr::NewFrame { size: 0, succ: body });
    callable.install(body, Instr::Goto { succ: leave });
    callable.install(leave, Instr::DelFrame { succ: ret });
    callable.install(ret, Instr::Return);

    let program = RtlProgram { callables: vec![callable], globals: Map::new() };
    let asm = translate_program(&program);
    let text = asm.to_string();

    assert!(text.contains(".globl main"));
    assert!(text.contains("pushq %rbp"));
    assert!(text.contains("movq %rsp, %rbp"));
    assert!(text.contains("movq %rbp, %rsp"));
    assert!(text.contains("popq %rbp"));
    assert!(text.contains("ret"));
    // The body's only instruction is a `Goto` straight to `leave`, whose
    // very next scheduled label is `leave` itself, so it should elide.
    assert_eq!(text.matches("jmp").count(), 0, "trivial goto-to-next-label should elide: {text}");
}

/// A symbol-less `CopyAP` addresses one of this frame's own locals;
/// `alloc_frame_slot` hands out positive byte magnitudes, so the rendered
/// displacement must be negative (locals live below the saved `%rbp`, not
/// above it like the return address/stack arguments do).
#[test]
fn copy_ap_with_no_symbol_renders_a_negative_rbp_offset() {
    let mut labels = LabelAlloc::new();
    let enter = labels.fresh();
    let body = labels.fresh();
    let leave = labels.fresh();
    let ret = labels.fresh();
    let mut pseudos = PseudoAlloc::new();
    let dst = pseudos.fresh();

    let mut callable = Callable::new(id("main"), enter, leave);
    callable.install(enter, Instr::NewFrame { size: 8, succ: body });
    callable.install(
        body,
        Instr::CopyAP { symbol: None, offset: 8, base: crate::middle::pseudo::MachineReg::Rbp, dst, succ: leave },
    );
    callable.install(leave, Instr::DelFrame { succ: ret });
    callable.install(ret, Instr::Return);

    let program = RtlProgram { callables: vec![callable], globals: Map::new() };
    let text = translate_program(&program).to_string();
    assert!(text.contains("leaq -8(%rbp)"), "local's address must be a negative offset from %rbp:\n{text}");
    assert!(!text.contains("leaq 8(%rbp)"), "must not alias the caller's return address:\n{text}");
}

/// `NewFrame.size` (the frame-resident-locals byte total) must add to, not
/// replace, the separate per-pseudo spill reservation.
#[test]
fn stack_reservation_includes_both_frame_size_and_pseudo_spill_bytes() {
    let mut labels = LabelAlloc::new();
    let enter = labels.fresh();
    let body = labels.fresh();
    let leave = labels.fresh();
    let ret = labels.fresh();
    let mut pseudos = PseudoAlloc::new();
    let a = pseudos.fresh();

    let mut callable = Callable::new(id("main"), enter, leave);
    callable.install(enter, Instr::NewFrame { size: 24, succ: body });
    callable.install(body, Instr::Move { imm: 1, dst: a, succ: leave });
    callable.install(leave, Instr::DelFrame { succ: ret });
    callable.install(ret, Instr::Return);

    let program = RtlProgram { callables: vec![callable], globals: Map::new() };
    let text = translate_program(&program).to_string();
    // one pseudo used (`a`) -> 8 spill bytes, plus the 24 frame bytes.
    assert!(text.contains("subq $32, %rsp"), "reservation must be frame_size + 8*pseudos.len():\n{text}");
}

#[test]
fn globals_are_emitted_as_data_section_quads() {
    let mut globals = Map::new();
    globals.insert(id("counter"), 41);
    let program = Program { functions: vec![], globals };
    let text = program.to_string();
    assert!(text.contains(".section .data"));
    assert!(text.contains("counter: .quad 41"));
}
