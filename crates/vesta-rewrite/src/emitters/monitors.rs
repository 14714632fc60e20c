use vesta_classfile::{Insn, Opcode};

use super::{Emitter, EmitterContext};

/// Debugger traps have no place in deterministic bytecode.
pub struct IgnoreBreakpoints;

impl Emitter for IgnoreBreakpoints {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        if matches!(insn, Insn::Simple(Opcode::Breakpoint)) {
            ctx.prevent_default();
        }
    }
}

/// Monitor instructions are elided; the object reference they would consume
/// is popped instead.
pub struct IgnoreSynchronizedBlocks;

impl Emitter for IgnoreSynchronizedBlocks {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        if matches!(
            insn,
            Insn::Simple(Opcode::MonitorEnter) | Insn::Simple(Opcode::MonitorExit)
        ) {
            ctx.emit(Insn::Simple(Opcode::Pop));
            ctx.prevent_default();
        }
    }
}
